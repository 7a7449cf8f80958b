//! Request/response clients for the geocoding, image search and scheme
//! generation endpoints.
//!
//! Geocoding and images are cosmetic: any failure is logged and reported as an
//! empty result. Scheme generation returns its errors to the caller.

mod geocoding;
mod images;
mod schemes;

pub use self::geocoding::GeocodingClient;
pub use self::images::ImageClient;
pub use self::schemes::{SchemeClient, SchemeError};

use url::Url;

use crate::capabilities::HttpError;

/// Appends path segments to `base`, percent-encoding each one.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, HttpError> {
    let invalid = |reason: String| HttpError::InvalidUrl {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("URL cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
