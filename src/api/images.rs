use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use super::endpoint;
use crate::capabilities::{send_with_timeout, HttpError, HttpRequest, HttpTransport};
use crate::config::Settings;
use crate::model::{is_not_empty, ImageResult};
use crate::MAX_IMAGE_COUNT;

/// Illustrative images for a place, via the backend proxy.
#[derive(Debug, Clone)]
pub struct ImageClient<T> {
    transport: T,
    base_url: String,
    timeout: Duration,
}

impl<T: HttpTransport> ImageClient<T> {
    pub fn new(transport: T, settings: &Settings) -> Self {
        Self {
            transport,
            base_url: settings.api_base_url.clone(),
            timeout: settings.request_timeout(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `count` is clamped to `1..=MAX_IMAGE_COUNT`. Blank keywords and all
    /// failures give an empty list.
    #[instrument(skip(self), fields(keyword = %keyword))]
    pub async fn search(&self, keyword: &str, count: u32) -> Vec<ImageResult> {
        if !is_not_empty(keyword) {
            return Vec::new();
        }
        let count = count.clamp(1, MAX_IMAGE_COUNT);

        match self.fetch(keyword.trim(), count).await {
            Ok(images) => {
                debug!(count = images.len(), "image results");
                images
            }
            Err(e) if e.is_timeout() => {
                warn!(error = %e, "image search timed out");
                Vec::new()
            }
            Err(e) => {
                error!(error = %e, "image search failed");
                Vec::new()
            }
        }
    }

    async fn fetch(&self, keyword: &str, count: u32) -> Result<Vec<ImageResult>, HttpError> {
        let mut url = endpoint(&self.base_url, &["api", "images", "search"])?;
        url.query_pairs_mut()
            .append_pair("keyword", keyword)
            .append_pair("count", &count.to_string());

        let request = HttpRequest::get(&url)?.with_timeout(self.timeout)?;
        send_with_timeout(&self.transport, &request)
            .await?
            .error_for_status()?
            .json()
    }
}
