use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, instrument, warn};

use super::endpoint;
use crate::capabilities::{send_with_timeout, HttpError, HttpRequest, HttpTransport};
use crate::config::Settings;
use crate::model::{is_valid_search_query, Feature};

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

/// Forward geocoding: free text to candidate places.
#[derive(Debug, Clone)]
pub struct GeocodingClient<T> {
    transport: T,
    base_url: String,
    access_token: String,
    timeout: Duration,
    min_query_length: usize,
}

impl<T: HttpTransport> GeocodingClient<T> {
    pub fn new(transport: T, settings: &Settings) -> Self {
        Self {
            transport,
            base_url: settings.geocoding_url.clone(),
            access_token: settings.access_token.clone(),
            timeout: settings.request_timeout(),
            min_query_length: settings.search_min_length,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns an empty list for short queries and for every failure.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Feature> {
        let query = query.trim();
        if !is_valid_search_query(query, self.min_query_length) {
            debug!("query too short, skipping request");
            return Vec::new();
        }

        match self.fetch(query, limit).await {
            Ok(features) => {
                debug!(count = features.len(), "geocoding results");
                features
            }
            Err(e) if e.is_timeout() => {
                warn!(error = %e, "geocoding timed out");
                Vec::new()
            }
            Err(e) => {
                error!(error = %e, "geocoding failed");
                Vec::new()
            }
        }
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<Feature>, HttpError> {
        let mut url = endpoint(&self.base_url, &[&format!("{query}.json")])?;
        url.query_pairs_mut()
            .append_pair("access_token", &self.access_token)
            .append_pair("limit", &limit.to_string());

        let request = HttpRequest::get(&url)?.with_timeout(self.timeout)?;
        let response = send_with_timeout(&self.transport, &request)
            .await?
            .error_for_status()?;
        Ok(response.json::<GeocodingResponse>()?.features)
    }
}
