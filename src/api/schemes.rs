use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::endpoint;
use crate::capabilities::{send_with_timeout, HttpError, HttpRequest, HttpTransport};
use crate::config::Settings;
use crate::model::{ColorScheme, SchemeWithId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemeError {
    #[error("scheme generation timed out after {timeout_ms}ms, please retry")]
    Timeout { timeout_ms: u64 },

    #[error("scheme generation failed: {status_text} ({status})")]
    Status { status: u16, status_text: String },

    #[error("scheme generation returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("scheme generation failed: {0}")]
    Http(HttpError),
}

impl SchemeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SchemeError::Timeout { .. } => true,
            SchemeError::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            SchemeError::InvalidResponse(_) => false,
            SchemeError::Http(e) => e.is_retryable(),
        }
    }
}

impl From<HttpError> for SchemeError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Timeout { timeout_ms, .. } => SchemeError::Timeout { timeout_ms },
            HttpError::HttpStatus {
                status,
                status_text,
                ..
            } => SchemeError::Status {
                status,
                status_text,
            },
            HttpError::InvalidResponse { reason, .. } => SchemeError::InvalidResponse(reason),
            other => SchemeError::Http(other),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    current_scheme: &'a ColorScheme,
    count: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    schemes: Vec<SchemeWithId>,
}

/// Asks the backend for variations of a color scheme.
#[derive(Debug, Clone)]
pub struct SchemeClient<T> {
    transport: T,
    base_url: String,
    timeout: Duration,
}

impl<T: HttpTransport> SchemeClient<T> {
    /// Uses `settings.scheme_timeout()`, three times the standard timeout.
    pub fn new(transport: T, settings: &Settings) -> Self {
        Self {
            transport,
            base_url: settings.api_base_url.clone(),
            timeout: settings.scheme_timeout(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[instrument(skip(self, current_scheme), fields(layers = current_scheme.layers.len()))]
    pub async fn generate(
        &self,
        current_scheme: &ColorScheme,
        count: u32,
    ) -> Result<Vec<SchemeWithId>, SchemeError> {
        match self.fetch(current_scheme, count).await {
            Ok(schemes) => {
                info!(count = schemes.len(), "schemes generated");
                Ok(schemes)
            }
            Err(e @ SchemeError::Timeout { .. }) => {
                warn!(error = %e, "scheme generation timed out");
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "scheme generation failed");
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        current_scheme: &ColorScheme,
        count: u32,
    ) -> Result<Vec<SchemeWithId>, SchemeError> {
        let url = endpoint(&self.base_url, &["api", "schemes", "generate"])?;
        let request = HttpRequest::post(&url)?
            .with_json(&GenerateRequest {
                current_scheme,
                count,
            })?
            .with_timeout(self.timeout)?;

        let response = send_with_timeout(&self.transport, &request)
            .await?
            .error_for_status()?;
        Ok(response.json::<GenerateResponse>()?.schemes)
    }
}
