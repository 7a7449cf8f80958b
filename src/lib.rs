#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod capabilities;
pub mod config;
pub mod debounce;
pub mod map_sync;
pub mod model;
pub mod search;
pub mod stores;
pub mod viewport;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub use api::{GeocodingClient, ImageClient, SchemeClient, SchemeError};
pub use capabilities::{CapabilityError, HttpError, KvError, Storage};
pub use config::Settings;
pub use map_sync::{
    MapError, MapEvent, MapEventSink, MapHandle, MapOptions, MapWidget, MapWidgetFactory,
    SyncState, Synchronizer,
};
pub use model::{
    ColorScheme, ColorSchemeItem, Feature, HexColor, ImageResult, LngLat, SchemeWithId,
    ValidationError, ViewportState,
};
pub use search::SearchSession;
pub use viewport::ViewportStore;

pub const DEFAULT_CENTER: LngLat = LngLat::new(116.3974, 39.9093);
pub const DEFAULT_ZOOM: f64 = 10.0;
pub const MIN_ZOOM: f64 = 2.0;
pub const MAX_ZOOM: f64 = 22.0;
pub const SYNC_DELAY: Duration = Duration::from_millis(150);

pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);
/// Scheme generation gets three times the standard budget.
pub const SCHEME_TIMEOUT_FACTOR: u32 = 3;
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(200);
pub const SEARCH_MIN_LENGTH: usize = 2;
pub const SEARCH_RESULT_LIMIT: usize = 5;
pub const DEFAULT_IMAGE_COUNT: u32 = 9;
pub const MAX_IMAGE_COUNT: u32 = 50;

pub const LOCALE_KEY: &str = "locale";
pub const MAP_STATE_KEY: &str = "mapState";
pub const COLOR_SCHEME_KEY: &str = "colorScheme";

pub const DEFAULT_MAP_STYLE: &str = "mapbox://styles/mapbox/streets-v12";
pub const GEOCODING_API_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Locks a mutex, taking the data even if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Validation,
    NotFound,
    RateLimited,
    Server,
    Storage,
    Serialization,
    Map,
    InvalidState,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::Server => "SERVER_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::Map => "MAP_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimited | Self::Server | Self::Storage
        )
    }

    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::Validation,
            404 => Self::NotFound,
            408 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            _ => Self::Network,
        }
    }
}

/// Error surfaced to the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".into(),
            ErrorKind::Validation | ErrorKind::NotFound => self.message.clone(),
            ErrorKind::RateLimited => "Too many requests. Please wait a moment and try again.".into(),
            ErrorKind::Server => "The server had a problem. Please try again.".into(),
            ErrorKind::Storage | ErrorKind::Serialization => {
                "Unable to save your settings locally.".into()
            }
            ErrorKind::Map => "The map failed to load.".into(),
            ErrorKind::InvalidState | ErrorKind::Internal => {
                "An unexpected error occurred. Please reload and try again.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

impl From<HttpError> for AppError {
    fn from(e: HttpError) -> Self {
        let kind = match &e {
            HttpError::Timeout { .. } => ErrorKind::Timeout,
            HttpError::ConnectionError { .. } => ErrorKind::Network,
            HttpError::HttpStatus { status, .. } => ErrorKind::from_status(*status),
            HttpError::SerializationError { .. } | HttpError::InvalidResponse { .. } => {
                ErrorKind::Serialization
            }
            HttpError::InvalidUrl { .. }
            | HttpError::InvalidHeader { .. }
            | HttpError::BodyTooLarge { .. }
            | HttpError::InvalidRequest { .. } => ErrorKind::Internal,
        };
        let mut error = AppError::new(kind, e.to_string());
        if let Some(request_id) = e.request_id() {
            error = error.with_context("request_id", request_id);
        }
        error
    }
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        let kind = match &e {
            KvError::Serialization { .. } => ErrorKind::Serialization,
            KvError::InvalidKey { .. } | KvError::ValueTooLarge { .. } => ErrorKind::Validation,
            KvError::Storage { .. } => ErrorKind::Storage,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<CapabilityError> for AppError {
    fn from(e: CapabilityError) -> Self {
        match e {
            CapabilityError::Http(e) => e.into(),
            CapabilityError::Kv(e) => e.into(),
        }
    }
}

impl From<SchemeError> for AppError {
    fn from(e: SchemeError) -> Self {
        match e {
            SchemeError::Timeout { .. } => AppError::new(ErrorKind::Timeout, e.to_string()),
            SchemeError::Status { status, .. } => {
                AppError::new(ErrorKind::from_status(status), e.to_string())
            }
            SchemeError::InvalidResponse(_) => {
                AppError::new(ErrorKind::Serialization, e.to_string())
            }
            SchemeError::Http(inner) => inner.into(),
        }
    }
}

impl From<MapError> for AppError {
    fn from(e: MapError) -> Self {
        let kind = match &e {
            MapError::InvalidState(_) => ErrorKind::InvalidState,
            MapError::Creation(_) => ErrorKind::Map,
            MapError::NoRuntime => ErrorKind::Internal,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}
