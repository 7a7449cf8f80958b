//! Side-effect seams: HTTP and key-value persistence.
//!
//! The domain modules only talk to these traits, so hosts can swap in their
//! own transport or storage and tests can inject fakes.
mod http;
mod kv;

pub use self::http::{
    send_with_timeout, HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpResult,
    HttpTransport, ValidatedUrl, MAX_TIMEOUT_MS,
};
pub use self::kv::{
    validate_key, KvBackend, KvError, KvResult, MemoryBackend, Storage, StorageErrorCode,
};

#[cfg(feature = "native-http")]
pub use self::http::ReqwestTransport;

#[cfg(not(target_arch = "wasm32"))]
pub use self::kv::SqliteBackend;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Storage error: {0}")]
    Kv(#[from] KvError),
}
