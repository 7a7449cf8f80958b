use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, warn};

use crate::lock_unpoisoned;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

pub fn validate_key(key: &str) -> Result<(), KvError> {
    if key.trim().is_empty() {
        return Err(KvError::InvalidKey {
            key: key.to_string(),
            reason: "key cannot be empty".to_string(),
        });
    }

    if key.len() > MAX_KEY_LENGTH {
        return Err(KvError::InvalidKey {
            key: key.chars().take(50).collect::<String>() + "...",
            reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
        });
    }

    if key.contains('\0') {
        return Err(KvError::InvalidKey {
            key: key.replace('\0', "\\0"),
            reason: "key cannot contain null bytes".to_string(),
        });
    }

    if key.chars().any(|c| c.is_control() && c != '\t') {
        return Err(KvError::InvalidKey {
            key: key.to_string(),
            reason: "key contains invalid control characters".to_string(),
        });
    }

    Ok(())
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message} (code: {code:?}, retryable: {retryable})")]
    Storage {
        code: StorageErrorCode,
        message: String,
        retryable: bool,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String, key: Option<String> },
}

impl KvError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::Storage { retryable: true, .. })
    }

    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    ConnectionFailed,
    Corrupted,
    DiskFull,
    PermissionDenied,
    Busy,
    Locked,
}

impl StorageErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageErrorCode::ConnectionFailed | StorageErrorCode::Busy | StorageErrorCode::Locked
        )
    }
}

/// Raw string store behind [`Storage`]. Values are JSON text.
pub trait KvBackend: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>, KvError>;
    fn set_raw(&self, key: &str, value: &str) -> Result<(), KvError>;
    fn remove(&self, key: &str) -> Result<(), KvError>;
    fn clear(&self) -> Result<(), KvError>;
}

impl<B: KvBackend + ?Sized> KvBackend for Arc<B> {
    fn get_raw(&self, key: &str) -> Result<Option<String>, KvError> {
        (**self).get_raw(key)
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), KvError> {
        (**self).set_raw(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), KvError> {
        (**self).clear()
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvBackend for MemoryBackend {
    fn get_raw(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(lock_unpoisoned(&self.entries).get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), KvError> {
        lock_unpoisoned(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        lock_unpoisoned(&self.entries).remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), KvError> {
        lock_unpoisoned(&self.entries).clear();
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use self::sqlite::SqliteBackend;

#[cfg(not(target_arch = "wasm32"))]
mod sqlite {
    use super::{KvBackend, KvError, StorageErrorCode};
    use crate::lock_unpoisoned;
    use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// SQLite-backed key-value table for desktop and mobile shells.
    pub struct SqliteBackend {
        conn: Mutex<Connection>,
    }

    impl SqliteBackend {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
            let conn = Connection::open(path).map_err(map_sqlite_error)?;
            Self::with_connection(conn)
        }

        pub fn open_in_memory() -> Result<Self, KvError> {
            let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
            Self::with_connection(conn)
        }

        fn with_connection(conn: Connection) -> Result<Self, KvError> {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS kv_entries (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                "#,
            )
            .map_err(map_sqlite_error)?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }
    }

    impl KvBackend for SqliteBackend {
        fn get_raw(&self, key: &str) -> Result<Option<String>, KvError> {
            lock_unpoisoned(&self.conn)
                .query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(map_sqlite_error)
        }

        fn set_raw(&self, key: &str, value: &str) -> Result<(), KvError> {
            let now_ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
                .unwrap_or(0);

            lock_unpoisoned(&self.conn)
                .execute(
                    r#"
                    INSERT INTO kv_entries (key, value, updated_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                    params![key, value, now_ms],
                )
                .map_err(map_sqlite_error)?;
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<(), KvError> {
            lock_unpoisoned(&self.conn)
                .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
                .map_err(map_sqlite_error)?;
            Ok(())
        }

        fn clear(&self) -> Result<(), KvError> {
            lock_unpoisoned(&self.conn)
                .execute("DELETE FROM kv_entries", [])
                .map_err(map_sqlite_error)?;
            Ok(())
        }
    }

    fn map_sqlite_error(e: rusqlite::Error) -> KvError {
        let code = match &e {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy => StorageErrorCode::Busy,
                ErrorCode::DatabaseLocked => StorageErrorCode::Locked,
                ErrorCode::DiskFull => StorageErrorCode::DiskFull,
                ErrorCode::PermissionDenied | ErrorCode::ReadOnly => {
                    StorageErrorCode::PermissionDenied
                }
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => StorageErrorCode::Corrupted,
                ErrorCode::CannotOpen => StorageErrorCode::ConnectionFailed,
                _ => StorageErrorCode::Unknown,
            },
            _ => StorageErrorCode::Unknown,
        };
        KvError::storage(code, e.to_string())
    }
}

/// Best-effort JSON persistence. Every failure is logged and swallowed:
/// reads fall back to the caller's default, writes become no-ops.
#[derive(Debug, Clone)]
pub struct Storage<B> {
    backend: B,
}

impl<B: KvBackend> Storage<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// `None` when the key is missing, empty or holds a value that no longer
    /// decodes as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(e) => {
                error!(key, error = %e, "storage get failed");
                None
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_set(key, value) {
            error!(key, error = %e, "storage set failed");
        }
    }

    pub fn remove(&self, key: &str) {
        let result = validate_key(key).and_then(|()| self.backend.remove(key));
        if let Err(e) = result {
            error!(key, error = %e, "storage remove failed");
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.backend.clear() {
            error!(error = %e, "storage clear failed");
        }
    }

    fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KvError> {
        validate_key(key)?;
        let Some(raw) = self.backend.get_raw(key)? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| KvError::Serialization {
                message: e.to_string(),
                key: Some(key.to_string()),
            })
    }

    fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), KvError> {
        validate_key(key)?;
        let raw = serde_json::to_string(value).map_err(|e| KvError::Serialization {
            message: e.to_string(),
            key: Some(key.to_string()),
        })?;
        if raw.len() > MAX_VALUE_SIZE {
            warn!(key, size = raw.len(), "refusing oversized storage value");
            return Err(KvError::ValueTooLarge {
                size: raw.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        self.backend.set_raw(key, &raw)
    }
}

impl Default for Storage<MemoryBackend> {
    fn default() -> Self {
        Self::new(MemoryBackend::new())
    }
}

pub type KvResult<T> = Result<T, KvError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Backend whose writes can be switched to fail.
    #[derive(Default)]
    struct FailableBackend {
        inner: MemoryBackend,
        fail: AtomicBool,
    }

    impl FailableBackend {
        fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), KvError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(KvError::storage(StorageErrorCode::DiskFull, "injected failure"));
            }
            Ok(())
        }
    }

    impl KvBackend for FailableBackend {
        fn get_raw(&self, key: &str) -> Result<Option<String>, KvError> {
            self.check()?;
            self.inner.get_raw(key)
        }

        fn set_raw(&self, key: &str, value: &str) -> Result<(), KvError> {
            self.check()?;
            self.inner.set_raw(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), KvError> {
            self.check()?;
            self.inner.remove(key)
        }

        fn clear(&self) -> Result<(), KvError> {
            self.check()?;
            self.inner.clear()
        }
    }

    #[test]
    fn test_key_validation() {
        assert!(validate_key("").is_err());
        assert!(validate_key("   ").is_err());
        assert!(validate_key("key\0value").is_err());
        assert!(validate_key("key\x01value").is_err());
        assert!(validate_key(&"a".repeat(MAX_KEY_LENGTH + 1)).is_err());
        assert!(validate_key("mapState").is_ok());
    }

    #[test]
    fn test_round_trip_and_default() {
        let storage = Storage::default();
        storage.set("locale", "en-US");
        assert_eq!(storage.get::<String>("locale").as_deref(), Some("en-US"));
        assert_eq!(storage.get_or("missing", 7u32), 7);
    }

    #[test]
    fn test_corrupted_value_falls_back() {
        let storage = Storage::new(MemoryBackend::new());
        storage.backend().set_raw("mapState", "{not json").unwrap();
        assert_eq!(storage.get_or("mapState", 1.5f64), 1.5);
    }

    #[test]
    fn test_type_mismatch_falls_back() {
        let storage = Storage::default();
        storage.set("count", "three");
        assert_eq!(storage.get_or("count", 3u32), 3);
    }

    #[test]
    fn test_empty_raw_value_is_missing() {
        let storage = Storage::new(MemoryBackend::new());
        storage.backend().set_raw("locale", "").unwrap();
        assert_eq!(storage.get::<String>("locale"), None);
    }

    #[test]
    fn test_remove_and_clear() {
        let storage = Storage::default();
        storage.set("a", &1);
        storage.set("b", &2);
        storage.remove("a");
        assert_eq!(storage.get::<i32>("a"), None);
        assert_eq!(storage.get::<i32>("b"), Some(2));
        storage.clear();
        assert!(storage.backend().is_empty());
    }

    #[test]
    fn test_backend_failures_are_swallowed() {
        let storage = Storage::new(FailableBackend::default());
        storage.set("a", &1);
        storage.backend().set_fail(true);

        storage.set("a", &2);
        assert_eq!(storage.get_or("a", 0), 0);
        storage.remove("a");
        storage.clear();

        storage.backend().set_fail(false);
        assert_eq!(storage.get::<i32>("a"), Some(1));
    }

    #[test]
    fn test_invalid_key_is_swallowed() {
        let storage = Storage::default();
        storage.set("", &1);
        assert!(storage.backend().is_empty());
        assert_eq!(storage.get_or("", 5), 5);
    }

    #[test]
    fn test_unserializable_value_is_swallowed() {
        let storage = Storage::default();
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], 1);
        storage.set("bad", &map);
        assert!(storage.backend().is_empty());
    }

    #[test]
    fn test_error_retryable() {
        assert!(KvError::storage(StorageErrorCode::Busy, "busy").is_retryable());
        assert!(!KvError::storage(StorageErrorCode::Corrupted, "bad").is_retryable());
        assert!(!KvError::ValueTooLarge { size: 2, max: 1 }.is_retryable());
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_sqlite_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.sqlite3");

        {
            let storage = Storage::new(SqliteBackend::open(&path).unwrap());
            storage.set("locale", "zh-CN");
            storage.set("locale", "en-US");
            storage.set("mapState", &serde_json::json!({"zoom": 12.0}));
        }

        let storage = Storage::new(SqliteBackend::open(&path).unwrap());
        assert_eq!(storage.get::<String>("locale").as_deref(), Some("en-US"));
        storage.remove("locale");
        assert_eq!(storage.get::<String>("locale"), None);
        storage.clear();
        assert_eq!(storage.get::<serde_json::Value>("mapState"), None);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_sqlite_in_memory() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.set_raw("k", "\"v\"").unwrap();
        assert_eq!(backend.get_raw("k").unwrap().as_deref(), Some("\"v\""));
        assert_eq!(backend.get_raw("missing").unwrap(), None);
    }
}
