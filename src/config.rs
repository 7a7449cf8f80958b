//! Runtime settings. Every field has a default, so a partial JSON document
//! or an empty environment still yields a usable configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capabilities::MAX_TIMEOUT_MS;
use crate::{
    DEFAULT_API_BASE_URL, DEFAULT_MAP_STYLE, GEOCODING_API_URL, REQUEST_TIMEOUT,
    SCHEME_TIMEOUT_FACTOR, SEARCH_DEBOUNCE, SEARCH_MIN_LENGTH, SEARCH_RESULT_LIMIT, SYNC_DELAY,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub access_token: String,
    pub map_style: String,
    pub geocoding_url: String,
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub sync_delay_ms: u64,
    pub search_debounce_ms: u64,
    pub search_min_length: usize,
    pub search_result_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            map_style: DEFAULT_MAP_STYLE.to_string(),
            geocoding_url: GEOCODING_API_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: duration_ms(REQUEST_TIMEOUT),
            sync_delay_ms: duration_ms(SYNC_DELAY),
            search_debounce_ms: duration_ms(SEARCH_DEBOUNCE),
            search_min_length: SEARCH_MIN_LENGTH,
            search_result_limit: SEARCH_RESULT_LIMIT,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `MAPBOX_TOKEN`, `MAP_STYLE`,
    /// `GEOCODING_API_URL`, `API_BASE_URL` and `REQUEST_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| env::var(key).ok())
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::checked)
    }

    /// Applies overrides from `lookup`. Empty or unparseable values are
    /// ignored.
    #[must_use]
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("MAPBOX_TOKEN") {
            self.access_token = token;
        }
        if let Some(style) = get("MAP_STYLE") {
            self.map_style = style;
        }
        if let Some(url) = get("GEOCODING_API_URL") {
            self.geocoding_url = url;
        }
        if let Some(url) = get("API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(raw) = get("REQUEST_TIMEOUT_MS") {
            match raw.trim().parse() {
                Ok(ms) => self.request_timeout_ms = ms,
                Err(_) => warn!(value = %raw, "ignoring unparsable REQUEST_TIMEOUT_MS"),
            }
        }
        self.checked()
    }

    /// Pulls `request_timeout_ms` into `1..=MAX_TIMEOUT_MS`; zero means the
    /// default.
    fn checked(mut self) -> Self {
        let ms = bounded_timeout_ms(self.request_timeout_ms);
        if ms != self.request_timeout_ms {
            warn!(
                requested = self.request_timeout_ms,
                using = ms,
                "request timeout out of range"
            );
            self.request_timeout_ms = ms;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(bounded_timeout_ms(self.request_timeout_ms))
    }

    /// Three times the request timeout, capped at the transport maximum.
    pub fn scheme_timeout(&self) -> Duration {
        (self.request_timeout() * SCHEME_TIMEOUT_FACTOR).min(Duration::from_millis(MAX_TIMEOUT_MS))
    }

    pub fn sync_delay(&self) -> Duration {
        Duration::from_millis(self.sync_delay_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

fn bounded_timeout_ms(ms: u64) -> u64 {
    match ms {
        0 => duration_ms(REQUEST_TIMEOUT),
        ms => ms.min(MAX_TIMEOUT_MS),
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.request_timeout(), Duration::from_millis(5000));
        assert_eq!(settings.scheme_timeout(), Duration::from_millis(15000));
        assert_eq!(settings.sync_delay(), Duration::from_millis(150));
        assert_eq!(settings.search_debounce(), Duration::from_millis(200));
        assert_eq!(settings.api_base_url, "http://localhost:8000");
        assert_eq!(settings.map_style, "mapbox://styles/mapbox/streets-v12");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings =
            Settings::from_json_str(r#"{"accessToken": "pk.abc", "requestTimeoutMs": 2000}"#)
                .unwrap();
        assert_eq!(settings.access_token, "pk.abc");
        assert_eq!(settings.scheme_timeout(), Duration::from_millis(6000));
        assert_eq!(settings.geocoding_url, GEOCODING_API_URL);
        assert_eq!(settings.search_result_limit, 5);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(Settings::from_json_str(r#"{"requestTimeoutMs": "soon"}"#).is_err());
    }

    #[test]
    fn test_overlay() {
        let vars: HashMap<&str, &str> = [
            ("MAPBOX_TOKEN", "pk.env"),
            ("API_BASE_URL", "https://api.example.com"),
            ("MAP_STYLE", "   "),
            ("REQUEST_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::default().overlay(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(settings.access_token, "pk.env");
        assert_eq!(settings.api_base_url, "https://api.example.com");
        assert_eq!(settings.map_style, DEFAULT_MAP_STYLE);
        assert_eq!(settings.request_timeout_ms, 5000);
    }

    #[test]
    fn test_long_request_timeout_caps_scheme_timeout() {
        let settings = Settings::default()
            .overlay(|k| (k == "REQUEST_TIMEOUT_MS").then(|| "45000".to_string()));
        assert_eq!(settings.request_timeout(), Duration::from_millis(45000));
        assert_eq!(settings.scheme_timeout(), Duration::from_millis(MAX_TIMEOUT_MS));
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let settings = Settings::default()
            .overlay(|k| (k == "REQUEST_TIMEOUT_MS").then(|| "0".to_string()));
        assert_eq!(settings.request_timeout_ms, 5000);

        let literal = Settings {
            request_timeout_ms: 0,
            ..Settings::default()
        };
        assert_eq!(literal.request_timeout(), REQUEST_TIMEOUT);
        assert_eq!(literal.scheme_timeout(), Duration::from_millis(15000));
    }

    #[test]
    fn test_json_timeout_is_bounded() {
        let settings = Settings::from_json_str(r#"{"requestTimeoutMs": 500000}"#).unwrap();
        assert_eq!(settings.request_timeout_ms, MAX_TIMEOUT_MS);
        assert_eq!(settings.scheme_timeout(), Duration::from_millis(MAX_TIMEOUT_MS));
    }
}
