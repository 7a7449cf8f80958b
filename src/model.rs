use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{DEFAULT_CENTER, DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid coordinate: lng={0}, lat={1}")]
    InvalidCoordinate(f64, f64),
    #[error("invalid zoom: {0}")]
    InvalidZoom(f64),
    #[error("invalid color '{0}': expected #RRGGBB")]
    InvalidColor(String),
}

/// A `[longitude, latitude]` pair.
///
/// Serializes as a two-element array, the wire shape used by the geocoding
/// API and the persisted viewport.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    /// Builds a pair without range checks.
    #[must_use]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn validated(lng: f64, lat: f64) -> Result<Self, ValidationError> {
        if !is_lng_lat(lng, lat) {
            return Err(ValidationError::InvalidCoordinate(lng, lat));
        }
        Ok(Self { lng, lat })
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        is_lng_lat(self.lng, self.lat)
    }

    /// Wraps longitude into `[-180, 180)` and clamps latitude. In-range
    /// values are returned untouched.
    #[must_use]
    pub fn normalized(self) -> Self {
        let lng = if (-180.0..=180.0).contains(&self.lng) {
            self.lng
        } else {
            (self.lng + 180.0).rem_euclid(360.0) - 180.0
        };
        Self {
            lng,
            lat: self.lat.clamp(-90.0, 90.0),
        }
    }
}

impl From<[f64; 2]> for LngLat {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(value: LngLat) -> Self {
        [value.lng, value.lat]
    }
}

impl fmt::Display for LngLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lng, self.lat)
    }
}

/// The authoritative map view: center plus zoom.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub center: LngLat,
    pub zoom: f64,
}

impl ViewportState {
    #[must_use]
    pub const fn new(center: LngLat, zoom: f64) -> Self {
        Self { center, zoom }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.center.is_valid() && self.zoom.is_finite() && (MIN_ZOOM..=MAX_ZOOM).contains(&self.zoom)
    }

    /// Brings center and zoom into range: longitude wraps around the
    /// antimeridian, latitude and zoom are clamped. Non-finite values fall
    /// back to the defaults.
    #[must_use]
    pub fn normalized(self) -> Self {
        let center = if self.center.lng.is_finite() && self.center.lat.is_finite() {
            self.center.normalized()
        } else {
            DEFAULT_CENTER
        };
        let zoom = if self.zoom.is_finite() {
            self.zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            DEFAULT_ZOOM
        };
        Self { center, zoom }
    }
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER, DEFAULT_ZOOM)
    }
}

// --- Geocoding ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureContext {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A geocoding hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub place_type: Vec<String>,
    #[serde(default)]
    pub relevance: f64,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub text: String,
    pub place_name: String,
    pub center: LngLat,
    pub geometry: geojson::Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<FeatureContext>>,
}

// --- Images ---

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResult {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

// --- Color schemes ---

/// `#RRGGBB`, case preserved.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let valid = value.len() == 7
            && value.starts_with('#')
            && value[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(ValidationError::InvalidColor(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HexColor {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HexColor> for String {
    fn from(value: HexColor) -> Self {
        value.0
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorSchemeItem {
    /// Style layer id.
    pub id: String,
    pub color: HexColor,
    /// Share of the palette; equal weights by default.
    pub weight: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub layers: Vec<ColorSchemeItem>,
}

impl ColorScheme {
    /// Builds a scheme that gives every layer the same weight.
    #[must_use]
    pub fn equal_weights(layers: Vec<(String, HexColor)>) -> Self {
        let weight = if layers.is_empty() {
            0.0
        } else {
            1.0 / layers.len() as f64
        };
        Self {
            layers: layers
                .into_iter()
                .map(|(id, color)| ColorSchemeItem { id, color, weight })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemeWithId {
    pub id: String,
    pub layers: Vec<ColorSchemeItem>,
}

impl From<SchemeWithId> for ColorScheme {
    fn from(value: SchemeWithId) -> Self {
        Self {
            layers: value.layers,
        }
    }
}

// --- Validators ---

#[must_use]
pub fn is_lng_lat(lng: f64, lat: f64) -> bool {
    (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
}

#[must_use]
pub fn is_not_empty(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Counts characters, not bytes, so two-character CJK place names pass.
#[must_use]
pub fn min_length(value: &str, min: usize) -> bool {
    value.trim().chars().count() >= min
}

#[must_use]
pub fn is_valid_search_query(query: &str, min: usize) -> bool {
    is_not_empty(query) && min_length(query, min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lng_lat_serializes_as_array() {
        let center = LngLat::new(121.47, 31.23);
        let json = serde_json::to_string(&center).unwrap();
        assert_eq!(json, "[121.47,31.23]");
    }

    #[test]
    fn test_validated_rejects_out_of_range() {
        assert!(LngLat::validated(181.0, 0.0).is_err());
        assert!(LngLat::validated(0.0, -90.5).is_err());
        assert!(LngLat::validated(f64::NAN, 0.0).is_err());
        assert!(LngLat::validated(-180.0, 90.0).is_ok());
    }

    #[test]
    fn test_viewport_normalized() {
        let view = ViewportState::new(LngLat::new(200.0, -100.0), 30.0).normalized();
        assert_eq!(view.center, LngLat::new(-160.0, -90.0));
        assert_eq!(view.zoom, MAX_ZOOM);
        assert!(view.is_valid());

        let view = ViewportState::new(LngLat::new(f64::NAN, 0.0), f64::INFINITY).normalized();
        assert_eq!(view, ViewportState::default());
    }

    #[test]
    fn test_longitude_wraps_across_antimeridian() {
        assert_eq!(LngLat::new(190.0, 10.0).normalized(), LngLat::new(-170.0, 10.0));
        assert_eq!(LngLat::new(-190.0, 10.0).normalized(), LngLat::new(170.0, 10.0));
        assert_eq!(LngLat::new(540.0, 0.0).normalized(), LngLat::new(-180.0, 0.0));
        assert_eq!(LngLat::new(180.0, 0.0).normalized(), LngLat::new(180.0, 0.0));
    }

    #[test]
    fn test_default_viewport_is_valid() {
        assert!(ViewportState::default().is_valid());
    }

    #[test]
    fn test_feature_deserializes_geocoding_shape() {
        let json = r#"{
            "id": "place.123",
            "type": "Feature",
            "place_type": ["place"],
            "relevance": 1,
            "properties": {"wikidata": "Q956"},
            "text": "Beijing",
            "place_name": "Beijing, China",
            "center": [116.3912, 39.9060],
            "geometry": {"type": "Point", "coordinates": [116.3912, 39.9060]},
            "context": [{"id": "country.1", "text": "China", "short_code": "cn"}]
        }"#;
        let feature: Feature = serde_json::from_str(json).unwrap();
        assert_eq!(feature.kind, "Feature");
        assert_eq!(feature.center, LngLat::new(116.3912, 39.9060));
        let context = feature.context.unwrap();
        assert_eq!(context[0].text, "China");
        assert_eq!(context[0].extra["short_code"], "cn");
    }

    #[test]
    fn test_hex_color_validation() {
        assert!(HexColor::new("#FF0000").is_ok());
        assert!(HexColor::new("#a1b2c3").is_ok());
        assert!(HexColor::new("FF0000").is_err());
        assert!(HexColor::new("#FFF").is_err());
        assert!(HexColor::new("#GG0000").is_err());
    }

    #[test]
    fn test_scheme_rejects_bad_color() {
        let json = r##"{"id": "s1", "layers": [{"id": "water", "color": "blue", "weight": 1.0}]}"##;
        assert!(serde_json::from_str::<SchemeWithId>(json).is_err());
    }

    #[test]
    fn test_equal_weights() {
        let scheme = ColorScheme::equal_weights(vec![
            ("water".to_string(), HexColor::new("#0000FF").unwrap()),
            ("land".to_string(), HexColor::new("#00FF00").unwrap()),
        ]);
        assert!(scheme.layers.iter().all(|l| (l.weight - 0.5).abs() < f64::EPSILON));
    }

    #[test]
    fn test_search_query_validation() {
        assert!(!is_valid_search_query("", 2));
        assert!(!is_valid_search_query("   ", 2));
        assert!(!is_valid_search_query(" a ", 2));
        assert!(is_valid_search_query("北京", 2));
        assert!(is_valid_search_query("Beijing", 2));
    }

    proptest! {
        #[test]
        fn prop_is_lng_lat_matches_ranges(lng in -400.0f64..400.0, lat in -200.0f64..200.0) {
            let expected = (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat);
            prop_assert_eq!(is_lng_lat(lng, lat), expected);
        }

        #[test]
        fn prop_normalized_is_always_valid(lng in -1e6f64..1e6, lat in -1e6f64..1e6, zoom in -100.0f64..100.0) {
            prop_assert!(ViewportState::new(LngLat::new(lng, lat), zoom).normalized().is_valid());
        }

        #[test]
        fn prop_normalized_is_idempotent(lng in -1e4f64..1e4, lat in -100.0f64..100.0, zoom in 0.0f64..30.0) {
            let once = ViewportState::new(LngLat::new(lng, lat), zoom).normalized();
            prop_assert_eq!(once.normalized(), once);
        }
    }
}
