//! Small UI-facing state holders: color schemes and user preferences.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capabilities::{KvBackend, Storage};
use crate::model::ColorScheme;
use crate::{COLOR_SCHEME_KEY, LOCALE_KEY};

/// The scheme being edited plus the candidates generated from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorSchemeStore {
    current: ColorScheme,
    schemes: Vec<ColorScheme>,
}

impl ColorSchemeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the persisted current scheme, if any.
    pub fn restore<B: KvBackend>(storage: &Storage<B>) -> Self {
        Self {
            current: storage.get_or(COLOR_SCHEME_KEY, ColorScheme::default()),
            schemes: Vec::new(),
        }
    }

    pub fn persist<B: KvBackend>(&self, storage: &Storage<B>) {
        storage.set(COLOR_SCHEME_KEY, &self.current);
    }

    pub fn current(&self) -> &ColorScheme {
        &self.current
    }

    pub fn schemes(&self) -> &[ColorScheme] {
        &self.schemes
    }

    pub fn set_current(&mut self, scheme: ColorScheme) {
        debug!(layers = scheme.layers.len(), "current scheme set");
        self.current = scheme;
    }

    pub fn add_scheme(&mut self, scheme: ColorScheme) {
        self.schemes.push(scheme);
    }

    pub fn set_schemes(&mut self, schemes: Vec<ColorScheme>) {
        self.schemes = schemes;
    }

    pub fn clear_schemes(&mut self) {
        self.schemes.clear();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "zh-CN")]
    ZhCn,
    #[serde(rename = "en-US")]
    EnUs,
}

impl Locale {
    pub const fn as_str(self) -> &'static str {
        match self {
            Locale::ZhCn => "zh-CN",
            Locale::EnUs => "en-US",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zh-CN" => Ok(Locale::ZhCn),
            "en-US" => Ok(Locale::EnUs),
            other => Err(format!("unsupported locale '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Locale is persisted; theme lives for the session only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preferences {
    locale: Locale,
    theme: Theme,
}

impl Preferences {
    /// An unknown stored locale falls back to the default.
    pub fn restore<B: KvBackend>(storage: &Storage<B>) -> Self {
        Self {
            locale: storage.get_or(LOCALE_KEY, Locale::default()),
            theme: Theme::default(),
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn set_locale<B: KvBackend>(&mut self, locale: Locale, storage: &Storage<B>) {
        self.locale = locale;
        storage.set(LOCALE_KEY, &locale);
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MemoryBackend;
    use crate::model::HexColor;

    fn scheme(color: &str) -> ColorScheme {
        ColorScheme::equal_weights(vec![("water".into(), HexColor::new(color).unwrap())])
    }

    #[test]
    fn test_scheme_list_operations() {
        let mut store = ColorSchemeStore::new();
        store.add_scheme(scheme("#000000"));
        store.add_scheme(scheme("#FFFFFF"));
        assert_eq!(store.schemes().len(), 2);

        store.set_schemes(vec![scheme("#123456")]);
        assert_eq!(store.schemes(), &[scheme("#123456")]);

        store.clear_schemes();
        assert!(store.schemes().is_empty());
    }

    #[test]
    fn test_current_scheme_persists() {
        let storage = Storage::new(MemoryBackend::new());
        let mut store = ColorSchemeStore::new();
        store.set_current(scheme("#1E90FF"));
        store.add_scheme(scheme("#000000"));
        store.persist(&storage);

        let restored = ColorSchemeStore::restore(&storage);
        assert_eq!(restored.current(), &scheme("#1E90FF"));
        assert!(restored.schemes().is_empty());
    }

    #[test]
    fn test_restore_ignores_corrupt_scheme() {
        let storage = Storage::new(MemoryBackend::new());
        storage.backend().set_raw(COLOR_SCHEME_KEY, "{not json").unwrap();
        assert_eq!(ColorSchemeStore::restore(&storage).current(), &ColorScheme::default());
    }

    #[test]
    fn test_locale_round_trip_through_storage() {
        let storage = Storage::new(MemoryBackend::new());
        let mut prefs = Preferences::restore(&storage);
        assert_eq!(prefs.locale(), Locale::ZhCn);

        prefs.set_locale(Locale::EnUs, &storage);
        assert_eq!(storage.backend().get_raw(LOCALE_KEY).unwrap().as_deref(), Some("\"en-US\""));
        assert_eq!(Preferences::restore(&storage).locale(), Locale::EnUs);
    }

    #[test]
    fn test_unknown_locale_falls_back() {
        let storage = Storage::new(MemoryBackend::new());
        storage.backend().set_raw(LOCALE_KEY, "\"fr-FR\"").unwrap();
        assert_eq!(Preferences::restore(&storage).locale(), Locale::ZhCn);
        assert!("fr-FR".parse::<Locale>().is_err());
        assert_eq!("en-US".parse::<Locale>(), Ok(Locale::EnUs));
    }

    #[test]
    fn test_toggle_theme() {
        let mut prefs = Preferences::default();
        assert_eq!(prefs.theme(), Theme::Light);
        assert_eq!(prefs.toggle_theme(), Theme::Dark);
        assert_eq!(prefs.toggle_theme(), Theme::Light);
        prefs.set_theme(Theme::Dark);
        assert_eq!(prefs.theme(), Theme::Dark);
    }
}
