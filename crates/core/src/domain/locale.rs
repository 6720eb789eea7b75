use serde::{Deserialize, Serialize};

/// Which of the two catalog locales a value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    Default,
    Alternate,
}

/// Maps locale codes (`sl`, `en`, ...) onto the default/alternate pair the
/// catalog is edited in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalePair {
    pub default: String,
    pub alternate: String,
}

impl LocalePair {
    pub fn new(default: impl Into<String>, alternate: impl Into<String>) -> Self {
        Self { default: default.into(), alternate: alternate.into() }
    }

    pub fn parse(&self, code: &str) -> Option<Locale> {
        let code = code.trim();
        if code.eq_ignore_ascii_case(&self.default) {
            Some(Locale::Default)
        } else if code.eq_ignore_ascii_case(&self.alternate) {
            Some(Locale::Alternate)
        } else {
            None
        }
    }

    pub fn code(&self, locale: Locale) -> &str {
        match locale {
            Locale::Default => &self.default,
            Locale::Alternate => &self.alternate,
        }
    }
}

impl Default for LocalePair {
    fn default() -> Self {
        Self::new("sl", "en")
    }
}

/// A value edited in both catalog locales. The alternate value is optional;
/// every read goes through [`Localized::resolve`] so the fallback rule lives
/// in one place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localized<T> {
    pub default: T,
    pub alternate: Option<T>,
}

impl<T> Localized<T> {
    pub fn new(default: T, alternate: Option<T>) -> Self {
        Self { default, alternate }
    }

    pub fn only_default(default: T) -> Self {
        Self { default, alternate: None }
    }

    pub fn resolve(&self, locale: Locale) -> &T {
        match locale {
            Locale::Default => &self.default,
            Locale::Alternate => self.alternate.as_ref().unwrap_or(&self.default),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Localized<U> {
        Localized { default: f(&self.default), alternate: self.alternate.as_ref().map(f) }
    }
}

impl<T: Clone> Localized<T> {
    /// Drops the alternate value, e.g. when the alternate locale of the owning
    /// entity has not been published yet.
    pub fn default_only(&self) -> Self {
        Self { default: self.default.clone(), alternate: None }
    }

    /// Both values with the fallback already applied.
    pub fn backfilled(&self) -> (T, T) {
        (self.default.clone(), self.resolve(Locale::Alternate).clone())
    }
}

impl Localized<String> {
    /// Treats a blank alternate string the same as a missing one.
    pub fn text(default: impl Into<String>, alternate: Option<&str>) -> Self {
        let alternate = alternate.map(str::trim).filter(|value| !value.is_empty());
        Self { default: default.into(), alternate: alternate.map(str::to_string) }
    }
}

#[cfg(test)]
mod tests {
    use super::{Locale, LocalePair, Localized};

    #[test]
    fn alternate_falls_back_to_default_when_absent() {
        let title = Localized::text("Rebula", None);

        assert_eq!(title.resolve(Locale::Default), "Rebula");
        assert_eq!(title.resolve(Locale::Alternate), "Rebula");
        assert_eq!(title.backfilled(), ("Rebula".to_string(), "Rebula".to_string()));
    }

    #[test]
    fn blank_alternate_is_treated_as_missing() {
        let title = Localized::text("Belo", Some("   "));

        assert_eq!(title.alternate, None);
        assert_eq!(title.resolve(Locale::Alternate), "Belo");
    }

    #[test]
    fn present_alternate_wins_for_alternate_locale() {
        let title = Localized::text("Belo", Some("White"));

        assert_eq!(title.resolve(Locale::Default), "Belo");
        assert_eq!(title.resolve(Locale::Alternate), "White");
    }

    #[test]
    fn locale_pair_parses_codes_case_insensitively() {
        let pair = LocalePair::default();

        assert_eq!(pair.parse("SL"), Some(Locale::Default));
        assert_eq!(pair.parse("en"), Some(Locale::Alternate));
        assert_eq!(pair.parse("de"), None);
        assert_eq!(pair.code(Locale::Alternate), "en");
    }
}
