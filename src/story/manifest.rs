//! Onboarding manifest — versioned locale → image filename mapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoryError};

/// Locale every manifest is expected to carry.
pub const FALLBACK_LOCALE: &str = "en";

/// Remote descriptor of the onboarding story images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub languages: BTreeMap<String, Vec<String>>,
}

/// Policy when neither the active locale nor `en` has images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocaleFallback {
    /// Fail the download.
    #[default]
    Strict,
    /// Use the first locale (lexical order) that has images.
    AnyAvailable,
}

impl std::str::FromStr for LocaleFallback {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "any" | "any_available" => Ok(Self::AnyAvailable),
            other => Err(ConfigError::InvalidValue {
                key: "STORY_LOCALE_FALLBACK".into(),
                message: format!("expected `strict` or `any`, got `{other}`"),
            }),
        }
    }
}

impl Manifest {
    fn images_for(&self, locale: &str) -> Option<&[String]> {
        self.languages
            .get(locale)
            .map(Vec::as_slice)
            .filter(|files| !files.is_empty())
    }

    /// Resolve the image filenames for `locale`: exact match, then `en`, then
    /// whatever `fallback` allows.
    pub fn resolve_filenames(
        &self,
        locale: &str,
        fallback: LocaleFallback,
    ) -> Result<&[String], StoryError> {
        if let Some(files) = self.images_for(locale) {
            return Ok(files);
        }
        if let Some(files) = self.images_for(FALLBACK_LOCALE) {
            tracing::debug!(locale, "No onboarding images for locale, using en");
            return Ok(files);
        }
        match fallback {
            LocaleFallback::Strict => Err(StoryError::NoImagesForLocale {
                locale: locale.to_string(),
            }),
            LocaleFallback::AnyAvailable => self
                .languages
                .iter()
                .find(|(_, files)| !files.is_empty())
                .map(|(found, files)| {
                    tracing::warn!(locale, fallback = %found, "Manifest has no en entry");
                    files.as_slice()
                })
                .ok_or_else(|| StoryError::NoImagesForLocale {
                    locale: locale.to_string(),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(entries: &[(&str, &[&str])]) -> Manifest {
        Manifest {
            version: "v1".into(),
            languages: entries
                .iter()
                .map(|(locale, files)| {
                    (
                        locale.to_string(),
                        files.iter().map(|f| f.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn exact_locale_wins() {
        let m = manifest(&[("en", &["a", "b"]), ("fr", &["c", "d"])]);
        let files = m.resolve_filenames("fr", LocaleFallback::Strict).unwrap();
        assert_eq!(files, ["c", "d"]);
    }

    #[test]
    fn unknown_locale_falls_back_to_en() {
        let m = manifest(&[("en", &["a", "b"]), ("fr", &["c", "d"])]);
        let files = m.resolve_filenames("de", LocaleFallback::Strict).unwrap();
        assert_eq!(files, ["a", "b"]);
    }

    #[test]
    fn empty_entry_counts_as_missing() {
        let m = manifest(&[("en", &["a"]), ("fr", &[])]);
        let files = m.resolve_filenames("fr", LocaleFallback::Strict).unwrap();
        assert_eq!(files, ["a"]);
    }

    #[test]
    fn strict_fails_without_en() {
        let m = manifest(&[("fr", &["c"])]);
        let err = m.resolve_filenames("de", LocaleFallback::Strict).unwrap_err();
        assert!(matches!(err, StoryError::NoImagesForLocale { locale } if locale == "de"));
    }

    #[test]
    fn any_available_picks_first_locale() {
        let m = manifest(&[("pt-BR", &["p"]), ("fr", &["c"])]);
        let files = m
            .resolve_filenames("de", LocaleFallback::AnyAvailable)
            .unwrap();
        assert_eq!(files, ["c"]);
    }

    #[test]
    fn any_available_still_fails_on_empty_manifest() {
        let m = manifest(&[]);
        assert!(m.resolve_filenames("en", LocaleFallback::AnyAvailable).is_err());
    }

    #[test]
    fn parses_wire_format() {
        let json = r#"{"version":"2024-05","languages":{"en":["01","02"],"es":["01_es"]}}"#;
        let m: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.version, "2024-05");
        assert_eq!(m.languages["en"], vec!["01", "02"]);
    }

    #[test]
    fn fallback_policy_from_str() {
        assert_eq!("strict".parse::<LocaleFallback>().unwrap(), LocaleFallback::Strict);
        assert_eq!(" ANY ".parse::<LocaleFallback>().unwrap(), LocaleFallback::AnyAvailable);
        assert!("maybe".parse::<LocaleFallback>().is_err());
    }
}
