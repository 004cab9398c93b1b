//! Active locale lookup.

/// Locale provider collaborator.
pub trait LocaleProvider: Send + Sync {
    /// BCP-47-like tag of the UI locale, e.g. `en` or `pt-BR`.
    fn active_locale(&self) -> String;
}

/// Always returns the same locale.
#[derive(Debug, Clone)]
pub struct FixedLocale(pub String);

impl LocaleProvider for FixedLocale {
    fn active_locale(&self) -> String {
        self.0.clone()
    }
}

/// Reads `STORY_LOCALE`, then `LANG`, on every call.
#[derive(Debug, Clone, Default)]
pub struct EnvLocaleProvider;

impl LocaleProvider for EnvLocaleProvider {
    fn active_locale(&self) -> String {
        std::env::var("STORY_LOCALE")
            .ok()
            .or_else(|| std::env::var("LANG").ok())
            .and_then(|raw| normalize_locale(&raw))
            .unwrap_or_else(|| "en".to_string())
    }
}

/// Turn a POSIX locale (`fr_FR.UTF-8@euro`) into a tag (`fr-FR`).
/// Returns `None` for empty input and the `C`/`POSIX` locales.
pub fn normalize_locale(raw: &str) -> Option<String> {
    let tag = raw
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace('_', "-");
    match tag.as_str() {
        "" | "C" | "POSIX" => None,
        _ => Some(tag),
    }
}
