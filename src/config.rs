use chrono_tz::Tz;

use crate::nlp::types::Language;

/// Runtime settings, resolved once at startup from `CALPARSE_*` environment
/// variables with coded defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Language assumed when detection confidence falls below the threshold.
    pub default_language: Language,
    /// Timezone used when a request does not carry a valid one.
    pub default_timezone: Tz,
    /// Event length assumed when only a start time is found, in hours.
    pub default_duration_hours: i64,
    /// Detection confidence below which the default language wins.
    pub language_fallback_threshold: f32,
    /// How long an unbound per-client queue survives before reclamation.
    pub queue_grace: std::time::Duration,
    /// Socket address the server listens on.
    pub bind_addr: String,
    /// Shared secret for signed client tokens.
    pub token_secret: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_language: Language::Uzbek,
            default_timezone: chrono_tz::Asia::Tashkent,
            default_duration_hours: 1,
            language_fallback_threshold: 0.3,
            queue_grace: std::time::Duration::from_secs(30),
            bind_addr: "127.0.0.1:8808".to_string(),
            token_secret: "calparse-dev-secret".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            default_language: read_env("CALPARSE_DEFAULT_LANGUAGE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.default_language),
            default_timezone: read_env("CALPARSE_DEFAULT_TIMEZONE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.default_timezone),
            default_duration_hours: read_env("CALPARSE_DEFAULT_DURATION_HOURS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.default_duration_hours),
            language_fallback_threshold: read_env("CALPARSE_LANGUAGE_FALLBACK_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.language_fallback_threshold),
            queue_grace: read_env("CALPARSE_QUEUE_GRACE_SECS")
                .and_then(|v| v.parse().ok())
                .map(std::time::Duration::from_secs)
                .unwrap_or(base.queue_grace),
            bind_addr: read_env("CALPARSE_BIND_ADDR").unwrap_or(base.bind_addr),
            token_secret: read_env("CALPARSE_TOKEN_SECRET").unwrap_or(base.token_secret),
        }
    }

    pub fn default_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.default_duration_hours)
    }
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.default_language, Language::Uzbek);
        assert_eq!(s.default_timezone, chrono_tz::Asia::Tashkent);
        assert_eq!(s.default_duration(), chrono::Duration::hours(1));
        assert!(s.language_fallback_threshold > 0.0);
    }
}
