//! Tracing / logging initialisation.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging settings, read from `LOG_LEVEL` and `LOG_JSON`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level or a full filter directive ("info", "info,tokensync_rpc=debug").
    pub level: String,
    /// Emit JSON structured logs (true) or human-readable text (false)
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl LogConfig {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            level: lookup("LOG_LEVEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.level),
            json: lookup("LOG_JSON")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.json),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Initialise tracing. Call once at startup.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_level_and_json_flag() {
        let cfg = LogConfig::from_lookup(|key| match key {
            "LOG_LEVEL" => Some("debug,sqlx=warn".into()),
            "LOG_JSON" => Some("true".into()),
            _ => None,
        });
        assert_eq!(cfg.level, "debug,sqlx=warn");
        assert!(cfg.json);
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(LogConfig::from_lookup(|_| None), LogConfig::default());
    }
}
