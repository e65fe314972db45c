//! CLI configuration.

use std::time::Duration;

use ratekeeper_fx::{EngineConfig, NbrbConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "plain" | "text" => Some(LogFormat::Plain),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Main CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Rate provider API root.
    pub provider_url: String,
    /// Per-request provider timeout.
    pub provider_timeout: Duration,
    /// Log output format.
    pub log_format: LogFormat,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Serialize concurrent misses on one key.
    pub single_flight: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        let provider = NbrbConfig::default();
        Self {
            provider_url: provider.base_url,
            provider_timeout: provider.timeout,
            log_format: LogFormat::Plain,
            log_level: "info".to_string(),
            single_flight: EngineConfig::default().single_flight,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("RATEKEEPER_PROVIDER_URL") {
            config.provider_url = url;
        }

        if let Some(secs) = lookup("RATEKEEPER_PROVIDER_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.provider_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(format) = lookup("RATEKEEPER_LOG_FORMAT") {
            if let Some(format) = LogFormat::parse(&format) {
                config.log_format = format;
            }
        }

        if let Some(level) = lookup("RUST_LOG") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_url.is_empty() {
            return Err("Provider URL cannot be empty".to_string());
        }

        if !self.provider_url.starts_with("http://") && !self.provider_url.starts_with("https://") {
            return Err(format!(
                "Provider URL must use http or https: {}",
                self.provider_url
            ));
        }

        if self.provider_timeout.is_zero() {
            return Err("Provider timeout cannot be 0".to_string());
        }

        Ok(())
    }

    pub fn provider_config(&self) -> NbrbConfig {
        NbrbConfig {
            base_url: self.provider_url.clone(),
            timeout: self.provider_timeout,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            single_flight: self.single_flight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider_url, "https://api.nbrb.by");
        assert_eq!(config.log_format, LogFormat::Plain);
    }

    #[test]
    fn test_from_lookup() {
        let config = CliConfig::from_lookup(lookup(&[
            ("RATEKEEPER_PROVIDER_URL", "http://localhost:9000"),
            ("RATEKEEPER_PROVIDER_TIMEOUT_SECS", "3"),
            ("RATEKEEPER_LOG_FORMAT", "JSON"),
            ("RUST_LOG", "ratekeeper_fx=debug"),
        ]));

        assert_eq!(config.provider_url, "http://localhost:9000");
        assert_eq!(config.provider_timeout, Duration::from_secs(3));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, "ratekeeper_fx=debug");
        assert_eq!(config.provider_config().base_url, "http://localhost:9000");
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        let config = CliConfig::from_lookup(lookup(&[
            ("RATEKEEPER_PROVIDER_TIMEOUT_SECS", "soon"),
            ("RATEKEEPER_LOG_FORMAT", "xml"),
        ]));

        assert_eq!(config.provider_timeout, Duration::from_secs(10));
        assert_eq!(config.log_format, LogFormat::Plain);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = CliConfig::default();
        config.provider_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = CliConfig::default();
        config.provider_url = "ftp://api.nbrb.by".to_string();
        assert!(config.validate().is_err());

        let mut config = CliConfig::default();
        config.provider_url.clear();
        assert!(config.validate().is_err());
    }
}
