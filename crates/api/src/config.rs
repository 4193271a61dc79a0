//! Application configuration loaded from environment variables.

use std::time::Duration;

use callback::{CallbackConfig, EventMask};
use gateway::GatewayConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `GIT_GATEWAY_URL`: gateway base URL; an in-memory gateway is used when unset
/// - `GIT_GATEWAY_TOKEN`: bearer token for the gateway
/// - `CALLBACK_URLS`: comma-separated webhook endpoints
/// - `CALLBACK_SECRET`: HMAC secret shared by all endpoints
/// - `CALLBACK_EVENTS`: comma-separated event mask (default: every event)
/// - `TRANSACTION_RETENTION_SECS`: age at which finished transactions are dropped (default: `3600`)
/// - `COMPENSATION_DRAIN_INTERVAL_SECS`: background drain period (default: `30`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub callback_urls: Vec<String>,
    pub callback_secret: Option<String>,
    pub callback_events: EventMask,
    pub transaction_retention: Duration,
    pub drain_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: Duration| {
            var(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            gateway_url: non_empty("GIT_GATEWAY_URL"),
            gateway_token: non_empty("GIT_GATEWAY_TOKEN"),
            callback_urls: var("CALLBACK_URLS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|u| !u.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            callback_secret: non_empty("CALLBACK_SECRET"),
            callback_events: var("CALLBACK_EVENTS")
                .map(|list| EventMask::parse_list(&list))
                .unwrap_or_default(),
            transaction_retention: secs("TRANSACTION_RETENTION_SECS", defaults.transaction_retention),
            drain_interval: secs("COMPENSATION_DRAIN_INTERVAL_SECS", defaults.drain_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Gateway settings, if a gateway URL is configured.
    pub fn gateway(&self) -> Option<GatewayConfig> {
        let url = self.gateway_url.as_ref()?;
        let config = GatewayConfig::new(url.as_str());
        Some(match &self.gateway_token {
            Some(token) => config.with_token(token.as_str()),
            None => config,
        })
    }

    /// One callback endpoint per configured URL.
    pub fn callbacks(&self) -> Vec<CallbackConfig> {
        self.callback_urls
            .iter()
            .map(|url| {
                let config = CallbackConfig::new(url.as_str()).with_events(self.callback_events.clone());
                match &self.callback_secret {
                    Some(secret) => config.with_secret(secret.as_str()),
                    None => config,
                }
            })
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            gateway_url: None,
            gateway_token: None,
            callback_urls: Vec::new(),
            callback_secret: None,
            callback_events: EventMask::all(),
            transaction_retention: Duration::from_secs(3600),
            drain_interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.gateway().is_none());
        assert!(config.callbacks().is_empty());
        assert_eq!(config.transaction_retention, Duration::from_secs(3600));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = from_map(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert!(config.callback_events.is_empty());
        assert_eq!(config.drain_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_callback_settings() {
        let config = from_map(&[
            ("CALLBACK_URLS", "http://a/hook, http://b/hook,,"),
            ("CALLBACK_SECRET", "s3cret"),
            ("CALLBACK_EVENTS", "repository.*,transaction.cancelled"),
        ]);

        let callbacks = config.callbacks();
        assert_eq!(callbacks.len(), 2);
        assert_eq!(callbacks[1].url, "http://b/hook");
        assert_eq!(callbacks[0].secret.as_deref(), Some("s3cret"));
        assert!(callbacks[0].events.matches("repository", "deleted"));
        assert!(!callbacks[0].events.matches("project", "created"));
    }

    #[test]
    fn test_gateway_settings() {
        let config = from_map(&[
            ("GIT_GATEWAY_URL", "http://gateway:8080"),
            ("GIT_GATEWAY_TOKEN", "t0ken"),
            ("PORT", "not-a-port"),
            ("TRANSACTION_RETENTION_SECS", "60"),
        ]);

        let gateway = config.gateway().unwrap();
        assert_eq!(gateway.base_url, "http://gateway:8080");
        assert_eq!(gateway.token.as_deref(), Some("t0ken"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.transaction_retention, Duration::from_secs(60));
    }
}
