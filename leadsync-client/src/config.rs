//! Configuration loading for the leadsync client.
//!
//! Connection and auth fields are required. Tuning sections default to the
//! documented values so a minimal file only names the server and operator.

use leadsync_cache::{CacheConfig, TtlPolicy, TtlRule};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::ChannelConfig;
use crate::coordinator::SyncConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// WebSocket endpoint for live notifications. Absent means polling only.
    #[serde(default)]
    pub push_endpoint: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub channel: ChannelSection,
    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub max_entries: usize,
    pub default_ttl_secs: u64,
    pub eviction_tolerance_secs: u64,
    /// Replaces the built-in TTL table when non-empty.
    pub ttl_rules: Vec<TtlRuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TtlRuleConfig {
    pub pattern: String,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSection {
    pub max_reconnect_attempts: u32,
    pub backoff_cap_secs: u64,
    pub poll_interval_secs: u64,
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    pub min_refresh_interval_secs: u64,
    pub prefetch_delay_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: 50,
            default_ttl_secs: 300,
            eviction_tolerance_secs: 60,
            ttl_rules: Vec::new(),
        }
    }
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            backoff_cap_secs: 30,
            poll_interval_secs: 30,
            event_buffer: 256,
        }
    }
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            min_refresh_interval_secs: 30,
            prefetch_delay_ms: 1000,
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or LEADSYNC_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if let Some(endpoint) = &self.push_endpoint {
            if endpoint.trim().is_empty() {
                return Err(invalid("push_endpoint", "must not be empty when set"));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.auth.email.trim().is_empty() {
            return Err(invalid("auth.email", "must not be empty"));
        }
        if self.auth.password.is_empty() {
            return Err(invalid("auth.password", "must not be empty"));
        }
        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", "must be > 0"));
        }
        if self.cache.ttl_rules.iter().any(|rule| rule.pattern.is_empty()) {
            return Err(invalid("cache.ttl_rules", "pattern must not be empty"));
        }
        if self.channel.poll_interval_secs == 0 {
            return Err(invalid("channel.poll_interval_secs", "must be > 0"));
        }
        if self.channel.backoff_cap_secs == 0 {
            return Err(invalid("channel.backoff_cap_secs", "must be > 0"));
        }
        if self.channel.event_buffer == 0 {
            return Err(invalid("channel.event_buffer", "must be > 0"));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_config(&self) -> CacheConfig {
        let default_ttl = Duration::from_secs(self.cache.default_ttl_secs);
        let rules = if self.cache.ttl_rules.is_empty() {
            TtlPolicy::default().rules().to_vec()
        } else {
            self.cache
                .ttl_rules
                .iter()
                .map(|rule| TtlRule::new(rule.pattern.clone(), Duration::from_secs(rule.ttl_secs)))
                .collect()
        };

        CacheConfig::new()
            .with_max_entries(self.cache.max_entries)
            .with_eviction_tolerance(Duration::from_secs(self.cache.eviction_tolerance_secs))
            .with_ttl_policy(TtlPolicy::new(rules, default_ttl))
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            max_reconnect_attempts: self.channel.max_reconnect_attempts,
            backoff_cap: Duration::from_secs(self.channel.backoff_cap_secs),
            poll_interval: Duration::from_secs(self.channel.poll_interval_secs),
            ..ChannelConfig::default()
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            min_refresh_interval: Duration::from_secs(self.sync.min_refresh_interval_secs),
            prefetch_delay: Duration::from_millis(self.sync.prefetch_delay_ms),
            ..SyncConfig::default()
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("LEADSYNC_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        api_base_url = "https://leads.example.com/"

        [auth]
        email = "owner@example.com"
        password = "hunter2"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ClientConfig::from_toml_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.base_url(), "https://leads.example.com");
        assert!(config.push_endpoint.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));

        let cache = config.cache_config();
        assert_eq!(cache.max_entries, 50);
        assert_eq!(cache.eviction_tolerance, Duration::from_secs(60));
        assert_eq!(cache.ttl_policy, TtlPolicy::default());

        let channel = config.channel_config();
        assert_eq!(channel.max_reconnect_attempts, 5);
        assert_eq!(channel.poll_interval, Duration::from_secs(30));

        let sync = config.sync_config();
        assert_eq!(sync.min_refresh_interval, Duration::from_secs(30));
        assert_eq!(sync.prefetch_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_custom_ttl_rules_replace_table() {
        let toml = format!(
            "{MINIMAL}\n[cache]\ndefault_ttl_secs = 90\n[[cache.ttl_rules]]\npattern = \"submissions\"\nttl_secs = 5\n"
        );
        let config = ClientConfig::from_toml_str(&toml).unwrap();
        let policy = config.cache_config().ttl_policy;
        assert_eq!(policy.rules().len(), 1);
        assert_eq!(policy.ttl_for("submissions:page=1"), Duration::from_secs(5));
        assert_eq!(policy.ttl_for("dashboard-data"), Duration::from_secs(90));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = format!("{MINIMAL}\n[channel]\nretries = 3\n");
        let err = ClientConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let toml = format!("{MINIMAL}\n[channel]\npoll_interval_secs = 0\n");
        let config = ClientConfig::from_toml_str(&toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "channel.poll_interval_secs", .. }
        ));
    }

    #[test]
    fn test_blank_email_rejected() {
        let toml = MINIMAL.replace("owner@example.com", "  ");
        let config = ClientConfig::from_toml_str(&toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "auth.email", .. })
        ));
    }
}
