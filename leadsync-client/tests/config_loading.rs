use std::io::Write;
use std::time::Duration;

use leadsync_client::{ClientConfig, ConfigError};
use proptest::prelude::*;

fn config_toml(poll_interval_secs: u64, max_entries: usize) -> String {
    format!(
        r#"
api_base_url = "https://leads.example.com"
request_timeout_ms = 2500

[auth]
email = "owner@example.com"
password = "secret"

[cache]
max_entries = {max_entries}

[channel]
poll_interval_secs = {poll_interval_secs}
max_reconnect_attempts = 3
"#
    )
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config_toml(15, 20).as_bytes()).unwrap();

    let config = ClientConfig::from_path(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.request_timeout(), Duration::from_millis(2500));
    assert_eq!(config.cache_config().max_entries, 20);
    let channel = config.channel_config();
    assert_eq!(channel.poll_interval, Duration::from_secs(15));
    assert_eq!(channel.max_reconnect_attempts, 3);
    assert_eq!(channel.backoff_cap, Duration::from_secs(30));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = ClientConfig::from_path(std::path::Path::new("/nonexistent/leadsync.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_missing_auth_is_parse_error() {
    let err = ClientConfig::from_toml_str("api_base_url = \"https://x\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

proptest! {
    #[test]
    fn positive_tuning_values_validate(poll in 1u64..3600, entries in 1usize..10_000) {
        let config = ClientConfig::from_toml_str(&config_toml(poll, entries)).unwrap();
        prop_assert!(config.validate().is_ok());
        prop_assert_eq!(config.channel_config().poll_interval, Duration::from_secs(poll));
    }

    #[test]
    fn zero_cache_ceiling_rejected(poll in 1u64..3600) {
        let config = ClientConfig::from_toml_str(&config_toml(poll, 0)).unwrap();
        let rejected = matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "cache.max_entries", .. })
        );
        prop_assert!(rejected);
    }
}
