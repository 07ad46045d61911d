//! The shipped sample configuration.

use scanner_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use serial_test::serial;

#[test]
#[serial]
fn test_sample_config_matches_defaults() {
    let config = BridgeConfig::load_from(DEFAULT_CONFIG_PATH).unwrap();
    assert_eq!(config.sdk.names, BridgeConfig::default().sdk.names);
    assert_eq!(config.channels, BridgeConfig::default().channels);
    assert!(config.sdk.library_path.is_none());
}

#[test]
#[serial]
fn test_sample_config_renders_back_to_toml() {
    let config = BridgeConfig::load_from(DEFAULT_CONFIG_PATH).unwrap();
    let rendered = config.to_toml().unwrap();
    let reparsed: BridgeConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(reparsed, config);
}
