use std::{
  collections::{HashMap, HashSet},
  fs,
  path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
  door::{ConfigError, DoorConfig, Identifier},
  error::GarageResult,
  mqtt_client::MqttClientConfig,
};

/// The configuration file read when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "garage-config.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
  /// Log at debug level
  #[serde(default)]
  pub debug: bool,
  /// Where door state is persisted between restarts
  #[serde(default = "default_state_dir")]
  pub state_dir: PathBuf,
  /// The MQTT configuration, doors are only exposed over MQTT if this is set
  pub mqtt_client: Option<MqttClientConfig>,
  /// A list of all doors to control
  #[serde(default)]
  pub doors: HashMap<Identifier, DoorConfig>,
}

fn default_state_dir() -> PathBuf {
  PathBuf::from(".")
}

impl Config {
  pub fn from_file(path: impl AsRef<Path>) -> GarageResult<Config> {
    let config = fs::read_to_string(path)?;
    Config::from_toml(&config)
  }

  pub fn from_toml(config: &str) -> GarageResult<Config> {
    let config: Config = toml::from_str(config)?;
    config.validate()?;
    Ok(config)
  }

  /// Checks that hold across doors, each door validates itself while parsing
  fn validate(&self) -> Result<(), ConfigError> {
    let mut ports = HashSet::new();
    for port in self.doors.values().filter_map(|door| door.webhook_port) {
      if !ports.insert(port) {
        return Err(ConfigError::DuplicateWebhookPort(port));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::error::GarageError;

  #[test]
  fn parses_a_full_config() {
    let config = Config::from_toml(
      r#"
        debug = true
        state_dir = "/var/lib/garage"

        [mqtt_client]
        host = "broker.local"
        availability_topic = "garage/availability"

        [doors.main]
        open_url = "http://relay.local/open"
        close_url = "http://relay.local/close"
        has_closed_sensor = true
        open_time = 12.5
        webhook_port = 8080
        http_method = "post"

        [doors.main.mqtt]
        command_topic = "garage/main/set"
        state_topic = "garage/main/state"
        target_topic = "garage/main/target"

        [doors.shed]
        open_url = "http://test-donotcall/shed"
        auto_close = true
        auto_close_delay = 5
        webhook_port = 0
      "#,
    )
    .unwrap();

    assert!(config.debug);
    assert_eq!(config.state_dir, PathBuf::from("/var/lib/garage"));
    assert_eq!(config.mqtt_client.unwrap().host, "broker.local");

    let main = &config.doors[&Identifier::from("main")];
    assert_eq!(main.open_time, Duration::from_millis(12_500));
    assert_eq!(main.close_time, Duration::from_secs(10));
    assert_eq!(main.webhook_port, Some(8080));
    assert_eq!(main.http_method, reqwest::Method::POST);
    assert_eq!(main.timeout, Duration::from_millis(3000));
    assert_eq!(main.mqtt.as_ref().unwrap().target_topic.as_deref(), Some("garage/main/target"));

    let shed = &config.doors[&Identifier::from("shed")];
    assert!(shed.auto_close);
    assert_eq!(shed.auto_close_delay, Duration::from_secs(5));
    assert_eq!(shed.webhook_port, None);
    assert!(shed.mqtt.is_none());
  }

  #[test]
  fn defaults_apply_to_an_empty_config() {
    let config = Config::from_toml("").unwrap();

    assert!(!config.debug);
    assert_eq!(config.state_dir, PathBuf::from("."));
    assert!(config.mqtt_client.is_none());
    assert!(config.doors.is_empty());
  }

  #[test]
  fn invalid_doors_are_rejected() {
    let err = Config::from_toml(
      r#"
        [doors.main]
        open_url = "http://relay.local/open"
        has_closed_sensor = true
      "#,
    )
    .unwrap_err();

    assert!(matches!(err, GarageError::ConfigFile(_)));
    assert!(err.to_string().contains("close_url"));
  }

  #[test]
  fn webhook_ports_cannot_be_shared() {
    let err = Config::from_toml(
      r#"
        [doors.left]
        open_url = "http://relay.local/left/open"
        close_url = "http://relay.local/left/close"
        has_open_sensor = true
        webhook_port = 8080

        [doors.right]
        open_url = "http://relay.local/right/open"
        close_url = "http://relay.local/right/close"
        has_open_sensor = true
        webhook_port = 8080
      "#,
    )
    .unwrap_err();

    assert!(matches!(
      err,
      GarageError::Config(ConfigError::DuplicateWebhookPort(8080))
    ));
  }

  #[test]
  fn missing_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join(DEFAULT_CONFIG_PATH)).unwrap_err();
    assert!(matches!(err, GarageError::Io(_)));
  }
}
