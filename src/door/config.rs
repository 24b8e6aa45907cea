use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSecondsWithFrac};
use thiserror::Error;

use super::state::{Sensor, TargetState};
use crate::{dispatcher::DoorCommand, mqtt_client::DoorTopics};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("open_url must be a non-empty string")]
  MissingOpenUrl,
  #[error("close_url must be a non-empty string if auto_close is not used")]
  MissingCloseUrl,
  #[error("auto_close cannot be used with has_closed_sensor or has_open_sensor")]
  AutoCloseWithSensor,
  #[error("auto_close cannot be used with a webhook, remove webhook_port or set it to zero")]
  AutoCloseWithWebhook,
  #[error("has_closed_sensor or has_open_sensor must be set if auto_close is not used")]
  NoSensor,
  #[error("invalid http_method: {0}")]
  InvalidMethod(String),
  #[error("webhook port {0} is used by more than one door")]
  DuplicateWebhookPort(u16),
}

/// A door's configuration as written in the configuration file, before validation.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct DoorSettings {
  /// The URL requested to open the door
  pub open_url: String,

  /// The URL requested to close the door, not needed for auto closing doors
  #[serde(default)]
  pub close_url: Option<String>,

  #[serde_as(as = "DurationSecondsWithFrac<f64>")]
  #[serde(default = "default_travel_time")]
  /// How long the door is expected to take to open
  pub open_time: Duration,

  #[serde_as(as = "DurationSecondsWithFrac<f64>")]
  #[serde(default = "default_travel_time")]
  /// How long the door is expected to take to close
  pub close_time: Duration,

  #[serde(default)]
  pub has_open_sensor: bool,

  #[serde(default)]
  pub has_closed_sensor: bool,

  /// The door closes by itself some time after opening, there is no close command
  #[serde(default)]
  pub auto_close: bool,

  #[serde_as(as = "DurationSecondsWithFrac<f64>")]
  #[serde(default = "default_auto_close_delay")]
  /// How long an auto closing door stays open before it starts closing
  pub auto_close_delay: Duration,

  /// The port sensor webhooks are received on, if any
  #[serde(default)]
  pub webhook_port: Option<u16>,

  #[serde(default = "default_http_method")]
  pub http_method: String,

  #[serde_as(as = "DurationMilliSeconds<u64>")]
  #[serde(default = "default_timeout")]
  /// How long a door command may take before it is considered failed
  pub timeout: Duration,

  #[serde(default)]
  pub username: Option<String>,

  #[serde(default)]
  pub password: Option<String>,

  /// Topics used to expose the door over MQTT
  #[serde(default)]
  pub mqtt: Option<DoorTopics>,
}

fn default_travel_time() -> Duration {
  Duration::from_secs(10)
}

fn default_auto_close_delay() -> Duration {
  Duration::from_secs(20)
}

fn default_http_method() -> String {
  "GET".to_owned()
}

fn default_timeout() -> Duration {
  Duration::from_millis(3000)
}

impl DoorSettings {
  /// Settings with every optional value at its default
  pub fn new(open_url: impl Into<String>) -> Self {
    DoorSettings {
      open_url: open_url.into(),
      close_url: None,
      open_time: default_travel_time(),
      close_time: default_travel_time(),
      has_open_sensor: false,
      has_closed_sensor: false,
      auto_close: false,
      auto_close_delay: default_auto_close_delay(),
      webhook_port: None,
      http_method: default_http_method(),
      timeout: default_timeout(),
      username: None,
      password: None,
      mqtt: None,
    }
  }
}

/// A validated, immutable door configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "DoorSettings")]
pub struct DoorConfig {
  pub open_url: String,
  pub close_url: Option<String>,
  pub open_time: Duration,
  pub close_time: Duration,
  pub has_open_sensor: bool,
  pub has_closed_sensor: bool,
  pub auto_close: bool,
  pub auto_close_delay: Duration,
  pub webhook_port: Option<u16>,
  pub http_method: Method,
  pub timeout: Duration,
  pub credentials: Option<(String, String)>,
  pub mqtt: Option<DoorTopics>,
}

impl TryFrom<DoorSettings> for DoorConfig {
  type Error = ConfigError;

  fn try_from(settings: DoorSettings) -> Result<Self, Self::Error> {
    let has_sensor = settings.has_open_sensor || settings.has_closed_sensor;
    // a port of zero disables the webhook
    let webhook_port = settings.webhook_port.filter(|port| *port != 0);
    let close_url = settings.close_url.filter(|url| !url.is_empty());

    if settings.auto_close && has_sensor {
      return Err(ConfigError::AutoCloseWithSensor);
    }
    if settings.open_url.is_empty() {
      return Err(ConfigError::MissingOpenUrl);
    }
    if !settings.auto_close && close_url.is_none() {
      return Err(ConfigError::MissingCloseUrl);
    }
    if settings.auto_close && webhook_port.is_some() {
      return Err(ConfigError::AutoCloseWithWebhook);
    }
    if !settings.auto_close && !has_sensor {
      return Err(ConfigError::NoSensor);
    }

    let http_method = Method::from_bytes(settings.http_method.to_uppercase().as_bytes())
      .map_err(|_| ConfigError::InvalidMethod(settings.http_method.clone()))?;

    Ok(DoorConfig {
      open_url: settings.open_url,
      close_url,
      open_time: settings.open_time,
      close_time: settings.close_time,
      has_open_sensor: settings.has_open_sensor,
      has_closed_sensor: settings.has_closed_sensor,
      auto_close: settings.auto_close,
      auto_close_delay: settings.auto_close_delay,
      webhook_port,
      http_method,
      timeout: settings.timeout,
      credentials: settings.username.zip(settings.password),
      mqtt: settings.mqtt,
    })
  }
}

impl DoorConfig {
  pub fn has_sensor(&self, sensor: Sensor) -> bool {
    match sensor {
      Sensor::Open => self.has_open_sensor,
      Sensor::Closed => self.has_closed_sensor,
    }
  }

  /// The sensor that confirms the door reached the given target
  pub fn confirming_sensor(&self, target_state: TargetState) -> Option<Sensor> {
    let sensor = match target_state {
      TargetState::Open => Sensor::Open,
      TargetState::Closed => Sensor::Closed,
    };
    self.has_sensor(sensor).then_some(sensor)
  }

  /// How long the door is expected to take to reach the given target
  pub fn travel_time(&self, target_state: TargetState) -> Duration {
    match target_state {
      TargetState::Open => self.open_time,
      TargetState::Closed => self.close_time,
    }
  }

  /// The command that moves the door towards the given target, if the door has one
  pub fn command(&self, target_state: TargetState) -> Option<DoorCommand> {
    let url = match target_state {
      TargetState::Open => Some(&self.open_url),
      TargetState::Closed => self.close_url.as_ref(),
    }?;

    Some(DoorCommand {
      url: url.clone(),
      method: self.http_method.clone(),
      body: String::new(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sensored() -> DoorSettings {
    DoorSettings {
      close_url: Some("http://relay/close".to_owned()),
      has_closed_sensor: true,
      ..DoorSettings::new("http://relay/open")
    }
  }

  #[test]
  fn defaults_are_applied() {
    let config: DoorConfig = toml::from_str(
      r#"
        open_url = "http://relay/open"
        close_url = "http://relay/close"
        has_open_sensor = true
      "#,
    )
    .unwrap();

    assert_eq!(config.open_time, Duration::from_secs(10));
    assert_eq!(config.close_time, Duration::from_secs(10));
    assert_eq!(config.auto_close_delay, Duration::from_secs(20));
    assert_eq!(config.timeout, Duration::from_millis(3000));
    assert_eq!(config.http_method, Method::GET);
    assert_eq!(config.webhook_port, None);
    assert_eq!(config.credentials, None);
  }

  #[test]
  fn fractional_travel_times_parse() {
    let config: DoorConfig = toml::from_str(
      r#"
        open_url = "http://relay/open"
        close_url = "http://relay/close"
        has_closed_sensor = true
        open_time = 1.5
        close_time = 12
        http_method = "post"
        webhook_port = 0
      "#,
    )
    .unwrap();

    assert_eq!(config.open_time, Duration::from_millis(1500));
    assert_eq!(config.close_time, Duration::from_secs(12));
    assert_eq!(config.http_method, Method::POST);
    assert_eq!(config.webhook_port, None);
  }

  #[test]
  fn auto_close_excludes_sensors() {
    let settings = DoorSettings {
      auto_close: true,
      has_open_sensor: true,
      ..DoorSettings::new("http://relay/open")
    };
    assert_eq!(DoorConfig::try_from(settings).unwrap_err(), ConfigError::AutoCloseWithSensor);
  }

  #[test]
  fn auto_close_excludes_webhook() {
    let settings = DoorSettings {
      auto_close: true,
      webhook_port: Some(8080),
      ..DoorSettings::new("http://relay/open")
    };
    assert_eq!(DoorConfig::try_from(settings).unwrap_err(), ConfigError::AutoCloseWithWebhook);
  }

  #[test]
  fn auto_close_needs_no_close_url() {
    let settings = DoorSettings {
      auto_close: true,
      ..DoorSettings::new("http://relay/open")
    };
    let config = DoorConfig::try_from(settings).unwrap();
    assert!(config.command(TargetState::Closed).is_none());
    assert_eq!(config.command(TargetState::Open).unwrap().url, "http://relay/open");
  }

  #[test]
  fn urls_are_required() {
    let settings = DoorSettings {
      open_url: String::new(),
      ..sensored()
    };
    assert_eq!(DoorConfig::try_from(settings).unwrap_err(), ConfigError::MissingOpenUrl);

    let settings = DoorSettings {
      close_url: Some(String::new()),
      ..sensored()
    };
    assert_eq!(DoorConfig::try_from(settings).unwrap_err(), ConfigError::MissingCloseUrl);
  }

  #[test]
  fn a_sensor_is_required_without_auto_close() {
    let settings = DoorSettings {
      has_closed_sensor: false,
      ..sensored()
    };
    assert_eq!(DoorConfig::try_from(settings).unwrap_err(), ConfigError::NoSensor);
  }

  #[test]
  fn credentials_need_both_parts() {
    let settings = DoorSettings {
      username: Some("admin".to_owned()),
      ..sensored()
    };
    assert_eq!(DoorConfig::try_from(settings).unwrap().credentials, None);

    let settings = DoorSettings {
      username: Some("admin".to_owned()),
      password: Some("hunter2".to_owned()),
      ..sensored()
    };
    assert_eq!(
      DoorConfig::try_from(settings).unwrap().credentials,
      Some(("admin".to_owned(), "hunter2".to_owned()))
    );
  }

  #[test]
  fn invalid_method_is_rejected() {
    let settings = DoorSettings {
      http_method: "NOT A METHOD".to_owned(),
      ..sensored()
    };
    assert!(matches!(
      DoorConfig::try_from(settings),
      Err(ConfigError::InvalidMethod(_))
    ));
  }

  #[test]
  fn confirming_sensor_follows_wiring() {
    let config = DoorConfig::try_from(sensored()).unwrap();
    assert_eq!(config.confirming_sensor(TargetState::Closed), Some(Sensor::Closed));
    assert_eq!(config.confirming_sensor(TargetState::Open), None);
  }
}
