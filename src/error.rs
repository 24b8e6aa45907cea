use thiserror::Error;
use tokio::task::JoinError;

use crate::{
  dispatcher::DispatchError,
  door::{config::ConfigError, identifier::Identifier, WebhookError},
};

pub type GarageResult<T> = Result<T, GarageError>;

#[derive(Debug, Error)]
pub enum GarageError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("unable to read configuration: {0}")]
  ConfigFile(#[from] toml::de::Error),
  #[error("door command for {identifier:?} failed: {source}")]
  Command {
    identifier: Identifier,
    #[source]
    source: DispatchError,
  },
  #[error("unable to create HTTP client: {0}")]
  HttpClient(#[from] DispatchError),
  #[error("a door command for {0:?} is already in flight")]
  CommandInFlight(Identifier),
  #[error("the controller for {0:?} has stopped")]
  ControllerClosed(Identifier),
  #[error("webhook rejected: {0}")]
  Webhook(#[from] WebhookError),
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  MqttClient(#[from] rumqttc::ClientError),
  #[error(transparent)]
  MqttConnection(#[from] rumqttc::ConnectionError),
  #[error(transparent)]
  JoinError(#[from] JoinError),
}
