use rumqttc::{AsyncClient, ClientError, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use serde::Deserialize;
use tokio::task::JoinSet;

pub use self::{publisher::publish_state, receiver::route_command};
use crate::{door::DoorHandle, error::GarageError};

mod publisher;
mod receiver;

const CHANNEL_SIZE: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttClientConfig {
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  #[serde(default = "default_client_id")]
  pub client_id: String,
  pub username: Option<String>,
  pub password: Option<String>,
  /// The topic availability is announced on, with a last will marking the bridge offline
  pub availability_topic: Option<String>,
  #[serde(default = "default_online_availability")]
  pub online_availability: String,
  #[serde(default = "default_offline_availability")]
  pub offline_availability: String,
}

fn default_port() -> u16 {
  1883
}

fn default_client_id() -> String {
  "garage-door-controller".to_owned()
}

fn default_online_availability() -> String {
  "online".to_owned()
}

fn default_offline_availability() -> String {
  "offline".to_owned()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DoorTopics {
  /// The name of the MQTT topic open/close commands are received on
  pub command_topic: String,
  /// The name of the MQTT topic the current state is published on
  pub state_topic: String,
  /// The name of the MQTT topic the target state is published on
  pub target_topic: Option<String>,
}

/// A door exposed over MQTT
#[derive(Debug, Clone)]
pub struct MqttDoor {
  pub handle: DoorHandle,
  pub topics: DoorTopics,
}

pub struct MqttClient {
  client: AsyncClient,
  eventloop: EventLoop,
  config: MqttClientConfig,
}

impl MqttClient {
  pub fn with_config(config: MqttClientConfig) -> MqttClient {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
      options.set_credentials(username, password);
    }
    if let Some(topic) = &config.availability_topic {
      options.set_last_will(LastWill::new(
        topic,
        config.offline_availability.clone(),
        QoS::AtLeastOnce,
        true,
      ));
    }

    let (client, eventloop) = AsyncClient::new(options, CHANNEL_SIZE);
    MqttClient {
      client,
      eventloop,
      config,
    }
  }

  /// Bridge `doors` to the broker.
  /// Runs forever unless an error occurs
  pub async fn run(self, doors: Vec<MqttDoor>) -> GarageError {
    let MqttClient {
      client,
      mut eventloop,
      config,
    } = self;
    log::info!("Connecting to MQTT broker at {}:{}", config.host, config.port);

    // requests are only sent while the event loop is polled, so they are made from their own tasks
    let mut tasks = JoinSet::new();
    tasks.spawn(announce(client.clone(), config, doors.clone()));
    for door in &doors {
      tasks.spawn(publish_state(client.clone(), door.clone()));
    }

    loop {
      match eventloop.poll().await {
        Ok(Event::Incoming(Packet::Publish(publish))) => {
          route_command(&doors, &publish.topic, &publish.payload);
        }
        Ok(_) => {}
        Err(err) => {
          tasks.abort_all();
          return err.into();
        }
      }
    }
  }
}

/// Announce our availability and subscribe to each door's commands
async fn announce(client: AsyncClient, config: MqttClientConfig, doors: Vec<MqttDoor>) {
  if let Err(err) = subscribe(&client, &config, &doors).await {
    log::error!("Failed to announce MQTT client: {}", err);
  }
}

async fn subscribe(client: &AsyncClient, config: &MqttClientConfig, doors: &[MqttDoor]) -> Result<(), ClientError> {
  if let Some(topic) = &config.availability_topic {
    client
      .publish(topic, QoS::AtLeastOnce, true, config.online_availability.clone())
      .await?;
  }
  for door in doors {
    log::info!("Subscribing to {}", door.topics.command_topic);
    client
      .subscribe(door.topics.command_topic.clone(), QoS::AtLeastOnce)
      .await?;
  }
  Ok(())
}
