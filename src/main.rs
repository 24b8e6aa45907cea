#![warn(rust_2018_idioms)]

use std::{env, process, sync::Arc, time::Duration};

use garage_door_controller::{
  config::{Config, DEFAULT_CONFIG_PATH},
  dispatcher::HttpDispatcher,
  door::{
    persistence::{FileStateStore, StateStore},
    Door, DoorController,
  },
  error::GarageResult,
  mqtt_client::{MqttClient, MqttClientConfig, MqttDoor},
  webhook_server,
};
use simple_logger::SimpleLogger;
use tokio::{select, signal, sync::watch, task::JoinSet, time::sleep};

/// How long to wait for the broker to come back online
const MQTT_RESTART_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
  let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
  let config = Config::from_file(&path);

  let level = match &config {
    Ok(config) if config.debug => log::LevelFilter::Debug,
    _ => log::LevelFilter::Info,
  };
  if let Err(err) = SimpleLogger::new()
    .with_level(level)
    .env()
    .with_module_level("rumqttc", log::LevelFilter::Warn)
    .init()
  {
    eprintln!("Unable to initialise logging: {}", err);
  }

  let config = match config {
    Ok(config) => config,
    Err(err) => {
      log::error!("Unable to load {}: {}", path, err);
      process::exit(1);
    }
  };

  if let Err(err) = run(config).await {
    log::error!("Error occurred, stopping: {}", err);
    process::exit(1);
  }
}

/// Start every door with its webhook server and the MQTT bridge.
/// Runs until interrupted unless an error occurs
async fn run(config: Config) -> GarageResult<()> {
  let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(&config.state_dir));
  let (shutdown_tx, shutdown_rx) = watch::channel(false);

  let mut tasks = JoinSet::<GarageResult<()>>::new();
  let mut handles = Vec::new();
  let mut mqtt_doors = Vec::new();

  for (identifier, door_config) in config.doors {
    let dispatcher = HttpDispatcher::with_config(&door_config)?;
    let webhook_port = door_config.webhook_port;
    let topics = door_config.mqtt.clone();

    let door = Door::with_config(identifier, door_config, Arc::clone(&store));
    let (controller, handle) = DoorController::new(door, dispatcher);
    tasks.spawn(async move {
      controller.run().await;
      Ok(())
    });

    if let Some(port) = webhook_port {
      let mut shutdown = shutdown_rx.clone();
      tasks.spawn(webhook_server::serve(handle.clone(), port, async move {
        let _ = shutdown.wait_for(|stopping| *stopping).await;
      }));
    }

    if let Some(topics) = topics {
      mqtt_doors.push(MqttDoor {
        handle: handle.clone(),
        topics,
      });
    }
    handles.push(handle);
  }

  if handles.is_empty() {
    log::warn!("No doors are configured");
  }

  let mqtt_client = config.mqtt_client;
  let mqtt = async move {
    match mqtt_client {
      Some(mqtt_config) => run_mqtt(mqtt_config, mqtt_doors).await,
      None => std::future::pending().await,
    }
  };

  select! {
    result = signal::ctrl_c() => {
      result?;
      log::info!("Interrupted, shutting down");
    }
    // doors and webhook servers only stop early on error
    Some(finished) = tasks.join_next() => finished??,
    _ = mqtt => {}
  }

  let _ = shutdown_tx.send(true);
  // controllers stop once every handle to them is gone
  drop(handles);
  while let Some(finished) = tasks.join_next().await {
    finished??;
  }
  Ok(())
}

/// Bridge doors to MQTT, reconnecting whenever the connection fails
async fn run_mqtt(config: MqttClientConfig, doors: Vec<MqttDoor>) {
  loop {
    let err = MqttClient::with_config(config.clone()).run(doors.clone()).await;
    log::error!("MQTT error occurred, restarting in 5 seconds: {}", err);
    sleep(MQTT_RESTART_DELAY).await;
  }
}
