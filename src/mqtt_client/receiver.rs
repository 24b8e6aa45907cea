use std::str::{self, FromStr};

use super::MqttDoor;
use crate::door::state::TargetState;

/// Hand a message received on a door's command topic to that door.
///
/// The command runs in its own task so the event loop keeps being polled while the door moves.
pub fn route_command(doors: &[MqttDoor], topic: &str, payload: &[u8]) {
  let Some(door) = doors.iter().find(|door| door.topics.command_topic == topic)
  else {
    log::debug!("Ignoring message on unknown topic {}", topic);
    return;
  };

  let target_state = match str::from_utf8(payload)
    .map_err(|_| ())
    .and_then(|payload| TargetState::from_str(payload.trim()))
  {
    Ok(target_state) => target_state,
    Err(()) => {
      log::warn!("{} ignoring unknown command: {}", door.handle, String::from_utf8_lossy(payload));
      return;
    }
  };

  log::info!("{} was commanded to move to state: {}", door.handle, target_state);
  let handle = door.handle.clone();
  tokio::spawn(async move {
    if let Err(err) = handle.set_target(target_state).await {
      log::error!("{} failed to move to {}: {}", handle, target_state, err);
    }
  });
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, time::Duration};

  use tokio::time::sleep;

  use super::*;
  use crate::{
    dispatcher::fake::FakeDispatcher,
    door::{
      persistence::memory::MemoryStateStore, state::DoorState, Door, DoorConfig, DoorController, DoorSettings,
      Identifier,
    },
    mqtt_client::DoorTopics,
  };

  fn door(name: &str) -> (MqttDoor, FakeDispatcher) {
    let settings = DoorSettings {
      close_url: Some(format!("http://relay/{}/close", name)),
      has_closed_sensor: true,
      ..DoorSettings::new(format!("http://relay/{}/open", name))
    };
    let door = Door::with_config(
      Identifier::from(name),
      DoorConfig::try_from(settings).unwrap(),
      Arc::new(MemoryStateStore::default()),
    );
    let dispatcher = FakeDispatcher::new();
    let (controller, handle) = DoorController::new(door, dispatcher.clone());
    controller.spawn();

    let topics = DoorTopics {
      command_topic: format!("garage/{}/set", name),
      state_topic: format!("garage/{}/state", name),
      target_topic: None,
    };
    (MqttDoor { handle, topics }, dispatcher)
  }

  #[tokio::test(start_paused = true)]
  async fn commands_reach_the_matching_door() {
    let (main, main_dispatcher) = door("main");
    let (side, side_dispatcher) = door("side");
    let doors = vec![main.clone(), side.clone()];

    route_command(&doors, "garage/side/set", b"OPEN");
    sleep(Duration::from_millis(1)).await;

    assert_eq!(side.handle.current(), DoorState::Opening);
    assert_eq!(side_dispatcher.sent_urls(), vec!["http://relay/side/open"]);
    assert_eq!(main.handle.current(), DoorState::Closed);
    assert!(main_dispatcher.sent_urls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn unknown_commands_are_ignored() {
    let (main, dispatcher) = door("main");
    let doors = vec![main.clone()];

    route_command(&doors, "garage/main/set", b"AJAR");
    route_command(&doors, "garage/main/set", &[0xff, 0xfe]);
    route_command(&doors, "garage/other/set", b"OPEN");
    sleep(Duration::from_millis(1)).await;

    assert_eq!(main.handle.current(), DoorState::Closed);
    assert!(dispatcher.sent_urls().is_empty());
  }
}
