use rumqttc::{AsyncClient, QoS};

use super::MqttDoor;
use crate::door::DoorSnapshot;

/// Publish the door's state (retained) every time it changes, until the door's controller stops.
pub async fn publish_state(client: AsyncClient, door: MqttDoor) {
  let mut state = door.handle.subscribe();

  loop {
    let snapshot = *state.borrow_and_update();
    if let Err(err) = publish_snapshot(&client, &door, snapshot).await {
      log::error!("{} failed to publish state: {}", door.handle, err);
      return;
    }

    if state.changed().await.is_err() {
      log::debug!("{} stopped, no longer publishing state", door.handle);
      return;
    }
  }
}

async fn publish_snapshot(
  client: &AsyncClient,
  door: &MqttDoor,
  snapshot: DoorSnapshot,
) -> Result<(), rumqttc::ClientError> {
  log::debug!("{} publishing state: {}, target: {}", door.handle, snapshot.current, snapshot.target);
  client
    .publish(&door.topics.state_topic, QoS::AtLeastOnce, true, snapshot.current.to_string())
    .await?;

  if let Some(topic) = &door.topics.target_topic {
    client
      .publish(topic, QoS::AtLeastOnce, true, snapshot.target.to_string())
      .await?;
  }
  Ok(())
}
