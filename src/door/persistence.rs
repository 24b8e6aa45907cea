use std::{
  fmt, fs,
  io::ErrorKind,
  path::PathBuf,
};

use serde::{Deserialize, Serialize};

use super::state::DoorState;
use crate::error::GarageResult;

/// Durable storage for each door's last known state, keyed by the door's slug.
pub trait StateStore: fmt::Debug + Send + Sync {
  /// The last saved state, `None` if nothing (or nothing readable) was saved.
  fn load(&self, key: &str) -> GarageResult<Option<DoorState>>;

  fn save(&self, key: &str, state: DoorState) -> GarageResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
  current: u8,
}

/// Stores each door as a small JSON file in a directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
  dir: PathBuf,
}

impl FileStateStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    FileStateStore { dir: dir.into() }
  }

  pub fn path(&self, key: &str) -> PathBuf {
    self.dir.join(format!("garage-door-state-{key}.json"))
  }
}

impl StateStore for FileStateStore {
  fn load(&self, key: &str) -> GarageResult<Option<DoorState>> {
    let path = self.path(key);
    let raw = match fs::read_to_string(&path) {
      Ok(raw) => raw,
      Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
      Err(err) => return Err(err.into()),
    };

    match serde_json::from_str::<PersistedState>(&raw) {
      Ok(persisted) => Ok(DoorState::try_from(persisted.current).ok()),
      Err(err) => {
        log::debug!("Ignoring malformed state record {}: {}", path.display(), err);
        Ok(None)
      }
    }
  }

  fn save(&self, key: &str, state: DoorState) -> GarageResult<()> {
    let record = serde_json::to_string(&PersistedState { current: state.into() })?;
    // written inline on the door's task, records are a few bytes and only change on stable transitions
    fs::write(self.path(key), record)?;
    Ok(())
  }
}

/// Work out the state a door starts in after a restart.
///
/// Auto closing doors never persist and always start closed. A door that was travelling when it was
/// last saved has an unknown outcome, so it is treated as stopped.
pub fn recover(store: &dyn StateStore, key: &str, auto_close: bool) -> DoorState {
  if auto_close {
    return DoorState::Closed;
  }

  let persisted = store.load(key).unwrap_or_else(|err| {
    log::warn!("Failed to load saved state for {}: {}", key, err);
    None
  });

  match persisted {
    Some(DoorState::Opening | DoorState::Closing) => DoorState::Stopped,
    Some(state) => state,
    None => {
      log::debug!("No saved state found for {}, assuming closed", key);
      DoorState::Closed
    }
  }
}


#[cfg(test)]
mod tests {
  use super::{memory::MemoryStateStore, *};

  #[test]
  fn file_store_round_trips_the_record_format() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());

    store.save("main-garage", DoorState::Open).unwrap();
    let raw = fs::read_to_string(dir.path().join("garage-door-state-main-garage.json")).unwrap();
    assert_eq!(raw, r#"{"current":0}"#);
    assert_eq!(store.load("main-garage").unwrap(), Some(DoorState::Open));
  }

  #[test]
  fn missing_and_malformed_records_are_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path());
    assert_eq!(store.load("nothing").unwrap(), None);

    fs::write(store.path("garbled"), "not json").unwrap();
    assert_eq!(store.load("garbled").unwrap(), None);

    fs::write(store.path("out-of-range"), r#"{"current":9}"#).unwrap();
    assert_eq!(store.load("out-of-range").unwrap(), None);
  }

  #[test]
  fn travelling_states_recover_as_stopped() {
    for travelling in [DoorState::Opening, DoorState::Closing] {
      let store = MemoryStateStore::with_state("door", travelling);
      assert_eq!(recover(&store, "door", false), DoorState::Stopped);
    }
  }

  #[test]
  fn stable_states_recover_unchanged() {
    for stable in [DoorState::Open, DoorState::Closed, DoorState::Stopped] {
      let store = MemoryStateStore::with_state("door", stable);
      assert_eq!(recover(&store, "door", false), stable);
    }
  }

  #[test]
  fn auto_close_always_recovers_closed() {
    let store = MemoryStateStore::with_state("door", DoorState::Open);
    assert_eq!(recover(&store, "door", true), DoorState::Closed);
  }

  #[test]
  fn absent_or_unreadable_defaults_to_closed() {
    assert_eq!(recover(&MemoryStateStore::default(), "door", false), DoorState::Closed);
    assert_eq!(recover(&MemoryStateStore::failing(), "door", false), DoorState::Closed);
  }
}
