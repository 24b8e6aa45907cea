use std::{fmt, str::FromStr};

use serde::Deserialize;

/// The state the door is trying to get to
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
  #[serde(rename = "OPEN")]
  Open,
  #[serde(rename = "CLOSED")]
  Closed,
}

impl TargetState {
  /// The transitional state the door is in while travelling towards this target
  pub fn travel_state(self) -> DoorState {
    match self {
      TargetState::Open => DoorState::Opening,
      TargetState::Closed => DoorState::Closing,
    }
  }
}

impl FromStr for TargetState {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "OPEN" => Ok(TargetState::Open),
      "CLOSED" => Ok(TargetState::Closed),
      _ => Err(()),
    }
  }
}

impl fmt::Display for TargetState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TargetState::Open => write!(f, "OPEN"),
      TargetState::Closed => write!(f, "CLOSED"),
    }
  }
}

/// The state of the door as exposed to the outside world.
///
/// The discriminants are part of the persisted record and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DoorState {
  Open = 0,
  Closed = 1,
  Opening = 2,
  Closing = 3,
  Stopped = 4,
}

impl DoorState {
  /// True if no movement is assumed to be in progress
  pub fn is_stable(self) -> bool {
    matches!(self, DoorState::Open | DoorState::Closed | DoorState::Stopped)
  }

  /// Where the door comes to rest if left alone: the end of its travel, or where it already is
  pub fn settled(self) -> DoorState {
    match self {
      DoorState::Opening => DoorState::Open,
      DoorState::Closing => DoorState::Closed,
      state => state,
    }
  }
}

impl From<TargetState> for DoorState {
  fn from(target_state: TargetState) -> Self {
    match target_state {
      TargetState::Open => DoorState::Open,
      TargetState::Closed => DoorState::Closed,
    }
  }
}

impl From<DoorState> for u8 {
  fn from(state: DoorState) -> Self {
    state as u8
  }
}

impl TryFrom<u8> for DoorState {
  type Error = u8;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(DoorState::Open),
      1 => Ok(DoorState::Closed),
      2 => Ok(DoorState::Opening),
      3 => Ok(DoorState::Closing),
      4 => Ok(DoorState::Stopped),
      other => Err(other),
    }
  }
}

impl PartialEq<TargetState> for DoorState {
  fn eq(&self, other: &TargetState) -> bool {
    *self == DoorState::from(*other)
  }
}

impl fmt::Display for DoorState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DoorState::Open => write!(f, "open"),
      DoorState::Closed => write!(f, "closed"),
      DoorState::Opening => write!(f, "opening"),
      DoorState::Closing => write!(f, "closing"),
      DoorState::Stopped => write!(f, "stopped"),
    }
  }
}

/// One of the two contact sensors a door may have wired to the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
  /// Reports `true` when the door is fully open
  Open,
  /// Reports `true` when the door is fully closed
  Closed,
}

impl Sensor {
  /// The final state the door is in while this sensor reports `true`
  pub fn settled_state(self) -> DoorState {
    match self {
      Sensor::Open => DoorState::Open,
      Sensor::Closed => DoorState::Closed,
    }
  }

  /// The direction the door is moving once this sensor stops reporting `true`
  pub fn departure(self) -> TargetState {
    match self {
      Sensor::Open => TargetState::Closed,
      Sensor::Closed => TargetState::Open,
    }
  }

  pub fn complement(self) -> Sensor {
    match self {
      Sensor::Open => Sensor::Closed,
      Sensor::Closed => Sensor::Open,
    }
  }

  /// The webhook query key this sensor reports under
  pub fn key(self) -> &'static str {
    match self {
      Sensor::Open => "open",
      Sensor::Closed => "closed",
    }
  }
}

impl fmt::Display for Sensor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}
