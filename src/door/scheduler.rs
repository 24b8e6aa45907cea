use std::{future, pin::Pin, time::Duration};

use tokio::time::{self, Sleep};

use super::state::TargetState;

/// What caused a door to start travelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelOrigin {
  /// A door command was sent
  Commanded,
  /// A sensor saw the door move without a command being sent
  Manual,
  /// An auto closing door started closing by itself
  AutoClose,
}

/// Represents a door travel towards `target_state` which is yet to complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Travel {
  pub target_state: TargetState,
  pub origin: TravelOrigin,
}

impl Travel {
  pub fn new(target_state: TargetState, origin: TravelOrigin) -> Self {
    Travel { target_state, origin }
  }
}

/// An action the door runs once its delay has elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  /// No sensor can confirm the travel, assume it completed
  AssumeComplete(Travel),
  /// The confirming sensor should have reported by now, assume the door stopped
  ExpectConfirmation(Travel),
  /// Start closing an auto closing door
  AutoClose,
}

#[derive(Debug)]
struct DelayedAction {
  action: Action,
  expiry: Pin<Box<Sleep>>,
}

/// Holds at most one delayed action; scheduling another replaces it.
#[derive(Debug, Default)]
pub struct Scheduler {
  pending: Option<DelayedAction>,
}

impl Scheduler {
  pub fn new() -> Self {
    Scheduler::default()
  }

  /// Arm `action` to run after `delay`, returning the action it cancelled (if any)
  pub fn schedule(&mut self, delay: Duration, action: Action) -> Option<Action> {
    log::trace!("Scheduling {:?} in {:?}", action, delay);
    self
      .pending
      .replace(DelayedAction {
        action,
        expiry: Box::pin(time::sleep(delay)),
      })
      .map(|cancelled| cancelled.action)
  }

  /// Prevent the pending action from running. Safe to call when nothing is pending.
  pub fn cancel(&mut self) -> Option<Action> {
    self.pending.take().map(|cancelled| cancelled.action)
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  pub fn pending(&self) -> Option<Action> {
    self.pending.as_ref().map(|delayed| delayed.action)
  }

  /// Resolves with the pending action once it is due, leaving the slot empty.
  ///
  /// Never resolves while nothing is pending. Cancel safe: dropping the future leaves the action armed.
  pub async fn expired(&mut self) -> Action {
    let Some(delayed) = self.pending.as_mut()
    else {
      return future::pending().await;
    };

    delayed.expiry.as_mut().await;
    let action = delayed.action;
    // the slot is cleared before the action runs so it can schedule a follow-up
    self.pending = None;
    action
  }
}
