use std::{fmt, sync::Arc};

pub use config::{ConfigError, DoorConfig, DoorSettings};
pub use controller::{DoorController, DoorHandle, DoorSnapshot};
pub use identifier::Identifier;
pub use webhook::{SensorReport, WebhookError, WebhookOutcome};

use self::{
  persistence::StateStore,
  scheduler::{Action, Scheduler, Travel, TravelOrigin},
  state::{DoorState, TargetState},
};
use crate::{
  dispatcher::{DispatchError, DoorCommand},
  error::{GarageError, GarageResult},
};

pub mod config;
pub mod controller;
pub mod identifier;
pub mod persistence;
pub mod scheduler;
pub mod state;
mod webhook;


/// How much longer than its travel time a sensored door may take before it is assumed stopped
const SENSOR_GRACE_FACTOR: f64 = 1.5;

/// A door command that has been issued but not yet completed
#[derive(Debug, Clone, Copy)]
struct InFlight {
  target_state: TargetState,
  /// The state the door is left in if the command fails
  revert_to: DoorState,
}

/// The state machine of a single door.
///
/// Owns the door's current and target state and its single delayed action. Door commands are not sent
/// from here: [`Door::set_target`] hands back the command to send and [`Door::command_finished`] must be
/// called with its result.
#[derive(Debug)]
pub struct Door {
  identifier: Identifier,
  config: DoorConfig,
  current: DoorState,
  target: DoorState,
  in_flight: Option<InFlight>,
  scheduler: Scheduler,
  store: Arc<dyn StateStore>,
}

impl fmt::Display for Door {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Door ({})", self.identifier)
  }
}

impl Door {
  /// Create a door, restoring its last saved state from `store`.
  pub fn with_config(identifier: Identifier, config: DoorConfig, store: Arc<dyn StateStore>) -> Door {
    let initial_state = persistence::recover(store.as_ref(), &identifier.slug(), config.auto_close);

    Door {
      identifier,
      config,
      // the target matches the current state at boot
      target: initial_state,
      current: initial_state,
      in_flight: None,
      scheduler: Scheduler::new(),
      store,
    }
  }

  pub fn identifier(&self) -> &Identifier {
    &self.identifier
  }

  pub fn current(&self) -> DoorState {
    self.current
  }

  pub fn target(&self) -> DoorState {
    self.target
  }

  pub fn snapshot(&self) -> DoorSnapshot {
    DoorSnapshot {
      current: self.current,
      target: self.target,
    }
  }

  pub fn pending_action(&self) -> Option<Action> {
    self.scheduler.pending()
  }

  pub fn command_in_flight(&self) -> bool {
    self.in_flight.is_some()
  }

  /// True when nothing is travelling: no delayed action and no command in flight
  pub fn is_idle(&self) -> bool {
    !self.scheduler.is_pending() && self.in_flight.is_none()
  }

  /// Resolves with the delayed action once it is due. Pass it to [`Door::run_action`].
  pub async fn next_action(&mut self) -> Action {
    self.scheduler.expired().await
  }

  /// Request the door to move to `target_state`.
  ///
  /// Returns the command that must be sent, or `None` if nothing needs to be sent.
  pub fn set_target(&mut self, target_state: TargetState) -> GarageResult<Option<DoorCommand>> {
    log::info!("{} setting target state to {}", self, target_state);

    if self.current == target_state {
      log::info!("{} is already {}, no action needed", self, self.current);
      return Ok(None);
    }

    match target_state {
      TargetState::Closed if self.config.auto_close => {
        log::info!("{} closes automatically, ignoring close request", self);
        return Ok(None);
      }
      _ if self.current == target_state.travel_state() => {
        log::info!("{} is already {}, no action needed", self, self.current);
        return Ok(None);
      }
      _ => {}
    }

    if self.in_flight.is_some() {
      log::warn!("{} cannot move to {} while another command is in flight", self, target_state);
      return Err(GarageError::CommandInFlight(self.identifier.clone()));
    }

    let Some(command) = self.config.command(target_state)
    else {
      log::warn!("{} has no command to move to {}", self, target_state);
      return Ok(None);
    };

    log::info!("{} starting to move to {}", self, target_state);
    self.scheduler.cancel();
    self.in_flight = Some(InFlight {
      target_state,
      // a failed reversal leaves the door finishing the travel it interrupted
      revert_to: self.current.settled(),
    });
    self.target = target_state.into();
    self.set_current_state(target_state.travel_state());

    Ok(Some(command))
  }

  /// Apply the result of the command returned by [`Door::set_target`].
  ///
  /// A failed command reverts the door to where it was before the command, or to the end of the travel it
  /// interrupted, and the error is returned.
  pub fn command_finished(&mut self, result: Result<(), DispatchError>) -> GarageResult<()> {
    let Some(in_flight) = self.in_flight.take()
    else {
      log::warn!("{} received a command result with no command in flight", self);
      return Ok(());
    };
    // a sensor may have settled the door while the command was in flight, its report wins
    let superseded = self.current != in_flight.target_state.travel_state();

    match result {
      Err(source) => {
        log::warn!("{} error sending {} command: {}", self, in_flight.target_state, source);
        if !superseded {
          self.set_final_state(in_flight.revert_to);
        }
        Err(GarageError::Command {
          identifier: self.identifier.clone(),
          source,
        })
      }
      Ok(()) if superseded => {
        log::debug!("{} is already {}, ignoring {} command result", self, self.current, in_flight.target_state);
        Ok(())
      }
      Ok(()) => {
        self.await_travel(Travel::new(in_flight.target_state, TravelOrigin::Commanded));
        Ok(())
      }
    }
  }

  /// Run a delayed action returned by [`Door::next_action`]
  pub fn run_action(&mut self, action: Action) {
    match action {
      Action::AssumeComplete(travel) => {
        self.set_final_state(travel.target_state.into());
        match travel.origin {
          TravelOrigin::Commanded => log::info!("{} is now {} (simulated)", self, self.current),
          TravelOrigin::Manual => log::info!("{} is now {} after a manual move (simulated)", self, self.current),
          TravelOrigin::AutoClose => log::info!("{} is now {} (auto close simulated)", self, self.current),
        }

        if travel.target_state == TargetState::Open && self.config.auto_close {
          log::debug!("{} will close in {:?}", self, self.config.auto_close_delay);
          self.scheduler.schedule(self.config.auto_close_delay, Action::AutoClose);
        }
      }

      Action::ExpectConfirmation(travel) => {
        log::warn!(
          "{} did not report {} in time, assuming door is stopped",
          self,
          DoorState::from(travel.target_state)
        );
        self.set_current_state(DoorState::Stopped);
      }

      Action::AutoClose => {
        log::info!("{} starting the auto close", self);
        self.target = DoorState::Closed;
        self.set_current_state(DoorState::Closing);
        self.await_travel(Travel::new(TargetState::Closed, TravelOrigin::AutoClose));
      }
    }
  }

  /// Arm the action that concludes `travel`: a simulated completion if no sensor can confirm it, otherwise
  /// a guard that stops the door if the sensor stays quiet.
  fn await_travel(&mut self, travel: Travel) {
    let travel_time = self.config.travel_time(travel.target_state);
    match self.config.confirming_sensor(travel.target_state) {
      None => self.scheduler.schedule(travel_time, Action::AssumeComplete(travel)),
      Some(_) => self
        .scheduler
        .schedule(travel_time.mul_f64(SENSOR_GRACE_FACTOR), Action::ExpectConfirmation(travel)),
    };
  }

  fn set_current_state(&mut self, state: DoorState) {
    log::debug!("{} setting new state: {}", self, state);
    self.current = state;
    if state.is_stable() {
      self.persist(state);
    }
  }

  /// Force both the current and target state, e.g. after a failed command or a sensor report
  fn set_final_state(&mut self, state: DoorState) {
    self.target = state;
    self.set_current_state(state);
  }

  fn persist(&self, state: DoorState) {
    if self.config.auto_close {
      // auto closing doors always start closed
      return;
    }
    if let Err(err) = self.store.save(&self.identifier.slug(), state) {
      log::warn!("{} failed to save state: {}", self, err);
    }
  }
}
