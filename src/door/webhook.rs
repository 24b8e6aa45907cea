use std::collections::HashMap;

use thiserror::Error;

use super::{
  scheduler::{Travel, TravelOrigin},
  state::Sensor,
  Door,
};

const BACKGROUND_KEY: &str = "background";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
  #[error("received both \"open\" and \"closed\", ignoring update")]
  ConflictingSensors,
  #[error("received neither \"open\" nor \"closed\"")]
  NoSensor,
  #[error("received \"{sensor}\" = {value:?}, expected \"true\" or \"false\"")]
  InvalidValue { sensor: Sensor, value: String },
  #[error("received \"{0}\" but the {0} sensor is not enabled")]
  SensorNotConfigured(Sensor),
}

/// What a webhook did to the door
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
  /// The door's state was updated
  Applied,
  /// The report agreed with what the door was already doing
  Unchanged,
  /// A background report arrived while the door was busy
  Discarded,
}

/// A single sensor reading decoded from webhook query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReport {
  pub sensor: Sensor,
  /// `true` if the sensor sees the door in its settled position
  pub triggered: bool,
  /// A periodic confirmation rather than a live event
  pub background: bool,
}

impl SensorReport {
  pub fn from_params(params: &HashMap<String, String>) -> Result<SensorReport, WebhookError> {
    let (sensor, value) = match (params.get(Sensor::Open.key()), params.get(Sensor::Closed.key())) {
      (Some(_), Some(_)) => return Err(WebhookError::ConflictingSensors),
      (Some(value), None) => (Sensor::Open, value),
      (None, Some(value)) => (Sensor::Closed, value),
      (None, None) => return Err(WebhookError::NoSensor),
    };

    let triggered = match value.as_str() {
      "true" => true,
      "false" => false,
      _ => {
        return Err(WebhookError::InvalidValue {
          sensor,
          value: value.clone(),
        })
      }
    };

    Ok(SensorReport {
      sensor,
      triggered,
      background: params.get(BACKGROUND_KEY).is_some_and(|value| value == "true"),
    })
  }
}

/// Reconciling sensor reports with the door's state
impl Door {
  /// Apply the query parameters of a sensor webhook.
  ///
  /// Invalid reports leave the door untouched.
  pub fn on_webhook(&mut self, params: &HashMap<String, String>) -> Result<WebhookOutcome, WebhookError> {
    log::debug!(
      "{} webhook received, current state: {}, target state: {}, query: {:?}",
      self,
      self.current,
      self.target,
      params
    );

    let report = SensorReport::from_params(params)?;
    if !self.config.has_sensor(report.sensor) {
      return Err(WebhookError::SensorNotConfigured(report.sensor));
    }

    if report.background {
      Ok(self.apply_background_report(report))
    }
    else {
      Ok(self.apply_report(report))
    }
  }

  /// Background reports only correct the state of an idle door, and only ever to a final state.
  fn apply_background_report(&mut self, report: SensorReport) -> WebhookOutcome {
    if !self.is_idle() {
      log::debug!("{} ignoring background update because there is an outstanding operation", self);
      return WebhookOutcome::Discarded;
    }

    let complement = report.sensor.complement();
    let state = if report.triggered {
      report.sensor.settled_state()
    }
    else if !self.config.has_sensor(complement) {
      // with no other sensor to wait for, not being in one position means being in the other
      complement.settled_state()
    }
    else {
      return WebhookOutcome::Unchanged;
    };

    log::debug!("{} updating state to {} from background update", self, state);
    self.set_final_state(state);
    WebhookOutcome::Applied
  }

  fn apply_report(&mut self, report: SensorReport) -> WebhookOutcome {
    if report.triggered {
      // whether commanded or manual, the door has arrived
      log::debug!("{} {} sensor triggered, door is now {}", self, report.sensor, report.sensor.settled_state());
      self.scheduler.cancel();
      self.set_final_state(report.sensor.settled_state());
      return WebhookOutcome::Applied;
    }

    // the door is leaving the position this sensor watches
    let departure = report.sensor.departure();
    if self.current == departure.travel_state() {
      log::debug!("{} is already {}, ignoring {} sensor = false", self, self.current, report.sensor);
      return WebhookOutcome::Unchanged;
    }

    log::info!("{} was moved manually, now {}", self, departure.travel_state());
    self.target = departure.into();
    self.set_current_state(departure.travel_state());
    self.await_travel(Travel::new(departure, TravelOrigin::Manual));
    WebhookOutcome::Applied
  }
}
