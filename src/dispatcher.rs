use std::{future::Future, time::Duration};

use reqwest::{Client, Method};
use thiserror::Error;

use crate::door::config::DoorConfig;

/// Commands sent to URLs with this prefix are never sent, they succeed after a short delay.
pub const SIMULATED_URL_PREFIX: &str = "http://test-donotcall";

const SIMULATED_LATENCY: Duration = Duration::from_millis(500);

/// A request that moves the door
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorCommand {
  pub url: String,
  pub method: Method,
  pub body: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
  #[error(transparent)]
  Http(#[from] reqwest::Error),
  #[error("{0}")]
  Other(String),
}

/// Sends door commands, resolving once the command was delivered or failed.
///
/// Implementations enforce their own timeout and report it as a failure.
pub trait Dispatcher: Send + Sync + 'static {
  fn dispatch(&self, command: &DoorCommand) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

/// Sends door commands over HTTP
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
  client: Client,
  credentials: Option<(String, String)>,
}

impl HttpDispatcher {
  pub fn with_config(config: &DoorConfig) -> Result<Self, DispatchError> {
    let client = Client::builder()
      .timeout(config.timeout)
      // door relays commonly use self signed certificates
      .danger_accept_invalid_certs(true)
      .build()?;

    Ok(HttpDispatcher {
      client,
      credentials: config.credentials.clone(),
    })
  }
}

impl Dispatcher for HttpDispatcher {
  async fn dispatch(&self, command: &DoorCommand) -> Result<(), DispatchError> {
    if command.url.starts_with(SIMULATED_URL_PREFIX) {
      log::info!("Simulating HTTP {} request to {}", command.method, command.url);
      tokio::time::sleep(SIMULATED_LATENCY).await;
      return Ok(());
    }

    log::debug!("HTTP request -> method: {}, url: {}", command.method, command.url);
    let mut request = self
      .client
      .request(command.method.clone(), &command.url)
      .body(command.body.clone());
    if let Some((username, password)) = &self.credentials {
      request = request.basic_auth(username, Some(password));
    }

    let response = request.send().await.map_err(|err| {
      log::debug!("HTTP request error: {}", err);
      err
    })?;
    // the relay answering at all means the command was delivered
    log::debug!("HTTP response from {}: {}", command.url, response.status());
    Ok(())
  }
}

#[cfg(test)]
pub(crate) mod fake {
  use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
  };

  use super::*;

  /// Records commands and answers them from a script, succeeding once the script runs out
  #[derive(Debug, Clone, Default)]
  pub struct FakeDispatcher {
    pub sent: Arc<Mutex<Vec<DoorCommand>>>,
    results: Arc<Mutex<VecDeque<Result<(), String>>>>,
    latency: Duration,
  }

  impl FakeDispatcher {
    pub fn new() -> Self {
      FakeDispatcher::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
      FakeDispatcher {
        latency,
        ..FakeDispatcher::default()
      }
    }

    pub fn fail_next(&self, message: &str) {
      self.results.lock().unwrap().push_back(Err(message.to_owned()));
    }

    pub fn sent_urls(&self) -> Vec<String> {
      self.sent.lock().unwrap().iter().map(|command| command.url.clone()).collect()
    }
  }

  impl Dispatcher for FakeDispatcher {
    async fn dispatch(&self, command: &DoorCommand) -> Result<(), DispatchError> {
      self.sent.lock().unwrap().push(command.clone());
      let result = self.results.lock().unwrap().pop_front().unwrap_or(Ok(()));
      if !self.latency.is_zero() {
        tokio::time::sleep(self.latency).await;
      }
      result.map_err(DispatchError::Other)
    }
  }
}
