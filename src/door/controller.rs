use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use tokio::{
  select,
  sync::{mpsc, oneshot, watch},
  task::JoinHandle,
};

use super::{
  identifier::Identifier,
  state::{DoorState, TargetState},
  webhook::WebhookOutcome,
  Door,
};
use crate::{
  dispatcher::{DispatchError, Dispatcher, DoorCommand},
  error::{GarageError, GarageResult},
};

type CommandFuture = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send>>;

/// The externally visible state of a door
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorSnapshot {
  pub current: DoorState,
  pub target: DoorState,
}

#[derive(Debug)]
enum DoorRequest {
  SetTarget {
    target_state: TargetState,
    reply: oneshot::Sender<GarageResult<()>>,
  },
  Webhook {
    params: HashMap<String, String>,
    reply: oneshot::Sender<GarageResult<WebhookOutcome>>,
  },
}

struct PendingCommand {
  result: CommandFuture,
  reply: oneshot::Sender<GarageResult<()>>,
}

/// Runs a [`Door`], feeding it requests, command results and its delayed actions one at a time.
pub struct DoorController<D: Dispatcher> {
  door: Door,
  dispatcher: Arc<D>,
  requests: mpsc::UnboundedReceiver<DoorRequest>,
  state_tx: watch::Sender<DoorSnapshot>,
  command: Option<PendingCommand>,
}

impl<D: Dispatcher> fmt::Display for DoorController<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "DoorController ({})", self.door.identifier())
  }
}

impl<D: Dispatcher> DoorController<D> {
  pub fn new(door: Door, dispatcher: D) -> (DoorController<D>, DoorHandle) {
    let (requests_tx, requests) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(door.snapshot());

    let handle = DoorHandle {
      identifier: door.identifier().clone(),
      requests: requests_tx,
      state: state_rx,
    };
    let controller = DoorController {
      door,
      dispatcher: Arc::new(dispatcher),
      requests,
      state_tx,
      command: None,
    };

    (controller, handle)
  }

  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(self.run())
  }

  /// Runs until every [`DoorHandle`] has been dropped
  pub async fn run(mut self) {
    log::info!("{} listening with initial state: {}", &self, self.door.current());

    loop {
      select! {
        request = self.requests.recv() => match request {
          Some(request) => self.handle_request(request),
          None => {
            log::info!("{} stopping", &self);
            return;
          }
        },

        result = command_result(&mut self.command), if self.command.is_some() => {
          self.finish_command(result);
        }

        action = self.door.next_action() => {
          log::debug!("{} running delayed action: {:?}", &self, action);
          self.door.run_action(action);
          self.publish_state();
        }
      }
    }
  }

  fn handle_request(&mut self, request: DoorRequest) {
    match request {
      DoorRequest::SetTarget { target_state, reply } => match self.door.set_target(target_state) {
        Ok(Some(command)) => {
          self.publish_state();
          self.dispatch(command, reply);
        }
        outcome => {
          self.publish_state();
          // the requester may have stopped waiting
          let _ = reply.send(outcome.map(|_| ()));
        }
      },

      DoorRequest::Webhook { params, reply } => {
        let outcome = self.door.on_webhook(&params).map_err(|err| {
          log::warn!("{} ignoring webhook: {}", &self, err);
          GarageError::from(err)
        });
        self.publish_state();
        let _ = reply.send(outcome);
      }
    }
  }

  fn dispatch(&mut self, command: DoorCommand, reply: oneshot::Sender<GarageResult<()>>) {
    log::debug!("{} sending {} {}", &self, command.method, command.url);
    let dispatcher = Arc::clone(&self.dispatcher);
    self.command = Some(PendingCommand {
      result: Box::pin(async move { dispatcher.dispatch(&command).await }),
      reply,
    });
  }

  fn finish_command(&mut self, result: Result<(), DispatchError>) {
    let outcome = self.door.command_finished(result);
    self.publish_state();
    if let Some(command) = self.command.take() {
      let _ = command.reply.send(outcome);
    }
  }

  fn publish_state(&self) {
    let snapshot = self.door.snapshot();
    self.state_tx.send_if_modified(|published| {
      if *published == snapshot {
        false
      }
      else {
        *published = snapshot;
        true
      }
    });
  }
}

/// Resolves with the in-flight command's result, never resolving if there is none
async fn command_result(command: &mut Option<PendingCommand>) -> Result<(), DispatchError> {
  match command {
    Some(command) => command.result.as_mut().await,
    None => std::future::pending().await,
  }
}

/// A cheap, cloneable way to talk to a running [`DoorController`].
#[derive(Debug, Clone)]
pub struct DoorHandle {
  identifier: Identifier,
  requests: mpsc::UnboundedSender<DoorRequest>,
  state: watch::Receiver<DoorSnapshot>,
}

impl fmt::Display for DoorHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Door ({})", self.identifier)
  }
}

impl DoorHandle {
  pub fn identifier(&self) -> &Identifier {
    &self.identifier
  }

  pub fn current(&self) -> DoorState {
    self.state.borrow().current
  }

  pub fn target(&self) -> DoorState {
    self.state.borrow().target
  }

  /// Watch the door's state for changes
  pub fn subscribe(&self) -> watch::Receiver<DoorSnapshot> {
    self.state.clone()
  }

  /// Move the door towards `target_state`, resolving once the door command (if any) completed.
  pub async fn set_target(&self, target_state: TargetState) -> GarageResult<()> {
    self
      .request(|reply| DoorRequest::SetTarget { target_state, reply })
      .await
  }

  /// Hand the decoded query parameters of a sensor webhook to the door.
  ///
  /// Invalid reports are returned as [`GarageError::Webhook`].
  pub async fn on_webhook(&self, params: HashMap<String, String>) -> GarageResult<WebhookOutcome> {
    self.request(|reply| DoorRequest::Webhook { params, reply }).await
  }

  async fn request<T>(
    &self,
    request: impl FnOnce(oneshot::Sender<GarageResult<T>>) -> DoorRequest,
  ) -> GarageResult<T> {
    let (reply, response) = oneshot::channel();
    self
      .requests
      .send(request(reply))
      .map_err(|_| GarageError::ControllerClosed(self.identifier.clone()))?;
    response
      .await
      .map_err(|_| GarageError::ControllerClosed(self.identifier.clone()))?
  }
}
