use std::{collections::HashMap, future::Future, net::SocketAddr};

use axum::{
  extract::{Query, State},
  http::StatusCode,
  routing::any,
  Router,
};
use tokio::net::TcpListener;

use crate::{
  door::DoorHandle,
  error::{GarageError, GarageResult},
};

/// The only path sensor webhooks are accepted on
pub const WEBHOOK_PATH: &str = "/garage/update";

/// Routes sensor webhooks to a single door, whatever the request method.
/// Anything but [`WEBHOOK_PATH`] is answered with 404.
pub fn router(door: DoorHandle) -> Router {
  Router::new().route(WEBHOOK_PATH, any(handle_update)).with_state(door)
}

async fn handle_update(State(door): State<DoorHandle>, Query(params): Query<HashMap<String, String>>) -> StatusCode {
  log::debug!("{} webhook request: {:?}", door, params);

  match door.on_webhook(params).await {
    Ok(outcome) => {
      log::debug!("{} webhook outcome: {:?}", door, outcome);
      StatusCode::OK
    }
    // rejected reports are logged by the controller and still acknowledged
    Err(GarageError::Webhook(_)) => StatusCode::OK,
    Err(err) => {
      log::error!("{} webhook handler error: {}", door, err);
      StatusCode::INTERNAL_SERVER_ERROR
    }
  }
}

/// Serve sensor webhooks for `door` on `port` until `shutdown` resolves.
pub async fn serve(
  door: DoorHandle,
  port: u16,
  shutdown: impl Future<Output = ()> + Send + 'static,
) -> GarageResult<()> {
  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  let listener = TcpListener::bind(addr).await?;
  log::info!("{} webhook server listening on port {}", door, port);

  let identifier = door.identifier().clone();
  axum::serve(listener, router(door))
    .with_graceful_shutdown(shutdown)
    .await?;

  log::info!("Webhook server for {} on port {} stopped", identifier, port);
  Ok(())
}
