pub mod config;
pub mod dispatcher;
pub mod door;
pub mod error;
pub mod mqtt_client;
pub mod webhook_server;
