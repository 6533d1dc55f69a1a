pub mod actions;
pub mod client;
pub mod client_registry;
pub mod config;
pub mod duration;
pub mod event_log;
pub mod framing;
pub mod headless;
pub mod machine_id;
pub mod player;
pub mod player_events;
pub mod player_state;
pub mod protocol;
pub mod readiness;
pub mod server;
pub mod transport;

mod service;

pub use client::{reply_result, ActionCall, ClientError, ServerPush, SpMsClient};
pub use config::{ClientConfig, ServerConfig};
pub use headless::HeadlessPlayer;
pub use player::{Player, PlayerError, PlayerInterface};
pub use server::{PlayerContext, SpMs};
pub use service::{spawn_server, spawn_service, ServiceHandle, StopHandle};
