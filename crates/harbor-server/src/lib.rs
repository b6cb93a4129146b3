//! # harbor-server
//!
//! The HTTP surface adapter and actor host for Harbor.
//!
//! This crate supplies what a durable-actor platform would otherwise
//! provide around the session core:
//!
//! - **actor** - one task per actor identity with a single ordered inbox,
//!   tracked connections, and restart-with-rehydration
//! - **routes** - the `/websocket` upgrade endpoint plus composition with
//!   the embedding application's router
//! - **bridge** - pumps a real WebSocket onto the client half of a channel
//!   pair
//! - **config** / **metrics** - TOML + env configuration and Prometheus
//!   metrics
//!
//! The `harbor` binary wires these together into a small room-chat demo.

pub mod actor;
pub mod bridge;
pub mod config;
pub mod metrics;
pub mod routes;

pub use actor::{spawn_actor, ActorError, ActorHandle, ActorNamespace};
pub use config::Config;
pub use routes::{base_router, base_router_with_limits, run_server};
