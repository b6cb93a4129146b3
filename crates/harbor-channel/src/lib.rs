//! # harbor-channel
//!
//! The host channel abstraction the Harbor session layer consumes.
//!
//! A channel is a bidirectional, message-oriented connection endpoint with
//! WebSocket-like ready states and a persistent per-endpoint attachment
//! slot. Harbor does not implement network transport here; a [`ChannelPair`]
//! is an in-process pair of linked endpoints, the same primitive a hosting
//! runtime hands out when it accepts a real socket upgrade (the server half
//! goes to the dispatcher, the client half to whatever drives the wire).
//!
//! ## Example
//!
//! ```rust
//! use tenvis_harbor_channel::{ChannelPair, ReadyState};
//!
//! let (client, server) = ChannelPair::create();
//! assert_eq!(client.ready_state(), ReadyState::Connecting);
//!
//! server.accept();
//! assert_eq!(server.ready_state(), ReadyState::Open);
//! server.send_text("{\"type\":\"welcome\"}".to_string()).unwrap();
//! ```

pub mod event;
pub mod id;
pub mod pair;
pub mod state;

pub use event::ChannelEvent;
pub use id::ChannelId;
pub use pair::{Channel, ChannelError, ChannelPair, Side};
pub use state::ReadyState;
