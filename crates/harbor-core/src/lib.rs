//! # harbor-core
//!
//! Session-oriented WebSocket multiplexing for durable actor identities.
//!
//! This crate provides the building blocks a stateful, single-threaded
//! actor uses to serve many WebSocket connections:
//!
//! - **ChannelWrapper** - guarded sends and the typed attachment slot
//! - **Session / SessionContext** - per-connection hooks and state
//! - **Roster** - the shared broadcast view of live connections
//! - **Dispatcher** - the registry, upgrade path, frame routing, and
//!   close/error cleanup
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  events   ┌────────────┐  hooks   ┌─────────────┐
//! │ Channel  │──────────▶│ Dispatcher │─────────▶│  Session    │
//! └──────────┘           └────────────┘          └─────────────┘
//!                               │                       │
//!                               ▼                       ▼
//!                        ┌────────────┐          ┌─────────────┐
//!                        │  Registry  │          │   Roster    │
//!                        └────────────┘          └─────────────┘
//! ```
//!
//! The dispatcher never locks: it relies on the host to call it from a
//! single task per actor identity, which is exactly the serialization
//! guarantee a durable actor platform provides.

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod wrapper;

pub use context::ConnectContext;
pub use dispatcher::{AcceptedUpgrade, Dispatcher, SessionFactory};
pub use error::SessionError;
pub use session::{Roster, Session, SessionContext};
pub use wrapper::ChannelWrapper;
