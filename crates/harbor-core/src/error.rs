//! Session-layer errors.

use thiserror::Error;

/// Errors produced by the session layer and application hooks.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `resume` found no attachment for a tracked connection. A tracked
    /// connection always persists data at accept time, so this is a fatal
    /// setup error.
    #[error("no data to resume")]
    NoResumeData,

    /// Wire or attachment codec failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] harbor_protocol::ProtocolError),

    /// Raw channel failure surfaced through an unguarded path.
    #[error("channel error: {0}")]
    Channel(#[from] tenvis_harbor_channel::ChannelError),

    /// Session construction failed before the session was registered.
    #[error("session setup failed: {0}")]
    Setup(String),

    /// Application hook failure.
    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// Convenience constructor for application hook failures.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        SessionError::Other(message.into())
    }

    /// Convenience constructor for setup failures.
    #[must_use]
    pub fn setup(message: impl Into<String>) -> Self {
        SessionError::Setup(message.into())
    }
}
