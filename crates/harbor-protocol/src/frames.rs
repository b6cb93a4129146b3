//! Frame types carried over a Harbor channel.
//!
//! A frame is one unit of application traffic: a UTF-8 text frame carrying a
//! JSON message, or a binary frame carrying raw bytes. Close and error
//! signals are not frames; they travel as channel events.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single inbound or outbound application frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// UTF-8 text, expected to hold one JSON-encoded tagged message.
    Text(String),
    /// Raw bytes, interpreted by the application's buffer handler.
    Binary(Bytes),
}

impl Frame {
    /// Create a text frame.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    /// Create a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Frame::Binary(data.into())
    }

    /// Whether this is a text frame.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Frame::Text(_))
    }

    /// Whether this is a binary frame.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-band notice delivered on the client half of a pair when session setup
/// fails after the protocol switch has already been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// Human-readable description of the failure.
    pub error: String,
}

impl ErrorNotice {
    /// Create a notice with the given description.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// The canonical setup-failure notice.
    #[must_use]
    pub fn setup_failure() -> Self {
        Self::new(crate::close::SETUP_FAILURE_REASON)
    }
}
