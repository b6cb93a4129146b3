//! Channel endpoint ready states.

use std::fmt;

/// Lifecycle state of a channel endpoint.
///
/// Endpoints start `Connecting`, move to `Open` when accepted, to `Closing`
/// when either side initiates a close, and to `Closed` once the close has
/// been observed by the peer (or the endpoint failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Created but not yet accepted.
    Connecting = 0,
    /// Accepted; frames can be written.
    Open = 1,
    /// A close has been initiated but not yet observed by the peer.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

impl ReadyState {
    /// Whether frames can be written from this state.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, ReadyState::Open)
    }

    /// Whether the endpoint still needs a terminating close (open or
    /// half-closed, mirroring the socket contract's OPEN/CLOSING check).
    #[must_use]
    pub fn needs_close(self) -> bool {
        matches!(self, ReadyState::Open | ReadyState::Closing)
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}
