//! In-process channel pairs.
//!
//! A [`ChannelPair`] is the connection primitive a hosting runtime hands
//! out: two linked endpoints with independent ready states, an ordered
//! event queue in each direction, and a persistent attachment slot per
//! endpoint. The attachment slot belongs to the endpoint, not to any one
//! consumer, so it survives a dispatcher being torn down and rebuilt while
//! the endpoint handles stay alive.

use crate::event::ChannelEvent;
use crate::id::ChannelId;
use crate::state::ReadyState;
use bytes::Bytes;
use harbor_protocol::Frame;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::trace;

/// Errors surfaced by the raw channel API.
///
/// Note the contrast with the guarded wrapper in the session layer: the raw
/// API rejects writes on a non-open endpoint, the wrapper turns them into
/// no-ops.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The endpoint is not open.
    #[error("channel is not open (state: {0})")]
    NotOpen(ReadyState),

    /// The peer endpoint no longer exists.
    #[error("peer endpoint dropped")]
    PeerGone,
}

/// Which half of a pair an endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The half returned to the caller of an upgrade.
    Client,
    /// The half accepted and tracked by a dispatcher.
    Server,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Server => "server",
        }
    }
}

#[derive(Debug)]
struct EndpointInner {
    id: ChannelId,
    side: Side,
    state: AtomicU8,
    attachment: Mutex<Option<Bytes>>,
    /// Writes land in the peer's queue.
    peer_tx: mpsc::UnboundedSender<ChannelEvent>,
    /// Reads drain this endpoint's own queue.
    rx: AsyncMutex<mpsc::UnboundedReceiver<ChannelEvent>>,
    /// Back-reference for completing the close handshake.
    peer: OnceLock<Weak<EndpointInner>>,
}

impl EndpointInner {
    fn new(
        side: Side,
        peer_tx: mpsc::UnboundedSender<ChannelEvent>,
        rx: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        Self {
            id: ChannelId::generate(),
            side,
            state: AtomicU8::new(ReadyState::Connecting as u8),
            attachment: Mutex::new(None),
            peer_tx,
            rx: AsyncMutex::new(rx),
            peer: OnceLock::new(),
        }
    }

    fn state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Move `Connecting`/`Open` to `Closing`. Returns `false` when the
    /// endpoint was already closing or closed.
    fn begin_close(&self) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if current >= ReadyState::Closing as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                ReadyState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn peer(&self) -> Option<Arc<EndpointInner>> {
        self.peer.get().and_then(Weak::upgrade)
    }
}

/// A pair of linked channel endpoints.
///
/// This is the analog of a socket pair created during an upgrade handshake:
/// the server half is registered with a dispatcher, the client half is
/// returned as the protocol-switch payload.
pub struct ChannelPair;

impl ChannelPair {
    /// Create a linked client/server endpoint pair. Both start `Connecting`.
    #[must_use]
    pub fn create() -> (Channel, Channel) {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        // Each endpoint writes into the other's queue.
        let client = Arc::new(EndpointInner::new(Side::Client, server_tx, client_rx));
        let server = Arc::new(EndpointInner::new(Side::Server, client_tx, server_rx));

        let _ = client.peer.set(Arc::downgrade(&server));
        let _ = server.peer.set(Arc::downgrade(&client));

        trace!(
            client = %client.id,
            server = %server.id,
            "Created channel pair"
        );

        (Channel { inner: client }, Channel { inner: server })
    }
}

/// A handle to one endpoint of a channel pair.
///
/// Handles are cheap to clone; all clones observe the same state, queue,
/// and attachment slot.
#[derive(Debug, Clone)]
pub struct Channel {
    inner: Arc<EndpointInner>,
}

impl Channel {
    /// This endpoint's unique identifier.
    #[must_use]
    pub fn id(&self) -> &ChannelId {
        &self.inner.id
    }

    /// Which half of the pair this endpoint is.
    #[must_use]
    pub fn side(&self) -> Side {
        self.inner.side
    }

    /// Current ready state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.inner.state()
    }

    /// Accept the endpoint, moving `Connecting` to `Open`.
    ///
    /// Accepting an endpoint in any other state is a no-op.
    pub fn accept(&self) {
        let _ = self.inner.state.compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Send a text frame to the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if this endpoint is not open or the peer endpoint
    /// has been dropped.
    pub fn send_text(&self, text: String) -> Result<(), ChannelError> {
        self.send_frame(Frame::Text(text))
    }

    /// Send a binary frame to the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if this endpoint is not open or the peer endpoint
    /// has been dropped.
    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), ChannelError> {
        self.send_frame(Frame::Binary(data.into()))
    }

    /// Send an application frame to the peer.
    ///
    /// # Errors
    ///
    /// Returns an error if this endpoint is not open or the peer endpoint
    /// has been dropped.
    pub fn send_frame(&self, frame: Frame) -> Result<(), ChannelError> {
        let state = self.ready_state();
        if !state.is_open() {
            return Err(ChannelError::NotOpen(state));
        }

        self.inner
            .peer_tx
            .send(ChannelEvent::Frame(frame))
            .map_err(|_| ChannelError::PeerGone)
    }

    /// Initiate a close with the given code and reason.
    ///
    /// The endpoint moves to `Closing`; both endpoints move to `Closed`
    /// once the peer observes the close event. Closing an endpoint that is
    /// already closing or closed is a no-op.
    pub fn close(&self, code: u16, reason: &str) {
        if !self.inner.begin_close() {
            return;
        }

        trace!(
            channel = %self.inner.id,
            side = self.inner.side.as_str(),
            code,
            "Channel closing"
        );

        let _ = self.inner.peer_tx.send(ChannelEvent::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Mark this endpoint as failed and deliver an error event to the peer.
    ///
    /// Used by transport drivers when the underlying wire errors out rather
    /// than closing cleanly.
    pub fn fail(&self, error: &str) {
        self.inner.set_state(ReadyState::Closed);
        let _ = self
            .inner
            .peer_tx
            .send(ChannelEvent::Error(error.to_string()));
    }

    /// Receive the next event from the peer.
    ///
    /// Returns `None` once the endpoint is closed and its queue drained, or
    /// when the peer endpoint has been dropped entirely.
    pub async fn recv(&self) -> Option<ChannelEvent> {
        if self.ready_state() == ReadyState::Closed {
            return None;
        }

        let event = self.inner.rx.lock().await.recv().await;
        self.observe(event)
    }

    /// Receive the next event without waiting.
    ///
    /// Returns `None` when the queue is currently empty or the endpoint is
    /// closed.
    pub async fn try_recv(&self) -> Option<ChannelEvent> {
        if self.ready_state() == ReadyState::Closed {
            return None;
        }

        let event = self.inner.rx.lock().await.try_recv().ok();
        self.observe(event)
    }

    /// Store the attachment blob for this endpoint.
    pub fn set_attachment(&self, blob: Bytes) {
        *self.inner.attachment.lock().unwrap() = Some(blob);
    }

    /// Read the attachment blob for this endpoint, if any was stored.
    #[must_use]
    pub fn attachment(&self) -> Option<Bytes> {
        self.inner.attachment.lock().unwrap().clone()
    }

    /// Complete state transitions implied by a dequeued event.
    fn observe(&self, event: Option<ChannelEvent>) -> Option<ChannelEvent> {
        match &event {
            Some(ChannelEvent::Close { .. }) => {
                // Observing the peer's close completes the handshake for
                // both endpoints.
                self.inner.set_state(ReadyState::Closed);
                if let Some(peer) = self.inner.peer() {
                    peer.set_state(ReadyState::Closed);
                }
            }
            Some(ChannelEvent::Error(_)) => {
                self.inner.set_state(ReadyState::Closed);
            }
            Some(ChannelEvent::Frame(_)) => {}
            None => {}
        }
        event
    }
}
