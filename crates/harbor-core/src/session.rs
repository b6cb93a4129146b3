//! Sessions: per-connection state, application hooks, and the roster.

use crate::context::ConnectContext;
use crate::error::SessionError;
use crate::wrapper::ChannelWrapper;
use async_trait::async_trait;
use bytes::Bytes;
use harbor_protocol::encode_text;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tenvis_harbor_channel::{Channel, ChannelId};
use tracing::trace;

/// Shared, insertion-ordered view of the live connections.
///
/// The roster exists for one purpose: letting any session broadcast to its
/// siblings. The dispatcher inserts and removes entries in the same step as
/// its session registry, so roster membership and registry membership can
/// never disagree.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Arc<Mutex<Vec<(ChannelId, Channel)>>>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Whether a connection is listed.
    #[must_use]
    pub fn contains(&self, id: &ChannelId) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(entry_id, _)| entry_id == id)
    }

    pub(crate) fn insert(&self, channel: Channel) {
        let mut entries = self.entries.lock().unwrap();
        entries.push((channel.id().clone(), channel));
    }

    pub(crate) fn remove(&self, id: &ChannelId) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|(entry_id, _)| entry_id != id);
    }

    /// Deliver a pre-encoded text payload to every open entry.
    ///
    /// Iterates a snapshot taken at call time, in insertion order; an entry
    /// registered after the call does not receive the payload. Non-open
    /// entries are skipped. Returns the number of deliveries.
    pub fn broadcast_text(&self, text: &str, exclude: Option<&ChannelId>) -> usize {
        let snapshot: Vec<(ChannelId, Channel)> = self.entries.lock().unwrap().clone();

        let mut delivered = 0;
        for (id, channel) in &snapshot {
            if exclude == Some(id) {
                continue;
            }
            if !channel.ready_state().is_open() {
                continue;
            }
            if channel.send_text(text.to_string()).is_ok() {
                delivered += 1;
            }
        }

        trace!(recipients = delivered, "Broadcast delivered");
        delivered
    }
}

/// Per-connection runtime state owned by the session layer.
///
/// A context only exists once its data does: fresh connections run the
/// application's `create_data` before the context is built, resumed
/// connections adopt the persisted attachment. Hooks can therefore always
/// rely on [`data`](SessionContext::data) being present.
#[derive(Debug)]
pub struct SessionContext<D, M> {
    data: D,
    wrapper: ChannelWrapper<D, M>,
    roster: Roster,
}

impl<D, M> SessionContext<D, M>
where
    D: Serialize + DeserializeOwned,
    M: Serialize,
{
    /// Build a context for a brand-new connection, persisting the initial
    /// attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment cannot be written.
    pub(crate) fn start_fresh(
        wrapper: ChannelWrapper<D, M>,
        roster: Roster,
        data: D,
    ) -> Result<Self, SessionError> {
        wrapper.serialize_attachment(&data)?;
        Ok(Self {
            data,
            wrapper,
            roster,
        })
    }

    /// Build a context for a rehydrated connection from its attachment.
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::NoResumeData`] when the slot is empty. A
    /// tracked connection always persisted data at accept time, so callers
    /// treat this as a fatal setup error.
    pub(crate) fn resume(wrapper: ChannelWrapper<D, M>, roster: Roster) -> Result<Self, SessionError> {
        match wrapper.deserialize_attachment()? {
            Some(data) => Ok(Self {
                data,
                wrapper,
                roster,
            }),
            None => Err(SessionError::NoResumeData),
        }
    }

    /// The connection's application data.
    #[must_use]
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Mutable access to the application data.
    ///
    /// The session layer never infers when data changed; call
    /// [`update`](SessionContext::update) afterwards to keep the durable
    /// snapshot in sync.
    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    /// Re-persist the current data into the attachment slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment cannot be written.
    pub fn update(&self) -> Result<(), SessionError> {
        self.wrapper.serialize_attachment(&self.data)
    }

    /// Send a message to this connection. A no-op when the underlying
    /// endpoint is not open.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn send(&self, message: &M) -> Result<(), SessionError> {
        self.wrapper.send(message)
    }

    /// Broadcast a message to every live session.
    ///
    /// Delivery follows roster insertion order over a snapshot taken at
    /// call time. With `exclude_self`, this connection is skipped; the
    /// comparison is on connection identity, never on data. Returns the
    /// number of deliveries.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn broadcast(&self, message: &M, exclude_self: bool) -> Result<usize, SessionError> {
        let text = encode_text(message)?;
        let exclude = exclude_self.then(|| self.wrapper.channel().id());
        Ok(self.roster.broadcast_text(&text, exclude))
    }

    /// The underlying channel endpoint.
    #[must_use]
    pub fn channel(&self) -> &Channel {
        self.wrapper.channel()
    }

    /// This connection's identity.
    #[must_use]
    pub fn id(&self) -> &ChannelId {
        self.wrapper.channel().id()
    }

    /// The shared roster of live connections.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }
}

/// Application hooks for one connection.
///
/// The dispatcher depends only on this trait. Implementations hold whatever
/// per-connection helpers they need and receive the [`SessionContext`] on
/// every call; all hooks may await.
#[async_trait]
pub trait Session: Send + 'static {
    /// Durable per-connection payload, persisted as the attachment.
    type Data: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Inbound message union, decoded from JSON text frames. Tagged by a
    /// `type` field by convention.
    type ClientMessage: DeserializeOwned + Send + 'static;

    /// Outbound message union, encoded to JSON text frames.
    type ServerMessage: Serialize + Send + Sync + 'static;

    /// Produce the initial payload for a fresh connection.
    ///
    /// Called exactly once per connection, at accept time, before any frame
    /// is dispatched. Side effects must stay scoped to this connection.
    async fn create_data(&mut self, ctx: &ConnectContext) -> Result<Self::Data, SessionError>;

    /// Handle one decoded text message.
    async fn handle_message(
        &mut self,
        session: &mut SessionContext<Self::Data, Self::ServerMessage>,
        message: Self::ClientMessage,
    ) -> Result<(), SessionError>;

    /// Handle one binary frame.
    async fn handle_buffer_message(
        &mut self,
        session: &mut SessionContext<Self::Data, Self::ServerMessage>,
        buffer: Bytes,
    ) -> Result<(), SessionError>;

    /// Called exactly once when the connection terminates, before the
    /// session leaves the registry. Commonly used to notify peers.
    async fn handle_close(
        &mut self,
        session: &mut SessionContext<Self::Data, Self::ServerMessage>,
    ) -> Result<(), SessionError>;
}
