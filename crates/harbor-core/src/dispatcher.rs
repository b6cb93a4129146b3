//! The session registry and dispatcher.
//!
//! One dispatcher is the in-memory half of one actor identity. It owns the
//! connection → session registry, accepts upgrades, rehydrates sessions
//! after a restart, routes inbound frames to the right session, and
//! enforces cleanup on close and error.
//!
//! The dispatcher adds no locking of its own: every method takes
//! `&mut self`, and hosts call it from a single task per actor identity,
//! which is the serialization guarantee a durable actor platform provides.
//! Frames for one connection must be delivered in arrival order; ordering
//! across connections is unconstrained.

use crate::context::ConnectContext;
use crate::error::SessionError;
use crate::session::{Roster, Session, SessionContext};
use crate::wrapper::ChannelWrapper;
use async_trait::async_trait;
use harbor_protocol::{close, decode_text, encode_text, ErrorNotice, Frame};
use std::collections::HashMap;
use tenvis_harbor_channel::{Channel, ChannelEvent, ChannelId, ChannelPair};
use tracing::{debug, error, info, trace, warn};

/// Builds a session implementation per connection.
///
/// The dispatcher never constructs sessions itself; applications supply a
/// factory, and the factory runs for fresh connections and for rehydrated
/// ones alike.
#[async_trait]
pub trait SessionFactory: Send + 'static {
    /// The session type this factory produces.
    type Session: Session;

    /// Create the session object for a connection.
    async fn create_session(&mut self, channel: &Channel) -> Result<Self::Session, SessionError>;
}

struct SessionEntry<S: Session> {
    handler: S,
    context: SessionContext<S::Data, S::ServerMessage>,
}

/// Both halves of an accepted upgrade.
#[derive(Debug)]
pub struct AcceptedUpgrade {
    /// The half handed back as the protocol-switch payload.
    pub client: Channel,
    /// The accepted half; the host pumps its events into the dispatcher.
    pub server: Channel,
}

/// The session registry and frame dispatcher for one actor identity.
pub struct Dispatcher<F: SessionFactory> {
    factory: F,
    sessions: HashMap<ChannelId, SessionEntry<F::Session>>,
    roster: Roster,
}

impl<F: SessionFactory> Dispatcher<F> {
    /// Create a dispatcher with the given session factory.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            sessions: HashMap::new(),
            roster: Roster::new(),
        }
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether a connection currently has a registered session.
    #[must_use]
    pub fn is_registered(&self, id: &ChannelId) -> bool {
        self.sessions.contains_key(id)
    }

    /// The shared roster of live connections.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Accept a WebSocket upgrade.
    ///
    /// Creates a channel pair, accepts the server half, builds a session
    /// via the factory, runs its fresh-start persistence, and registers it.
    /// The client half is always returned: once the pair exists the
    /// protocol switch is committed, so a setup failure never fails the
    /// upgrade. It is delivered in-band instead: the client half is sent a
    /// JSON error notice and closed with 1011.
    pub async fn accept(&mut self, ctx: &ConnectContext) -> AcceptedUpgrade {
        let (client, server) = ChannelPair::create();
        server.accept();

        if let Err(setup_error) = self.setup_fresh(ctx, &server).await {
            error!(channel = %server.id(), error = %setup_error, "Session setup failed");

            // Deliver the failure in-band on the committed channel: the
            // client half observes the notice, then the 1011 close.
            if let Ok(text) = encode_text(&ErrorNotice::setup_failure()) {
                let _ = server.send_text(text);
            }
            server.close(close::INTERNAL_ERROR, close::SETUP_FAILURE_REASON);
        }

        AcceptedUpgrade { client, server }
    }

    /// Rehydrate sessions for channels that survived an actor restart.
    ///
    /// Runs `resume` (never `create_data`) for each channel; a failure is
    /// routed through the same error-close path as a live setup failure.
    /// The host must let this complete before dispatching any queued frame,
    /// so a frame for a reviving session is never dropped as unknown.
    pub async fn rehydrate(&mut self, channels: Vec<Channel>) {
        let total = channels.len();

        for channel in channels {
            if let Err(resume_error) = self.setup_resumed(&channel).await {
                error!(channel = %channel.id(), error = %resume_error, "Session resume failed");
                self.on_error(&channel, &resume_error.to_string()).await;
            }
        }

        if total > 0 {
            info!(
                resumed = self.sessions.len(),
                tracked = total,
                "Rehydrated sessions"
            );
        }
    }

    /// Route one inbound frame to its session.
    ///
    /// Frames for unknown connections are silently ignored; that covers the
    /// race where a frame arrives after removal. A failing handler (or a
    /// text frame that does not decode) is logged and the connection is
    /// deliberately left open: one bad message must not take down an
    /// otherwise healthy connection.
    pub async fn on_frame(&mut self, channel: &Channel, frame: Frame) {
        let Some(entry) = self.sessions.get_mut(channel.id()) else {
            trace!(channel = %channel.id(), "Frame for unknown connection ignored");
            return;
        };

        let result = match frame {
            Frame::Binary(buffer) => {
                entry
                    .handler
                    .handle_buffer_message(&mut entry.context, buffer)
                    .await
            }
            Frame::Text(text) => match decode_text(&text) {
                Ok(message) => entry.handler.handle_message(&mut entry.context, message).await,
                Err(decode_error) => Err(SessionError::from(decode_error)),
            },
        };

        if let Err(handler_error) = result {
            warn!(channel = %channel.id(), error = %handler_error, "Message handler failed");
        }
    }

    /// Run close cleanup for a connection.
    ///
    /// Unknown connections are ignored. Otherwise the close hook runs, the
    /// session is unregistered whether or not the hook failed, and the
    /// channel gets a terminal `1000` close if it is still open or closing.
    pub async fn on_close(&mut self, channel: &Channel, code: u16, reason: &str) {
        if !self.sessions.contains_key(channel.id()) {
            return;
        }

        debug!(channel = %channel.id(), code, reason, "Connection closed");
        self.finish(channel).await;

        if channel.ready_state().needs_close() {
            channel.close(close::NORMAL, close::NORMAL_CLOSURE_REASON);
        }
    }

    /// Run error cleanup for a connection.
    ///
    /// With a registered session this behaves like a close, except the
    /// terminal close carries `1011`. Without one (an error during setup)
    /// only the terminal close is issued.
    pub async fn on_error(&mut self, channel: &Channel, error: &str) {
        if !self.sessions.contains_key(channel.id()) {
            if channel.ready_state().needs_close() {
                channel.close(close::INTERNAL_ERROR, close::SETUP_ERROR_REASON);
            }
            return;
        }

        error!(channel = %channel.id(), error, "Connection errored");
        self.finish(channel).await;

        if channel.ready_state().needs_close() {
            channel.close(close::INTERNAL_ERROR, close::SESSION_ERROR_REASON);
        }
    }

    /// Fan a channel event into the matching handler.
    pub async fn on_event(&mut self, channel: &Channel, event: ChannelEvent) {
        match event {
            ChannelEvent::Frame(frame) => self.on_frame(channel, frame).await,
            ChannelEvent::Close { code, reason } => self.on_close(channel, code, &reason).await,
            ChannelEvent::Error(transport_error) => self.on_error(channel, &transport_error).await,
        }
    }

    async fn setup_fresh(
        &mut self,
        ctx: &ConnectContext,
        channel: &Channel,
    ) -> Result<(), SessionError> {
        let mut handler = self.factory.create_session(channel).await?;
        let data = handler.create_data(ctx).await?;

        let wrapper = ChannelWrapper::new(channel.clone());
        let context = SessionContext::start_fresh(wrapper, self.roster.clone(), data)?;

        self.register(channel, handler, context);
        Ok(())
    }

    async fn setup_resumed(&mut self, channel: &Channel) -> Result<(), SessionError> {
        let handler = self.factory.create_session(channel).await?;

        let wrapper = ChannelWrapper::new(channel.clone());
        let context = SessionContext::resume(wrapper, self.roster.clone())?;

        self.register(channel, handler, context);
        Ok(())
    }

    fn register(
        &mut self,
        channel: &Channel,
        handler: F::Session,
        context: SessionContext<
            <F::Session as Session>::Data,
            <F::Session as Session>::ServerMessage,
        >,
    ) {
        self.roster.insert(channel.clone());
        self.sessions
            .insert(channel.id().clone(), SessionEntry { handler, context });
        debug!(
            channel = %channel.id(),
            sessions = self.sessions.len(),
            "Session registered"
        );
    }

    fn unregister(&mut self, id: &ChannelId) {
        self.sessions.remove(id);
        self.roster.remove(id);
        debug!(channel = %id, sessions = self.sessions.len(), "Session removed");
    }

    /// Run the close hook, then unconditionally unregister.
    ///
    /// The session stays registered while its close hook runs so the hook
    /// can still broadcast to peers; removal happens regardless of the
    /// hook's outcome.
    async fn finish(&mut self, channel: &Channel) {
        let id = channel.id().clone();

        if let Some(entry) = self.sessions.get_mut(&id) {
            if let Err(close_error) = entry.handler.handle_close(&mut entry.context).await {
                error!(channel = %id, error = %close_error, "Close handler failed");
            }
        }

        self.unregister(&id);
    }
}
