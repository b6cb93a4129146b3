//! Actor hosting.
//!
//! One actor identity is one tokio task owning a
//! [`Dispatcher`](tenvis_harbor_core::Dispatcher). Every upgrade and every
//! channel event goes through the actor's single inbox, which is what makes
//! execution single-threaded per identity: at most one event is processed
//! at a time, frames for one connection arrive in order (the per-connection
//! pump feeds the inbox in arrival order), and the dispatcher needs no
//! locking. Different identities run on independent tasks and share
//! nothing.
//!
//! The host also keeps the piece that outlives any one activation: the set
//! of accepted server endpoints, with their attachment slots. On
//! [`restart`](ActorHandle::restart) a fresh dispatcher rehydrates those
//! endpoints before it drains the inbox, so a frame arriving around the
//! restart is never dropped as unknown.

use dashmap::DashMap;
use harbor_protocol::close;
use std::sync::{Arc, Mutex};
use tenvis_harbor_channel::{Channel, ChannelEvent, ChannelId, ReadyState};
use tenvis_harbor_core::{ConnectContext, Dispatcher, SessionFactory};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::metrics;

/// Errors surfaced by the actor host.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The actor task is gone and nothing will replace it.
    #[error("actor is not available")]
    Unavailable,
}

enum ActorMessage {
    Connect {
        ctx: ConnectContext,
        reply: oneshot::Sender<Channel>,
    },
    Event {
        channel: Channel,
        event: ChannelEvent,
    },
    /// A pump drained its endpoint without seeing a close event; the
    /// connection terminated server-side.
    Terminated {
        channel: Channel,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Handle to a hosted actor identity.
///
/// Cheap to clone; clones address the same actor. The handle survives
/// restarts: per-connection pumps deliver through it, so they follow the
/// actor across activations.
#[derive(Clone)]
pub struct ActorHandle {
    name: Arc<str>,
    inbox: Arc<Mutex<mpsc::UnboundedSender<ActorMessage>>>,
    tracked: Arc<Mutex<Vec<Channel>>>,
}

impl ActorHandle {
    /// The actor identity this handle addresses.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of connections currently tracked for this identity.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.tracked.lock().unwrap().len()
    }

    /// Ask the actor to accept an upgrade; returns the client half of the
    /// accepted pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor task is gone.
    pub async fn connect(&self, ctx: ConnectContext) -> Result<Channel, ActorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ActorMessage::Connect {
            ctx,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| ActorError::Unavailable)
    }

    /// Restart the actor in place with a fresh session factory.
    ///
    /// The current activation finishes its backlog and stops; a new
    /// dispatcher then rehydrates every still-open tracked connection
    /// before processing anything new. Events arriving during the swap are
    /// buffered, not lost.
    pub async fn restart<F: SessionFactory>(&self, factory: F) {
        let old_tx = self.inbox.lock().unwrap().clone();
        let inbox = self.swap_inbox();

        let (done_tx, done_rx) = oneshot::channel();
        if old_tx.send(ActorMessage::Shutdown { done: done_tx }).is_ok() {
            let _ = done_rx.await;
        }

        debug!(actor = %self.name, "Restarting actor");
        tokio::spawn(run_actor(self.clone(), factory, inbox));
    }

    fn send(&self, message: ActorMessage) -> Result<(), ActorError> {
        self.inbox
            .lock()
            .unwrap()
            .send(message)
            .map_err(|_| ActorError::Unavailable)
    }

    fn deliver(&self, channel: Channel, event: ChannelEvent) -> bool {
        self.send(ActorMessage::Event { channel, event }).is_ok()
    }

    fn deliver_terminated(&self, channel: Channel) -> bool {
        self.send(ActorMessage::Terminated { channel }).is_ok()
    }

    fn swap_inbox(&self) -> mpsc::UnboundedReceiver<ActorMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbox.lock().unwrap() = tx;
        rx
    }

    fn track(&self, channel: Channel) {
        self.tracked.lock().unwrap().push(channel);
    }

    fn untrack(&self, id: &ChannelId) {
        self.tracked
            .lock()
            .unwrap()
            .retain(|channel| channel.id() != id);
    }

    /// Tracked endpoints that are still usable, pruning terminal ones.
    fn survivors(&self) -> Vec<Channel> {
        let mut tracked = self.tracked.lock().unwrap();
        tracked.retain(|channel| channel.ready_state() != ReadyState::Closed);
        tracked.clone()
    }
}

/// Spawn a new actor identity with the given session factory.
#[must_use]
pub fn spawn_actor<F: SessionFactory>(name: impl Into<String>, factory: F) -> ActorHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ActorHandle {
        name: Arc::from(name.into()),
        inbox: Arc::new(Mutex::new(tx)),
        tracked: Arc::new(Mutex::new(Vec::new())),
    };

    tokio::spawn(run_actor(handle.clone(), factory, rx));
    handle
}

async fn run_actor<F: SessionFactory>(
    handle: ActorHandle,
    factory: F,
    mut inbox: mpsc::UnboundedReceiver<ActorMessage>,
) {
    let mut dispatcher = Dispatcher::new(factory);

    // Rehydrate before draining the inbox: no queued frame may be
    // dispatched until every surviving session is re-registered.
    dispatcher.rehydrate(handle.survivors()).await;

    debug!(
        actor = %handle.name(),
        sessions = dispatcher.session_count(),
        "Actor active"
    );

    while let Some(message) = inbox.recv().await {
        match message {
            ActorMessage::Connect { ctx, reply } => {
                let upgrade = dispatcher.accept(&ctx).await;
                handle.track(upgrade.server.clone());
                spawn_pump(handle.clone(), upgrade.server);
                let _ = reply.send(upgrade.client);
            }
            ActorMessage::Event { channel, event } => {
                dispatcher.on_event(&channel, event).await;
            }
            ActorMessage::Terminated { channel } => {
                dispatcher
                    .on_close(&channel, close::NORMAL, close::NORMAL_CLOSURE_REASON)
                    .await;
            }
            ActorMessage::Shutdown { done } => {
                let _ = done.send(());
                break;
            }
        }

        metrics::set_active_sessions(dispatcher.session_count());
    }

    debug!(actor = %handle.name(), "Actor deactivated");
}

/// Forward one endpoint's events into the actor inbox, in arrival order.
fn spawn_pump(handle: ActorHandle, channel: Channel) {
    tokio::spawn(async move {
        loop {
            match channel.recv().await {
                Some(event) => {
                    if !handle.deliver(channel.clone(), event) {
                        break;
                    }
                }
                None => {
                    let _ = handle.deliver_terminated(channel.clone());
                    break;
                }
            }
        }

        handle.untrack(channel.id());
        trace!(channel = %channel.id(), "Pump finished");
    });
}

/// A set of actor identities with get-or-spawn semantics.
///
/// The builder runs once per activation: on first use of an identity and
/// again on every restart, mirroring an actor platform constructing the
/// object anew while its persisted attachments carry the state.
pub struct ActorNamespace<F: SessionFactory> {
    actors: Arc<DashMap<String, ActorHandle>>,
    builder: Arc<dyn Fn(&str) -> F + Send + Sync>,
}

impl<F: SessionFactory> Clone for ActorNamespace<F> {
    fn clone(&self) -> Self {
        Self {
            actors: self.actors.clone(),
            builder: self.builder.clone(),
        }
    }
}

impl<F: SessionFactory> ActorNamespace<F> {
    /// Create a namespace from a per-activation factory builder.
    #[must_use]
    pub fn new(builder: impl Fn(&str) -> F + Send + Sync + 'static) -> Self {
        Self {
            actors: Arc::new(DashMap::new()),
            builder: Arc::new(builder),
        }
    }

    /// Get the actor for an identity, spawning it on first use.
    #[must_use]
    pub fn get_or_spawn(&self, name: &str) -> ActorHandle {
        self.actors
            .entry(name.to_string())
            .or_insert_with(|| spawn_actor(name, (self.builder)(name)))
            .clone()
    }

    /// Restart an identity in place. Returns `false` for an identity that
    /// was never spawned.
    pub async fn restart(&self, name: &str) -> bool {
        let Some(handle) = self.actors.get(name).map(|entry| entry.value().clone()) else {
            return false;
        };

        handle.restart((self.builder)(name)).await;
        true
    }

    /// Number of spawned identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether no identity has been spawned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use tenvis_harbor_core::{Session, SessionContext, SessionError};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CounterData {
        count: u64,
    }

    #[derive(Debug, Deserialize)]
    #[serde(tag = "type", rename_all = "kebab-case")]
    enum CounterClient {
        Bump,
    }

    #[derive(Debug, Serialize)]
    #[serde(tag = "type", rename_all = "kebab-case")]
    enum CounterServer {
        Count { count: u64 },
    }

    struct CounterSession;

    #[async_trait]
    impl Session for CounterSession {
        type Data = CounterData;
        type ClientMessage = CounterClient;
        type ServerMessage = CounterServer;

        async fn create_data(&mut self, _ctx: &ConnectContext) -> Result<CounterData, SessionError> {
            Ok(CounterData { count: 0 })
        }

        async fn handle_message(
            &mut self,
            session: &mut SessionContext<CounterData, CounterServer>,
            message: CounterClient,
        ) -> Result<(), SessionError> {
            match message {
                CounterClient::Bump => {
                    session.data_mut().count += 1;
                    session.update()?;
                    session.send(&CounterServer::Count {
                        count: session.data().count,
                    })?;
                }
            }
            Ok(())
        }

        async fn handle_buffer_message(
            &mut self,
            _session: &mut SessionContext<CounterData, CounterServer>,
            _buffer: Bytes,
        ) -> Result<(), SessionError> {
            Ok(())
        }

        async fn handle_close(
            &mut self,
            _session: &mut SessionContext<CounterData, CounterServer>,
        ) -> Result<(), SessionError> {
            Ok(())
        }
    }

    struct CounterFactory;

    #[async_trait]
    impl SessionFactory for CounterFactory {
        type Session = CounterSession;

        async fn create_session(
            &mut self,
            _channel: &Channel,
        ) -> Result<CounterSession, SessionError> {
            Ok(CounterSession)
        }
    }

    async fn bump(client: &Channel) -> u64 {
        client
            .send_text(r#"{"type":"bump"}"#.to_string())
            .unwrap();
        match client.recv().await {
            Some(ChannelEvent::Frame(harbor_protocol::Frame::Text(text))) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                value["count"].as_u64().unwrap()
            }
            other => panic!("Expected count reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_actor_accepts_and_dispatches() {
        let actor = spawn_actor("counter", CounterFactory);

        let client = actor.connect(ConnectContext::new("/websocket")).await.unwrap();
        client.accept();

        assert_eq!(bump(&client).await, 1);
        assert_eq!(bump(&client).await, 2);
        assert_eq!(actor.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_restart_rehydrates_from_attachments() {
        let actor = spawn_actor("counter", CounterFactory);

        let client = actor.connect(ConnectContext::new("/websocket")).await.unwrap();
        client.accept();

        assert_eq!(bump(&client).await, 1);
        assert_eq!(bump(&client).await, 2);

        actor.restart(CounterFactory).await;

        // The counter picked up where the attachment left it.
        assert_eq!(bump(&client).await, 3);
        assert_eq!(actor.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_namespace_reuses_handles() {
        let namespace = ActorNamespace::new(|_name: &str| CounterFactory);

        let a = namespace.get_or_spawn("room-a");
        let a_again = namespace.get_or_spawn("room-a");
        let b = namespace.get_or_spawn("room-b");

        assert_eq!(namespace.len(), 2);
        assert_eq!(a.name(), a_again.name());
        assert_ne!(a.name(), b.name());
        assert!(!namespace.restart("room-c").await);
        assert!(namespace.restart("room-a").await);
    }

    #[tokio::test]
    async fn test_client_close_untracks_connection() {
        let actor = spawn_actor("counter", CounterFactory);

        let client = actor.connect(ConnectContext::new("/websocket")).await.unwrap();
        client.accept();
        assert_eq!(bump(&client).await, 1);

        client.close(1000, "done");
        // The pump observes the close and the host drops the endpoint.
        loop {
            if actor.connection_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
    }
}
