//! Session lifecycle tests against the dispatcher, driven the way a host
//! runtime drives it: in-process channel pairs, events delivered in
//! arrival order from a single task.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tenvis_harbor_channel::{Channel, ChannelEvent, ChannelPair, ReadyState};
use tenvis_harbor_core::{
    ConnectContext, Dispatcher, Session, SessionContext, SessionError, SessionFactory,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Participant {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ServerMessage {
    Welcome { message: String },
    Error { error: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientMessage {
    Join,
    Ping,
    Broadcast { message: String },
    BroadcastExcludeSelf { message: String },
    ServerClose,
    ErrorTrigger,
}

struct TestSession;

#[async_trait]
impl Session for TestSession {
    type Data = Participant;
    type ClientMessage = ClientMessage;
    type ServerMessage = ServerMessage;

    async fn create_data(&mut self, ctx: &ConnectContext) -> Result<Participant, SessionError> {
        let id = ctx
            .header("x-participant")
            .ok_or_else(|| SessionError::setup("missing participant header"))?;
        Ok(Participant { id: id.to_string() })
    }

    async fn handle_message(
        &mut self,
        session: &mut SessionContext<Participant, ServerMessage>,
        message: ClientMessage,
    ) -> Result<(), SessionError> {
        match message {
            ClientMessage::Join => {
                session.send(&ServerMessage::Welcome {
                    message: "Welcome to the test session!".into(),
                })?;
            }
            ClientMessage::Ping => {
                session.send(&ServerMessage::Welcome {
                    message: "pong".into(),
                })?;
            }
            ClientMessage::Broadcast { message } => {
                session.broadcast(
                    &ServerMessage::Welcome {
                        message: format!("Broadcast: {message}"),
                    },
                    false,
                )?;
            }
            ClientMessage::BroadcastExcludeSelf { message } => {
                session.broadcast(
                    &ServerMessage::Welcome {
                        message: format!("Broadcast (excluding self): {message}"),
                    },
                    true,
                )?;
            }
            ClientMessage::ServerClose => {
                session.send(&ServerMessage::Welcome {
                    message: "Server is closing this connection".into(),
                })?;
                session.channel().close(1000, "Closed by server");
            }
            ClientMessage::ErrorTrigger => {
                session.send(&ServerMessage::Error {
                    error: "Error triggered by client request".into(),
                })?;
                return Err(SessionError::other("simulated handler failure"));
            }
        }
        Ok(())
    }

    async fn handle_buffer_message(
        &mut self,
        session: &mut SessionContext<Participant, ServerMessage>,
        buffer: Bytes,
    ) -> Result<(), SessionError> {
        if buffer.is_empty() {
            session.send(&ServerMessage::Welcome {
                message: "Received empty buffer".into(),
            })?;
            return Ok(());
        }

        let values: Vec<i32> = buffer
            .chunks_exact(4)
            .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let message = if values.len() <= 4 {
            let listed = values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("Received buffer with values: {listed}")
        } else {
            let first = values
                .iter()
                .take(10)
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Received large buffer ({} values), first 10 values: {first}",
                values.len()
            )
        };

        session.send(&ServerMessage::Welcome { message })?;
        Ok(())
    }

    async fn handle_close(
        &mut self,
        session: &mut SessionContext<Participant, ServerMessage>,
    ) -> Result<(), SessionError> {
        // Notify the others, but only if there are any.
        if session.roster().len() > 1 {
            session.broadcast(
                &ServerMessage::Welcome {
                    message: format!("A session closed (id: {})", session.data().id),
                },
                true,
            )?;
        }
        Ok(())
    }
}

struct TestFactory;

#[async_trait]
impl SessionFactory for TestFactory {
    type Session = TestSession;

    async fn create_session(&mut self, _channel: &Channel) -> Result<TestSession, SessionError> {
        Ok(TestSession)
    }
}

fn connect_ctx(participant: &str) -> ConnectContext {
    ConnectContext::new("/websocket")
        .with_header("upgrade", "websocket")
        .with_header("x-participant", participant)
}

async fn connect(dispatcher: &mut Dispatcher<TestFactory>, participant: &str) -> (Channel, Channel) {
    let upgrade = dispatcher.accept(&connect_ctx(participant)).await;
    upgrade.client.accept();
    (upgrade.client, upgrade.server)
}

/// Deliver everything currently queued on the server half, as the host's
/// actor loop would.
async fn pump(dispatcher: &mut Dispatcher<TestFactory>, server: &Channel) {
    while let Some(event) = server.try_recv().await {
        dispatcher.on_event(server, event).await;
    }
}

async fn recv_json(client: &Channel) -> Value {
    match client.recv().await {
        Some(ChannelEvent::Frame(harbor_protocol::Frame::Text(text))) => {
            serde_json::from_str(&text).unwrap()
        }
        other => panic!("Expected text frame, got {other:?}"),
    }
}

fn send_json(client: &Channel, value: Value) {
    client.send_text(value.to_string()).unwrap();
}

#[tokio::test]
async fn test_join_round_trip_sees_created_data() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (client, server) = connect(&mut dispatcher, "alice").await;

    assert_eq!(dispatcher.session_count(), 1);

    // The initial data snapshot is durable before any frame flows.
    let blob = server.attachment().expect("attachment written at accept");
    let persisted: Participant = harbor_protocol::decode_attachment(&blob).unwrap();
    assert_eq!(persisted.id, "alice");

    send_json(&client, json!({"type": "join"}));
    pump(&mut dispatcher, &server).await;

    let reply = recv_json(&client).await;
    assert_eq!(reply["type"], "welcome");
    assert_eq!(reply["message"], "Welcome to the test session!");
}

#[tokio::test]
async fn test_ping_gets_pong() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (client, server) = connect(&mut dispatcher, "alice").await;

    send_json(&client, json!({"type": "ping"}));
    pump(&mut dispatcher, &server).await;

    assert_eq!(
        recv_json(&client).await,
        json!({"type": "welcome", "message": "pong"})
    );
}

#[tokio::test]
async fn test_empty_buffer_reply() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (client, server) = connect(&mut dispatcher, "alice").await;

    client.send_binary(Vec::new()).unwrap();
    pump(&mut dispatcher, &server).await;

    assert_eq!(
        recv_json(&client).await,
        json!({"type": "welcome", "message": "Received empty buffer"})
    );
}

#[tokio::test]
async fn test_binary_buffer_decoded_as_i32_values() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (client, server) = connect(&mut dispatcher, "alice").await;

    let mut buffer = Vec::new();
    for value in [42i32, -123, 999, 0] {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
    assert_eq!(buffer.len(), 16);

    client.send_binary(buffer).unwrap();
    pump(&mut dispatcher, &server).await;

    assert_eq!(
        recv_json(&client).await,
        json!({
            "type": "welcome",
            "message": "Received buffer with values: 42, -123, 999, 0"
        })
    );
}

#[tokio::test]
async fn test_broadcast_includes_sender() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (c1, s1) = connect(&mut dispatcher, "alice").await;
    let (c2, _s2) = connect(&mut dispatcher, "bob").await;

    send_json(&c1, json!({"type": "broadcast", "message": "hi"}));
    pump(&mut dispatcher, &s1).await;

    let expected = json!({"type": "welcome", "message": "Broadcast: hi"});
    assert_eq!(recv_json(&c1).await, expected);
    assert_eq!(recv_json(&c2).await, expected);
}

#[tokio::test]
async fn test_broadcast_exclude_self_skips_sender() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (c1, s1) = connect(&mut dispatcher, "alice").await;
    let (c2, _s2) = connect(&mut dispatcher, "bob").await;

    send_json(&c1, json!({"type": "broadcast-exclude-self", "message": "hi"}));
    pump(&mut dispatcher, &s1).await;

    assert!(c1.try_recv().await.is_none());
    assert_eq!(
        recv_json(&c2).await,
        json!({"type": "welcome", "message": "Broadcast (excluding self): hi"})
    );
}

#[tokio::test]
async fn test_closed_session_drops_out_of_broadcasts() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (c1, s1) = connect(&mut dispatcher, "alice").await;
    let (c2, s2) = connect(&mut dispatcher, "bob").await;

    // Client-initiated close runs the close hook and removes the session.
    c1.close(1000, "bye");
    pump(&mut dispatcher, &s1).await;

    assert_eq!(dispatcher.session_count(), 1);
    assert_eq!(
        recv_json(&c2).await,
        json!({"type": "welcome", "message": "A session closed (id: alice)"})
    );

    // A later broadcast reaches the remaining session only; the closed
    // session's captured-message count stops growing.
    send_json(&c2, json!({"type": "broadcast", "message": "still here"}));
    pump(&mut dispatcher, &s2).await;

    assert_eq!(
        recv_json(&c2).await,
        json!({"type": "welcome", "message": "Broadcast: still here"})
    );
    assert!(c1.try_recv().await.is_none());
}

#[tokio::test]
async fn test_failing_handler_leaves_connection_open() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (client, server) = connect(&mut dispatcher, "alice").await;

    send_json(&client, json!({"type": "error-trigger"}));
    pump(&mut dispatcher, &server).await;

    assert_eq!(
        recv_json(&client).await,
        json!({"type": "error", "error": "Error triggered by client request"})
    );

    // The handler failed after sending, but the connection stays open and
    // keeps processing.
    assert!(dispatcher.is_registered(server.id()));
    send_json(&client, json!({"type": "ping"}));
    pump(&mut dispatcher, &server).await;
    assert_eq!(
        recv_json(&client).await,
        json!({"type": "welcome", "message": "pong"})
    );
}

#[tokio::test]
async fn test_malformed_text_frame_is_tolerated() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (client, server) = connect(&mut dispatcher, "alice").await;

    client.send_text("not json at all".to_string()).unwrap();
    pump(&mut dispatcher, &server).await;

    assert!(dispatcher.is_registered(server.id()));
    send_json(&client, json!({"type": "ping"}));
    pump(&mut dispatcher, &server).await;
    assert_eq!(
        recv_json(&client).await,
        json!({"type": "welcome", "message": "pong"})
    );
}

#[tokio::test]
async fn test_unknown_connection_is_ignored() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (_c1, _s1) = connect(&mut dispatcher, "alice").await;

    let (stranger_client, stranger_server) = ChannelPair::create();
    stranger_client.accept();
    stranger_server.accept();

    stranger_client.send_text("{\"type\":\"ping\"}".to_string()).unwrap();
    pump(&mut dispatcher, &stranger_server).await;

    // Nothing came back and nothing was registered.
    assert!(stranger_client.try_recv().await.is_none());
    assert_eq!(dispatcher.session_count(), 1);
}

#[tokio::test]
async fn test_server_close_reaches_client_and_cleans_up() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (client, server) = connect(&mut dispatcher, "alice").await;

    send_json(&client, json!({"type": "server-close"}));
    pump(&mut dispatcher, &server).await;

    assert_eq!(
        recv_json(&client).await,
        json!({"type": "welcome", "message": "Server is closing this connection"})
    );
    match client.recv().await {
        Some(ChannelEvent::Close { code, reason }) => {
            assert_eq!(code, 1000);
            assert_eq!(reason, "Closed by server");
        }
        other => panic!("Expected close event, got {other:?}"),
    }

    // The host observes the terminated socket and reports the close.
    dispatcher.on_close(&server, 1000, "Closed by server").await;
    assert_eq!(dispatcher.session_count(), 0);
}

#[tokio::test]
async fn test_setup_failure_still_commits_the_upgrade() {
    let mut dispatcher = Dispatcher::new(TestFactory);

    // No participant header: create_data fails after the pair exists.
    let upgrade = dispatcher
        .accept(&ConnectContext::new("/websocket").with_header("upgrade", "websocket"))
        .await;
    let client = upgrade.client;

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(
        recv_json(&client).await,
        json!({"error": "Uncaught exception during session setup."})
    );
    match client.recv().await {
        Some(ChannelEvent::Close { code, reason }) => {
            assert_eq!(code, 1011);
            assert_eq!(reason, "Uncaught exception during session setup.");
        }
        other => panic!("Expected close event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_path_runs_close_hook_and_closes_1011() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (c1, s1) = connect(&mut dispatcher, "alice").await;
    let (c2, _s2) = connect(&mut dispatcher, "bob").await;

    dispatcher.on_error(&s1, "transport failure").await;

    assert_eq!(dispatcher.session_count(), 1);
    assert_eq!(
        recv_json(&c2).await,
        json!({"type": "welcome", "message": "A session closed (id: alice)"})
    );
    match c1.recv().await {
        Some(ChannelEvent::Close { code, reason }) => {
            assert_eq!(code, 1011);
            assert_eq!(reason, "Error during session.");
        }
        other => panic!("Expected close event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rehydration_resumes_persisted_data() {
    let mut dispatcher = Dispatcher::new(TestFactory);
    let (c1, s1) = connect(&mut dispatcher, "alice").await;

    // The actor goes away; the channel endpoints survive at the host.
    drop(dispatcher);

    let mut revived = Dispatcher::new(TestFactory);
    revived.rehydrate(vec![s1.clone()]).await;
    assert_eq!(revived.session_count(), 1);

    // The session works again without create_data having re-run.
    send_json(&c1, json!({"type": "ping"}));
    pump(&mut revived, &s1).await;
    assert_eq!(
        recv_json(&c1).await,
        json!({"type": "welcome", "message": "pong"})
    );

    // The resumed identity is the persisted one, observable through the
    // close notification.
    let (c2, _s2) = connect(&mut revived, "carol").await;
    c1.close(1000, "done");
    pump(&mut revived, &s1).await;
    assert_eq!(
        recv_json(&c2).await,
        json!({"type": "welcome", "message": "A session closed (id: alice)"})
    );
}

#[tokio::test]
async fn test_rehydration_without_attachment_is_a_setup_error() {
    let (client, server) = ChannelPair::create();
    client.accept();
    server.accept();

    let mut dispatcher = Dispatcher::new(TestFactory);
    dispatcher.rehydrate(vec![server.clone()]).await;

    assert_eq!(dispatcher.session_count(), 0);
    assert_eq!(server.ready_state(), ReadyState::Closing);
    match client.recv().await {
        Some(ChannelEvent::Close { code, reason }) => {
            assert_eq!(code, 1011);
            assert_eq!(reason, "Error during session setup.");
        }
        other => panic!("Expected close event, got {other:?}"),
    }
    assert_eq!(server.ready_state(), ReadyState::Closed);
}
