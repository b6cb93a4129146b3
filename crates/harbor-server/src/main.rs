//! # Harbor Server
//!
//! Room-chat demo built on the Harbor session layer. Each value of the
//! `actor` query parameter on `/websocket` is its own room: sessions in a
//! room share a roster, chat messages are broadcast, and member state
//! survives an actor restart through the per-connection attachments.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! harbor
//!
//! # Run with environment variables
//! HARBOR_PORT=9000 HARBOR_HOST=0.0.0.0 harbor
//! ```

use anyhow::Result;
use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tenvis_harbor_channel::Channel;
use tenvis_harbor_core::{
    ConnectContext, Session, SessionContext, SessionError, SessionFactory,
};
use tenvis_harbor_server::{metrics, routes, ActorNamespace, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Member {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientMessage {
    Join { name: String },
    Chat { text: String },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ServerMessage {
    Welcome { id: String },
    Joined { name: String },
    Chat { from: String, text: String },
    Pong,
    Buffer { bytes: usize },
    Left { name: String },
}

struct RoomSession {
    member_id: String,
}

#[async_trait]
impl Session for RoomSession {
    type Data = Member;
    type ClientMessage = ClientMessage;
    type ServerMessage = ServerMessage;

    async fn create_data(&mut self, _ctx: &ConnectContext) -> Result<Member, SessionError> {
        Ok(Member {
            id: self.member_id.clone(),
            name: None,
        })
    }

    async fn handle_message(
        &mut self,
        session: &mut SessionContext<Member, ServerMessage>,
        message: ClientMessage,
    ) -> Result<(), SessionError> {
        match message {
            ClientMessage::Join { name } => {
                session.data_mut().name = Some(name.clone());
                session.update()?;

                session.send(&ServerMessage::Welcome {
                    id: session.data().id.clone(),
                })?;
                session.broadcast(&ServerMessage::Joined { name }, true)?;
            }
            ClientMessage::Chat { text } => {
                let from = session
                    .data()
                    .name
                    .clone()
                    .unwrap_or_else(|| session.data().id.clone());
                session.broadcast(&ServerMessage::Chat { from, text }, false)?;
            }
            ClientMessage::Ping => {
                session.send(&ServerMessage::Pong)?;
            }
        }
        Ok(())
    }

    async fn handle_buffer_message(
        &mut self,
        session: &mut SessionContext<Member, ServerMessage>,
        buffer: Bytes,
    ) -> Result<(), SessionError> {
        session.send(&ServerMessage::Buffer {
            bytes: buffer.len(),
        })?;
        Ok(())
    }

    async fn handle_close(
        &mut self,
        session: &mut SessionContext<Member, ServerMessage>,
    ) -> Result<(), SessionError> {
        if let Some(name) = session.data().name.clone() {
            session.broadcast(&ServerMessage::Left { name }, true)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct RoomFactory {
    next_member: u64,
}

#[async_trait]
impl SessionFactory for RoomFactory {
    type Session = RoomSession;

    async fn create_session(&mut self, _channel: &Channel) -> Result<RoomSession, SessionError> {
        self.next_member += 1;
        Ok(RoomSession {
            member_id: format!("member-{}", self.next_member),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harbor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    tracing::info!("Starting Harbor server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // One room per actor identity
    let namespace = ActorNamespace::new(|_room: &str| RoomFactory::default());

    let app = Router::new().route(
        "/health",
        get(|| async {
            axum::Json(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION")
            }))
        }),
    );

    routes::run_server(config, namespace, app).await?;

    Ok(())
}
