//! Benchmark fixtures for the Harbor session layer.
//!
//! A minimal broadcast-fanout session used by the criterion benches.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tenvis_harbor_channel::Channel;
use tenvis_harbor_core::{
    ConnectContext, Session, SessionContext, SessionError, SessionFactory,
};

/// Inbound bench message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ShoutClient {
    /// Fan a message out to the whole roster.
    Shout {
        /// Payload to broadcast.
        message: String,
    },
}

/// Outbound bench message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ShoutServer {
    /// Broadcast payload.
    Shout {
        /// Payload as received.
        message: String,
    },
}

/// Session that broadcasts every inbound message to the roster.
pub struct ShoutSession;

#[async_trait]
impl Session for ShoutSession {
    type Data = u64;
    type ClientMessage = ShoutClient;
    type ServerMessage = ShoutServer;

    async fn create_data(&mut self, _ctx: &ConnectContext) -> Result<u64, SessionError> {
        Ok(0)
    }

    async fn handle_message(
        &mut self,
        session: &mut SessionContext<u64, ShoutServer>,
        message: ShoutClient,
    ) -> Result<(), SessionError> {
        match message {
            ShoutClient::Shout { message } => {
                session.broadcast(&ShoutServer::Shout { message }, false)?;
            }
        }
        Ok(())
    }

    async fn handle_buffer_message(
        &mut self,
        _session: &mut SessionContext<u64, ShoutServer>,
        _buffer: Bytes,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    async fn handle_close(
        &mut self,
        _session: &mut SessionContext<u64, ShoutServer>,
    ) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Factory producing [`ShoutSession`]s.
pub struct ShoutFactory;

#[async_trait]
impl SessionFactory for ShoutFactory {
    type Session = ShoutSession;

    async fn create_session(&mut self, _channel: &Channel) -> Result<ShoutSession, SessionError> {
        Ok(ShoutSession)
    }
}
