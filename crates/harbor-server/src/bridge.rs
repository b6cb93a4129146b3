//! Bridges a real WebSocket onto the client half of a channel pair.
//!
//! The bridge is the only place where wire traffic and channel events meet:
//! socket frames become channel writes, channel events become socket
//! frames, and a transport failure is reported as a channel failure so the
//! dispatcher runs its error path.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use harbor_protocol::{close, Frame};
use tenvis_harbor_channel::{Channel, ChannelEvent};
use tracing::{debug, warn};

use crate::metrics::{self, ConnectionMetricsGuard};

/// Pump frames between a WebSocket and the client half of an accepted
/// pair until either side terminates. Inbound frames larger than
/// `max_message_size` fail the connection.
pub async fn run(socket: WebSocket, channel: Channel, max_message_size: usize) {
    let _guard = ConnectionMetricsGuard::new();
    channel.accept();

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = channel.recv() => match event {
                Some(ChannelEvent::Frame(Frame::Text(text))) => {
                    metrics::record_frame(text.len(), "outbound");
                    if sink.send(Message::Text(text)).await.is_err() {
                        channel.fail("websocket send failed");
                        break;
                    }
                }
                Some(ChannelEvent::Frame(Frame::Binary(data))) => {
                    metrics::record_frame(data.len(), "outbound");
                    if sink.send(Message::Binary(data.to_vec())).await.is_err() {
                        channel.fail("websocket send failed");
                        break;
                    }
                }
                Some(ChannelEvent::Close { code, reason }) => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
                Some(ChannelEvent::Error(_)) | None => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: close::INTERNAL_ERROR,
                            reason: close::SESSION_ERROR_REASON.into(),
                        })))
                        .await;
                    break;
                }
            },

            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > max_message_size {
                        warn!(
                            channel = %channel.id(),
                            size = text.len(),
                            "Inbound message too large"
                        );
                        metrics::record_error("frame-too-large");
                        channel.fail("inbound message too large");
                        break;
                    }
                    metrics::record_frame(text.len(), "inbound");
                    if channel.send_text(text).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if data.len() > max_message_size {
                        warn!(
                            channel = %channel.id(),
                            size = data.len(),
                            "Inbound message too large"
                        );
                        metrics::record_error("frame-too-large");
                        channel.fail("inbound message too large");
                        break;
                    }
                    metrics::record_frame(data.len(), "inbound");
                    if channel.send_binary(data).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if sink.send(Message::Pong(data)).await.is_err() {
                        channel.fail("websocket send failed");
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    // Ignore pongs
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (f.code, f.reason.to_string()))
                        .unwrap_or((close::NORMAL, String::new()));
                    channel.close(code, &reason);
                    break;
                }
                Some(Err(error)) => {
                    warn!(channel = %channel.id(), error = %error, "WebSocket error");
                    metrics::record_error("websocket");
                    channel.fail(&error.to_string());
                    break;
                }
                None => {
                    debug!(channel = %channel.id(), "WebSocket stream ended");
                    channel.close(close::NORMAL, "");
                    break;
                }
            }
        }
    }

    debug!(channel = %channel.id(), "Bridge finished");
}
