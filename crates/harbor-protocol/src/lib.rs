//! # harbor-protocol
//!
//! Wire formats for the Harbor session layer.
//!
//! Harbor keeps the application protocol deliberately thin: text frames are
//! UTF-8 JSON objects tagged by a `type` field (the shape of the union is
//! application-defined), binary frames are raw bytes, and per-connection
//! durable state is a single MessagePack attachment blob.
//!
//! ## Example
//!
//! ```rust
//! use harbor_protocol::codec;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! #[serde(tag = "type", rename_all = "kebab-case")]
//! enum ClientMessage {
//!     Ping,
//!     Chat { text: String },
//! }
//!
//! let text = codec::encode_text(&ClientMessage::Chat { text: "hi".into() }).unwrap();
//! let decoded: ClientMessage = codec::decode_text(&text).unwrap();
//! assert!(matches!(decoded, ClientMessage::Chat { .. }));
//! ```

pub mod close;
pub mod codec;
pub mod frames;

pub use codec::{
    decode_attachment, decode_text, encode_attachment, encode_text, ProtocolError,
    MAX_ATTACHMENT_SIZE,
};
pub use frames::{ErrorNotice, Frame};
