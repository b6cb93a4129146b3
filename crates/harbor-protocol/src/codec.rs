//! Codecs for Harbor's two serialized surfaces.
//!
//! Text frames use JSON (the wire contract requires a UTF-8 JSON object with
//! a `type` discriminator). Attachments use MessagePack, the host storage
//! primitive's compact encoding, and are capped at [`MAX_ATTACHMENT_SIZE`]
//! to match the per-connection slot they live in.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum serialized attachment size in bytes (2 KiB).
pub const MAX_ATTACHMENT_SIZE: usize = 2048;

/// Errors that can occur while encoding or decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding of a text message failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding of an attachment failed.
    #[error("Attachment encoding error: {0}")]
    AttachmentEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding of an attachment failed.
    #[error("Attachment decoding error: {0}")]
    AttachmentDecode(#[from] rmp_serde::decode::Error),

    /// Attachment exceeds the per-connection slot size.
    #[error("Attachment size {0} exceeds maximum {MAX_ATTACHMENT_SIZE}")]
    AttachmentTooLarge(usize),
}

/// Encode an application message as a JSON text payload.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_text<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a JSON text payload into an application message.
///
/// # Errors
///
/// Returns an error if the payload is not valid JSON for `T`.
pub fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a value into an attachment blob.
///
/// # Errors
///
/// Returns an error if encoding fails or the blob exceeds
/// [`MAX_ATTACHMENT_SIZE`].
pub fn encode_attachment<T: Serialize>(value: &T) -> Result<Bytes, ProtocolError> {
    let payload = rmp_serde::to_vec_named(value)?;

    if payload.len() > MAX_ATTACHMENT_SIZE {
        return Err(ProtocolError::AttachmentTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode an attachment blob back into a value.
///
/// # Errors
///
/// Returns an error if the blob does not decode as `T`.
pub fn decode_attachment<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    Ok(rmp_serde::from_slice(data)?)
}
