//! Guarded channel access for sessions.

use crate::error::SessionError;
use harbor_protocol::{decode_attachment, encode_attachment, encode_text};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tenvis_harbor_channel::Channel;

/// Thin guard around one channel endpoint.
///
/// Serializes outbound messages to JSON text frames, exposes the typed
/// attachment slot, and turns writes on a non-open endpoint into no-ops so
/// an application send cannot race a concurrent close into an error. Raw
/// channel errors from an actual write are still propagated; past the
/// guard they indicate misuse rather than a race.
#[derive(Debug)]
pub struct ChannelWrapper<D, M> {
    channel: Channel,
    _marker: PhantomData<fn(D, M)>,
}

impl<D, M> ChannelWrapper<D, M>
where
    D: Serialize + DeserializeOwned,
    M: Serialize,
{
    /// Wrap a channel endpoint.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            _marker: PhantomData,
        }
    }

    /// The wrapped endpoint.
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Send a message as a JSON text frame. A no-op when the endpoint is
    /// not open.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails, or if a write past the
    /// open-state guard is rejected by the raw channel.
    pub fn send(&self, message: &M) -> Result<(), SessionError> {
        if !self.channel.ready_state().is_open() {
            return Ok(());
        }

        let text = encode_text(message)?;
        self.channel.send_text(text)?;
        Ok(())
    }

    /// Persist a value into the endpoint's attachment slot.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the blob exceeds the slot
    /// size.
    pub fn serialize_attachment(&self, data: &D) -> Result<(), SessionError> {
        let blob = encode_attachment(data)?;
        self.channel.set_attachment(blob);
        Ok(())
    }

    /// Read the endpoint's attachment slot back into a value.
    ///
    /// Returns `None` when nothing was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored blob fails to decode.
    pub fn deserialize_attachment(&self) -> Result<Option<D>, SessionError> {
        match self.channel.attachment() {
            Some(blob) => Ok(Some(decode_attachment(&blob)?)),
            None => Ok(None),
        }
    }
}
