//! Session: comm messages over a frame transport.

use crate::codec::{Codec, JsonCodec};
use crate::error::TransportResult;
use crate::message::CommMessage;
use crate::message::types::{CommContent, CommMsgType, Topic};
use crate::transport::{FrameTransport, Publisher, TransportStats};

/// Binds a frame transport to a codec and speaks [`CommMessage`] frames.
///
/// A session is the [`Publisher`] handed to every comm on the connection and
/// the source the manager's receive loop reads from.
#[derive(Debug)]
pub struct Session<F: FrameTransport, C: Codec = JsonCodec> {
    inner: F,
    codec: C,
}

impl<F: FrameTransport> Session<F, JsonCodec> {
    /// Create a new session with the default JSON codec.
    pub fn new(transport: F) -> Self {
        Self {
            inner: transport,
            codec: JsonCodec,
        }
    }
}

impl<F: FrameTransport, C: Codec> Session<F, C> {
    /// Create a new session with a specific codec.
    pub fn with_codec(transport: F, codec: C) -> Self {
        Self {
            inner: transport,
            codec,
        }
    }

    /// Encode and send one message.
    pub fn send(&self, message: &CommMessage) -> TransportResult<()> {
        let bytes = message.encode(&self.codec)?;
        self.inner.send_frame(&bytes)
    }

    /// Receive and decode the next message.
    pub async fn recv(&self) -> TransportResult<CommMessage> {
        let bytes = self.inner.recv_frame().await?;
        CommMessage::decode(bytes, &self.codec)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub async fn close(&self) -> TransportResult<()> {
        self.inner.close().await
    }

    pub fn stats(&self) -> Option<TransportStats> {
        self.inner.stats()
    }

    /// Get a reference to the inner transport.
    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: FrameTransport, C: Codec> Publisher for Session<F, C> {
    fn publish(
        &self,
        msg_type: CommMsgType,
        topic: &Topic,
        content: CommContent,
    ) -> TransportResult<()> {
        self.send(&CommMessage::new(msg_type, topic.clone(), content))
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
