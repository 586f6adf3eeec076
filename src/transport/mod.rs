use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::TransportResult;
use crate::message::types::{CommContent, CommMsgType, Topic};

pub mod channel;
pub mod session;

pub use session::Session;

/// Publishes addressed comm messages to the peer.
///
/// Publishing never blocks; a failure is reported synchronously.
pub trait Publisher: Send + Sync + Debug {
    /// Publish one message of `msg_type` addressed to `topic`.
    fn publish(
        &self,
        msg_type: CommMsgType,
        topic: &Topic,
        content: CommContent,
    ) -> TransportResult<()>;

    /// Get publisher name/identifier
    fn name(&self) -> &str {
        "unknown"
    }
}

impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    fn publish(
        &self,
        msg_type: CommMsgType,
        topic: &Topic,
        content: CommContent,
    ) -> TransportResult<()> {
        (**self).publish(msg_type, topic, content)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Publisher + ?Sized> Publisher for Box<T> {
    fn publish(
        &self,
        msg_type: CommMsgType,
        topic: &Topic,
        content: CommContent,
    ) -> TransportResult<()> {
        (**self).publish(msg_type, topic, content)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Byte-frame transport shared by all comms of a session.
#[async_trait]
pub trait FrameTransport: Send + Sync + Debug {
    /// Queue a frame for the peer without blocking
    fn send_frame(&self, data: &[u8]) -> TransportResult<()>;

    /// Receive the next frame from the peer
    async fn recv_frame(&self) -> TransportResult<Bytes>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// Close the transport
    async fn close(&self) -> TransportResult<()>;

    /// Get transport statistics
    fn stats(&self) -> Option<TransportStats> {
        None
    }

    /// Get transport name/identifier
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Statistics collected by transport implementations
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_errors: u64,
    pub recv_errors: u64,
}

impl std::fmt::Display for TransportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Transport Statistics:")?;
        writeln!(f, "  Messages sent:     {}", self.messages_sent)?;
        writeln!(f, "  Messages received: {}", self.messages_received)?;
        writeln!(f, "  Bytes sent:        {}", self.bytes_sent)?;
        writeln!(f, "  Bytes received:    {}", self.bytes_received)?;
        writeln!(f, "  Send errors:       {}", self.send_errors)?;
        writeln!(f, "  Receive errors:    {}", self.recv_errors)?;
        Ok(())
    }
}

#[async_trait]
impl<T: FrameTransport + ?Sized> FrameTransport for Arc<T> {
    fn send_frame(&self, data: &[u8]) -> TransportResult<()> {
        (**self).send_frame(data)
    }

    async fn recv_frame(&self) -> TransportResult<Bytes> {
        (**self).recv_frame().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn close(&self) -> TransportResult<()> {
        (**self).close().await
    }

    fn stats(&self) -> Option<TransportStats> {
        (**self).stats()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T: FrameTransport + ?Sized> FrameTransport for Box<T> {
    fn send_frame(&self, data: &[u8]) -> TransportResult<()> {
        (**self).send_frame(data)
    }

    async fn recv_frame(&self) -> TransportResult<Bytes> {
        (**self).recv_frame().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn close(&self) -> TransportResult<()> {
        (**self).close().await
    }

    fn stats(&self) -> Option<TransportStats> {
        (**self).stats()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
