use async_trait::async_trait;
use bytes::Bytes;
use crossbeam::channel::{Receiver, Sender, TrySendError, after, bounded, never, select};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{TransportError, TransportResult};
use crate::transport::{FrameTransport, TransportStats};

pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Configuration for in-process channel frame transport.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub buffer_size: usize,
    pub read_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            read_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn without_read_timeout(mut self) -> Self {
        self.read_timeout = None;
        self
    }
}

/// In-process frame transport using crossbeam channels.
///
/// Closing one side drops its sender, so the peer observes a disconnect, and
/// wakes any pending local receive with [`TransportError::Closed`].
pub struct ChannelFrameTransport {
    sender: Mutex<Option<Sender<Bytes>>>,
    receiver: Receiver<Bytes>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    config: ChannelConfig,
    stats: Arc<Mutex<TransportStats>>,
    name: String,
}

impl ChannelFrameTransport {
    /// Create a pair of connected transports.
    pub fn create_pair(
        name: impl Into<String>,
        config: ChannelConfig,
    ) -> TransportResult<(Self, Self)> {
        let name = name.into();
        let capacity = (config.buffer_size / 1024).max(16);

        let (tx1, rx1) = bounded(capacity);
        let (tx2, rx2) = bounded(capacity);
        let (shutdown_tx1, shutdown_rx1) = bounded(0);
        let (shutdown_tx2, shutdown_rx2) = bounded(0);

        let transport1 = Self {
            sender: Mutex::new(Some(tx1)),
            receiver: rx2,
            shutdown_tx: Mutex::new(Some(shutdown_tx1)),
            shutdown_rx: shutdown_rx1,
            config: config.clone(),
            stats: Arc::new(Mutex::new(TransportStats::default())),
            name: format!("{}-kernel", name),
        };

        let transport2 = Self {
            sender: Mutex::new(Some(tx2)),
            receiver: rx1,
            shutdown_tx: Mutex::new(Some(shutdown_tx2)),
            shutdown_rx: shutdown_rx2,
            config,
            stats: Arc::new(Mutex::new(TransportStats::default())),
            name: format!("{}-frontend", name),
        };

        Ok((transport1, transport2))
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> TransportResult<Option<Bytes>> {
        match self.receiver.try_recv() {
            Ok(bytes) => {
                self.record_received(&bytes);
                Ok(Some(bytes))
            }
            Err(crossbeam::channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam::channel::TryRecvError::Disconnected) => {
                Err(TransportError::ReceiveFailed {
                    attempts: 1,
                    reason: "Channel closed".into(),
                })
            }
        }
    }

    fn record_received(&self, bytes: &Bytes) {
        let mut stats = self.stats.lock();
        stats.messages_received += 1;
        stats.bytes_received += bytes.len() as u64;
    }
}

#[async_trait]
impl FrameTransport for ChannelFrameTransport {
    fn send_frame(&self, data: &[u8]) -> TransportResult<()> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(TransportError::Closed)?;

        let result = sender
            .try_send(Bytes::copy_from_slice(data))
            .map_err(|e| TransportError::SendFailed {
                attempts: 1,
                reason: match e {
                    TrySendError::Full(_) => "Channel full".into(),
                    TrySendError::Disconnected(_) => "Channel closed".into(),
                },
            });

        let mut stats = self.stats.lock();
        match result {
            Ok(()) => {
                stats.messages_sent += 1;
                stats.bytes_sent += data.len() as u64;
            }
            Err(_) => stats.send_errors += 1,
        }

        result
    }

    async fn recv_frame(&self) -> TransportResult<Bytes> {
        let receiver = self.receiver.clone();
        let shutdown = self.shutdown_rx.clone();
        let timeout = self.config.read_timeout;

        let result = tokio::task::spawn_blocking(move || {
            let deadline = timeout.map(after).unwrap_or_else(never);
            select! {
                recv(receiver) -> frame => frame.map_err(|_| TransportError::ReceiveFailed {
                    attempts: 1,
                    reason: "Channel closed".into(),
                }),
                // Never carries a value; ready once close() drops the sender.
                recv(shutdown) -> _ => Err(TransportError::Closed),
                recv(deadline) -> _ => Err(TransportError::Timeout {
                    duration_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
                    operation: "receive".into(),
                }),
            }
        })
        .await
        .map_err(|e| TransportError::ReceiveFailed {
            attempts: 1,
            reason: e.to_string(),
        })?;

        match &result {
            Ok(bytes) => self.record_received(bytes),
            Err(TransportError::Timeout { .. } | TransportError::Closed) => {}
            Err(_) => self.stats.lock().recv_errors += 1,
        }

        result
    }

    fn is_connected(&self) -> bool {
        self.sender.lock().is_some()
    }

    async fn close(&self) -> TransportResult<()> {
        self.sender.lock().take();
        self.shutdown_tx.lock().take();
        Ok(())
    }

    fn stats(&self) -> Option<TransportStats> {
        Some(self.stats.lock().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ChannelFrameTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFrameTransport")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_send_recv() {
        let config = ChannelConfig::default();
        let (t1, t2) = ChannelFrameTransport::create_pair("test", config).unwrap();

        let data = b"Test message";
        t1.send_frame(data).unwrap();

        let received = t2.recv_frame().await.unwrap();
        assert_eq!(received.as_ref(), data);
    }

    #[tokio::test]
    async fn test_transport_bidirectional() {
        let config = ChannelConfig::default();
        let (t1, t2) = ChannelFrameTransport::create_pair("test", config).unwrap();

        t1.send_frame(b"Hello from kernel").unwrap();
        let msg = t2.recv_frame().await.unwrap();
        assert_eq!(msg.as_ref(), b"Hello from kernel");

        t2.send_frame(b"Hello from frontend").unwrap();
        let msg = t1.recv_frame().await.unwrap();
        assert_eq!(msg.as_ref(), b"Hello from frontend");
    }

    #[tokio::test]
    async fn test_transport_stats() {
        let config = ChannelConfig::default();
        let (t1, t2) = ChannelFrameTransport::create_pair("test", config).unwrap();

        t1.send_frame(b"test").unwrap();
        t2.recv_frame().await.unwrap();

        let stats1 = t1.stats().unwrap();
        assert_eq!(stats1.messages_sent, 1);
        assert_eq!(stats1.bytes_sent, 4);

        let stats2 = t2.stats().unwrap();
        assert_eq!(stats2.messages_received, 1);
        assert_eq!(stats2.bytes_received, 4);
    }

    #[tokio::test]
    async fn test_recv_times_out() {
        let config = ChannelConfig::default().with_read_timeout(Duration::from_millis(20));
        let (_t1, t2) = ChannelFrameTransport::create_pair("test", config).unwrap();

        let err = t2.recv_frame().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_close_disconnects_peer() {
        let config = ChannelConfig::default();
        let (t1, t2) = ChannelFrameTransport::create_pair("test", config).unwrap();

        t1.close().await.unwrap();
        assert!(!t1.is_connected());
        assert!(matches!(t1.send_frame(b"late"), Err(TransportError::Closed)));

        let err = t2.recv_frame().await.unwrap_err();
        assert!(matches!(err, TransportError::ReceiveFailed { .. }));
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receive() {
        let config = ChannelConfig::default().without_read_timeout();
        let (_t1, t2) = ChannelFrameTransport::create_pair("test", config).unwrap();
        let t2 = Arc::new(t2);

        let pending = {
            let t2 = t2.clone();
            tokio::spawn(async move { t2.recv_frame().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        t2.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("receive stayed parked after close")
            .unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
        assert_eq!(t2.stats().unwrap().recv_errors, 0);
    }

    #[test]
    fn test_full_buffer_fails_without_blocking() {
        let config = ChannelConfig::default().with_buffer_size(0);
        let (t1, _t2) = ChannelFrameTransport::create_pair("test", config).unwrap();

        for _ in 0..16 {
            t1.send_frame(b"x").unwrap();
        }
        let err = t1.send_frame(b"x").unwrap_err();
        assert!(matches!(err, TransportError::SendFailed { .. }));
        assert_eq!(t1.stats().unwrap().send_errors, 1);
    }

    #[test]
    fn test_try_recv() {
        let config = ChannelConfig::default();
        let (t1, t2) = ChannelFrameTransport::create_pair("test", config).unwrap();

        assert!(t2.try_recv().unwrap().is_none());

        t1.send_frame(b"test").unwrap();

        let msg = t2.try_recv().unwrap();
        assert_eq!(msg.unwrap().as_ref(), b"test");

        assert!(t2.try_recv().unwrap().is_none());
    }
}
