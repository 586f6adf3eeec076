//! Publisher doubles shared by unit tests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{TransportError, TransportResult};
use crate::message::types::{CommContent, CommMsgType, Topic};
use crate::transport::Publisher;

/// Records every publish; optionally fails them.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(CommMsgType, Topic, CommContent)>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.set_failing(true);
        publisher
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(CommMsgType, Topic, CommContent)> {
        self.published.lock().clone()
    }

    pub fn kinds(&self) -> Vec<CommMsgType> {
        self.published.lock().iter().map(|(ty, _, _)| *ty).collect()
    }

    /// Publish calls, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.published.lock().len()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(
        &self,
        msg_type: CommMsgType,
        topic: &Topic,
        content: CommContent,
    ) -> TransportResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed {
                attempts: 1,
                reason: "publisher offline".into(),
            });
        }
        self.published
            .lock()
            .push((msg_type, topic.clone(), content));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
