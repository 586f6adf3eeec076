//! Comm: one logical bidirectional channel multiplexed over a shared publisher.
//!
//! A comm is created either by local code as the [`Role::Primary`] side, which
//! announces itself to the peer with an open message, or in reaction to a
//! peer's open message as the [`Role::Secondary`] side. Inbound messages are
//! delivered to one callback per event kind. Dropping the last handle closes
//! the comm if it was not closed explicitly.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::TransportResult;
use crate::message::types::{CommContent, CommData, CommId, CommMsgType, DEFAULT_TARGET, Topic};
use crate::registry::CommRegistry;
use crate::transport::Publisher;

/// Handler for open, msg and close events; receives the message `data`.
pub type CommCallback = Arc<dyn Fn(&CommData) + Send + Sync>;

/// Wrap a closure as a registrable callback.
pub fn callback<F>(f: F) -> Option<CommCallback>
where
    F: Fn(&CommData) + Send + Sync + 'static,
{
    Some(Arc::new(f))
}

/// Which side of the open handshake this comm is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Initiated locally; publishes the open message on construction.
    #[default]
    Primary,
    /// Created for a peer's open message; delivers it to the open callback.
    Secondary,
}

#[derive(Clone, Default)]
struct Callbacks {
    open: Option<CommCallback>,
    msg: Option<CommCallback>,
    close: Option<CommCallback>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("open", &self.open.is_some())
            .field("msg", &self.msg.is_some())
            .field("close", &self.close.is_some())
            .finish()
    }
}

/// Construction parameters for a [`Comm`].
#[derive(Debug, Clone)]
pub struct CommConfig {
    pub comm_id: Option<CommId>,
    pub target: String,
    pub role: Role,
    pub open_data: CommData,
    pub close_data: CommData,
    callbacks: Callbacks,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            comm_id: None,
            target: DEFAULT_TARGET.to_string(),
            role: Role::Primary,
            open_data: CommData::new(),
            close_data: CommData::new(),
            callbacks: Callbacks::default(),
        }
    }
}

impl CommConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comm_id(mut self, comm_id: impl Into<CommId>) -> Self {
        self.comm_id = Some(comm_id.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_open_data(mut self, data: CommData) -> Self {
        self.open_data = data;
        self
    }

    pub fn with_close_data(mut self, data: CommData) -> Self {
        self.close_data = data;
        self
    }

    /// Install the open callback before construction, so a secondary comm
    /// sees its own open event.
    pub fn with_on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&CommData) + Send + Sync + 'static,
    {
        self.callbacks.open = callback(f);
        self
    }

    pub fn with_on_msg<F>(mut self, f: F) -> Self
    where
        F: Fn(&CommData) + Send + Sync + 'static,
    {
        self.callbacks.msg = callback(f);
        self
    }

    pub fn with_on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&CommData) + Send + Sync + 'static,
    {
        self.callbacks.close = callback(f);
        self
    }
}

#[derive(Debug)]
struct CommState {
    open_data: CommData,
    close_data: CommData,
    /// Outbound close published; never reset.
    closed: bool,
    callbacks: Callbacks,
}

/// A logical bidirectional channel identified by a [`CommId`].
///
/// Callbacks run without any internal lock held and may call back into the
/// comm. A callback that needs its own comm should capture a `Weak<Comm>`;
/// capturing an `Arc` keeps the comm alive until it is closed explicitly.
pub struct Comm {
    comm_id: CommId,
    target: String,
    topic: Topic,
    role: Role,
    publisher: Arc<dyn Publisher>,
    registry: Arc<CommRegistry>,
    state: Mutex<CommState>,
}

impl Comm {
    /// Create a comm, register it, and run its side of the open handshake.
    ///
    /// A primary comm publishes its open message; a failure to do so is
    /// returned and the comm is discarded without publishing a close.
    pub fn new(
        config: CommConfig,
        publisher: Arc<dyn Publisher>,
        registry: Arc<CommRegistry>,
    ) -> TransportResult<Arc<Self>> {
        let comm_id = config.comm_id.unwrap_or_default();
        let open_data = config.open_data.clone();

        let comm = Arc::new(Self {
            topic: comm_id.topic(),
            comm_id: comm_id.clone(),
            target: config.target,
            role: config.role,
            publisher,
            registry: registry.clone(),
            state: Mutex::new(CommState {
                open_data: config.open_data,
                close_data: config.close_data,
                closed: false,
                callbacks: config.callbacks,
            }),
        });

        registry.register(comm_id, &comm);

        match comm.role {
            Role::Primary => {
                if let Err(e) = comm.open(None) {
                    comm.state.lock().closed = true;
                    return Err(e);
                }
            }
            Role::Secondary => comm.handle_open(&open_data),
        }

        Ok(comm)
    }

    pub fn comm_id(&self) -> &CommId {
        &self.comm_id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn publish(&self, msg_type: CommMsgType, content: CommContent) -> TransportResult<()> {
        self.publisher.publish(msg_type, &self.topic, content)
    }

    /// Publish the open message; `None` sends the stored open data.
    pub fn open(&self, data: Option<CommData>) -> TransportResult<()> {
        let data = data.unwrap_or_else(|| self.state.lock().open_data.clone());
        let content = CommContent::new(self.comm_id.clone(), data).with_target(&self.target);
        self.publish(CommMsgType::Open, content)
    }

    /// Publish a data message; `None` sends an empty mapping.
    pub fn send(&self, data: Option<CommData>) -> TransportResult<()> {
        let content = CommContent::new(self.comm_id.clone(), data.unwrap_or_default());
        self.publish(CommMsgType::Msg, content)
    }

    /// Publish the close message once; later calls are no-ops.
    ///
    /// `None` sends the stored close data. The comm only counts as closed
    /// after the publish succeeds.
    pub fn close(&self, data: Option<CommData>) -> TransportResult<()> {
        // Held across publish so concurrent closes publish at most once.
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        if let Some(data) = data {
            state.close_data = data;
        }

        let content = CommContent::new(self.comm_id.clone(), state.close_data.clone());
        self.publish(CommMsgType::Close, content)?;
        state.closed = true;
        Ok(())
    }

    /// Record that the peer has torn this comm down, so dropping it stays quiet.
    pub(crate) fn mark_closed(&self) {
        self.state.lock().closed = true;
    }

    /// Replace the open callback; `None` disables it.
    pub fn on_open(&self, callback: Option<CommCallback>) {
        self.state.lock().callbacks.open = callback;
    }

    /// Replace the msg callback; `None` disables it.
    pub fn on_msg(&self, callback: Option<CommCallback>) {
        self.state.lock().callbacks.msg = callback;
    }

    /// Replace the close callback; `None` disables it.
    pub fn on_close(&self, callback: Option<CommCallback>) {
        self.state.lock().callbacks.close = callback;
    }

    pub fn handle_open(&self, data: &CommData) {
        debug!(comm_id = %self.comm_id, ?data, "handle_open");
        let callback = self.state.lock().callbacks.open.clone();
        if let Some(callback) = callback {
            callback(data);
        }
    }

    pub fn handle_msg(&self, data: &CommData) {
        debug!(comm_id = %self.comm_id, ?data, "handle_msg");
        let callback = self.state.lock().callbacks.msg.clone();
        if let Some(callback) = callback {
            callback(data);
        }
    }

    /// Deliver the peer's close. Does not close this side.
    pub fn handle_close(&self, data: &CommData) {
        debug!(comm_id = %self.comm_id, ?data, "handle_close");
        let callback = self.state.lock().callbacks.close.clone();
        if let Some(callback) = callback {
            callback(data);
        }
    }
}

impl Drop for Comm {
    fn drop(&mut self) {
        if let Err(e) = self.close(None) {
            warn!(comm_id = %self.comm_id, error = %e, "Failed to close comm on drop");
        }
        self.registry.unregister_dead(&self.comm_id);
    }
}

impl std::fmt::Debug for Comm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comm")
            .field("comm_id", &self.comm_id)
            .field("target", &self.target)
            .field("role", &self.role)
            .field("publisher", &self.publisher.name())
            .field("state", &*self.state.lock())
            .finish()
    }
}
