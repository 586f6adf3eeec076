//! Routes inbound comm messages and creates comms for the peer's open requests.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::codec::Codec;
use crate::comm::{Comm, CommConfig, Role};
use crate::error::{CommError, CommResult, TransportError, TransportResult};
use crate::message::CommMessage;
use crate::message::types::{CommContent, CommData, CommId, CommMsgType, DEFAULT_TARGET};
use crate::registry::CommRegistry;
use crate::transport::{FrameTransport, Publisher, Session};

/// Called with a freshly created secondary comm and the peer's open data.
pub type TargetHandler = Arc<dyn Fn(&Arc<Comm>, &CommData) + Send + Sync>;

/// Per-session dispatcher for comm messages.
///
/// Comms created here on behalf of the peer are owned by the manager until
/// the peer closes them, they are closed locally, or [`CommManager::release`]
/// is called.
pub struct CommManager {
    registry: Arc<CommRegistry>,
    publisher: Arc<dyn Publisher>,
    targets: RwLock<HashMap<String, TargetHandler>>,
    owned: Mutex<HashMap<CommId, Arc<Comm>>>,
}

impl CommManager {
    pub fn new(publisher: Arc<dyn Publisher>, registry: Arc<CommRegistry>) -> Self {
        Self {
            registry,
            publisher,
            targets: RwLock::new(HashMap::new()),
            owned: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<CommRegistry> {
        &self.registry
    }

    pub fn register_target<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Arc<Comm>, &CommData) + Send + Sync + 'static,
    {
        self.targets.write().insert(name.into(), Arc::new(handler));
    }

    pub fn unregister_target(&self, name: &str) -> bool {
        self.targets.write().remove(name).is_some()
    }

    /// Create a comm on this session. The caller owns the returned comm.
    pub fn new_comm(&self, config: CommConfig) -> TransportResult<Arc<Comm>> {
        Comm::new(config, self.publisher.clone(), self.registry.clone())
    }

    pub fn get_comm(&self, comm_id: &CommId) -> Option<Arc<Comm>> {
        self.registry.get(comm_id)
    }

    /// Stop owning a peer-created comm; it closes once the last handle drops.
    pub fn release(&self, comm_id: &CommId) -> Option<Arc<Comm>> {
        self.owned.lock().remove(comm_id)
    }

    /// Number of peer-created comms the manager still holds.
    pub fn owned_count(&self) -> usize {
        self.owned.lock().len()
    }

    /// Let go of peer-created comms that have been closed locally.
    fn release_closed(&self) {
        let released: Vec<Arc<Comm>> = {
            let mut owned = self.owned.lock();
            let closed: Vec<CommId> = owned
                .iter()
                .filter(|(_, comm)| comm.is_closed())
                .map(|(id, _)| id.clone())
                .collect();
            closed.iter().filter_map(|id| owned.remove(id)).collect()
        };
        for comm in &released {
            debug!(comm_id = %comm.comm_id(), "Released locally closed comm");
        }
    }

    /// Route one inbound message to its comm.
    pub fn dispatch(&self, message: CommMessage) -> CommResult<()> {
        self.release_closed();

        let CommContent {
            data,
            comm_id,
            target,
        } = message.content;

        match message.msg_type {
            CommMsgType::Open => match self.registry.get(&comm_id) {
                Some(comm) => {
                    comm.handle_open(&data);
                    Ok(())
                }
                None => self.open_secondary(comm_id, target, data),
            },
            CommMsgType::Msg => {
                let comm = self
                    .registry
                    .get(&comm_id)
                    .ok_or(CommError::UnknownComm(comm_id))?;
                comm.handle_msg(&data);
                Ok(())
            }
            CommMsgType::Close => {
                let comm = self
                    .registry
                    .get(&comm_id)
                    .ok_or_else(|| CommError::UnknownComm(comm_id.clone()))?;
                comm.handle_close(&data);
                drop(comm);
                self.registry.unregister(&comm_id);

                let owned = self.owned.lock().remove(&comm_id);
                // Only a comm nobody else holds is settled by the peer's close;
                // any other holder keeps its own close to make.
                if let Some(last) = owned.and_then(Arc::into_inner) {
                    last.mark_closed();
                }
                Ok(())
            }
        }
    }

    fn open_secondary(
        &self,
        comm_id: CommId,
        target: Option<String>,
        data: CommData,
    ) -> CommResult<()> {
        let target = target.unwrap_or_else(|| DEFAULT_TARGET.to_string());
        let handler = self.targets.read().get(&target).cloned();

        let config = CommConfig::new()
            .with_comm_id(comm_id.clone())
            .with_target(target.clone())
            .with_role(Role::Secondary)
            .with_open_data(data.clone());
        let comm = self.new_comm(config)?;

        match handler {
            Some(handler) => {
                debug!(%comm_id, %target, "Opened comm for peer");
                self.owned.lock().insert(comm_id, comm.clone());
                handler(&comm, &data);
                self.release_closed();
                Ok(())
            }
            None => {
                error!(%comm_id, %target, "No such comm target registered");
                if let Err(e) = comm.close(None) {
                    comm.mark_closed();
                    return Err(e.into());
                }
                Err(CommError::UnknownTarget(target))
            }
        }
    }

    /// Receive and dispatch messages until the session disconnects.
    pub async fn serve<F: FrameTransport, C: Codec>(
        &self,
        session: &Session<F, C>,
    ) -> TransportResult<()> {
        loop {
            match session.recv().await {
                Ok(message) => {
                    if let Err(e) = self.dispatch(message) {
                        warn!(error = %e, "Failed to dispatch comm message");
                    }
                }
                Err(TransportError::Timeout { .. }) => {
                    if !session.is_connected() {
                        return Ok(());
                    }
                }
                Err(e @ TransportError::Protocol(_))
                | Err(e @ TransportError::MessageTooLarge { .. }) => {
                    warn!(error = %e, "Dropping undecodable frame");
                }
                Err(TransportError::Closed | TransportError::ReceiveFailed { .. }) => {
                    debug!("Session disconnected, stopping comm dispatch");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for CommManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut targets: Vec<String> = self.targets.read().keys().cloned().collect();
        targets.sort();
        f.debug_struct("CommManager")
            .field("publisher", &self.publisher.name())
            .field("targets", &targets)
            .field("comms", &self.registry.len())
            .field("owned", &self.owned.lock().len())
            .finish()
    }
}
