//! Directory of live comms, keyed by comm id.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::comm::Comm;
use crate::message::types::CommId;

/// Routes comm ids to live [`Comm`] instances.
///
/// Holds weak references only: a registered comm stays owned by whoever
/// created it, and dead entries behave as absent.
#[derive(Debug, Default)]
pub struct CommRegistry {
    comms: RwLock<HashMap<CommId, Weak<Comm>>>,
}

impl CommRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert `comm` under `comm_id`, replacing any previous entry.
    pub fn register(&self, comm_id: CommId, comm: &Arc<Comm>) {
        self.comms.write().insert(comm_id, Arc::downgrade(comm));
    }

    pub fn get(&self, comm_id: &CommId) -> Option<Arc<Comm>> {
        self.comms.read().get(comm_id).and_then(Weak::upgrade)
    }

    pub fn contains(&self, comm_id: &CommId) -> bool {
        self.get(comm_id).is_some()
    }

    pub fn unregister(&self, comm_id: &CommId) -> Option<Arc<Comm>> {
        self.comms
            .write()
            .remove(comm_id)
            .and_then(|weak| weak.upgrade())
    }

    /// Remove only if the entry still refers to a dead comm.
    pub(crate) fn unregister_dead(&self, comm_id: &CommId) {
        let mut comms = self.comms.write();
        if comms
            .get(comm_id)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            comms.remove(comm_id);
        }
    }

    /// Drop entries whose comm no longer exists; returns how many were removed.
    pub fn purge(&self) -> usize {
        let mut comms = self.comms.write();
        let before = comms.len();
        comms.retain(|_, weak| weak.strong_count() > 0);
        before - comms.len()
    }

    pub fn ids(&self) -> Vec<CommId> {
        self.comms
            .read()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.comms
            .read()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{CommConfig, Role};
    use crate::testing::RecordingPublisher;

    fn secondary(registry: &Arc<CommRegistry>, id: &str) -> Arc<Comm> {
        let publisher = Arc::new(RecordingPublisher::default());
        let config = CommConfig::new()
            .with_comm_id(id)
            .with_role(Role::Secondary);
        Comm::new(config, publisher, registry.clone()).unwrap()
    }

    #[test]
    fn test_comm_registers_itself() {
        let registry = CommRegistry::new();
        let comm = secondary(&registry, "c1");

        let found = registry.get(&CommId::from("c1")).unwrap();
        assert!(Arc::ptr_eq(&found, &comm));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ids(), vec![CommId::from("c1")]);
    }

    #[test]
    fn test_registry_does_not_own_comms() {
        let registry = CommRegistry::new();
        let comm = secondary(&registry, "c1");
        assert!(registry.contains(&CommId::from("c1")));

        drop(comm);
        assert!(!registry.contains(&CommId::from("c1")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_and_purge() {
        let registry = CommRegistry::new();
        let keep = secondary(&registry, "keep");
        let gone = secondary(&registry, "gone");

        let removed = registry.unregister(&CommId::from("gone")).unwrap();
        assert!(Arc::ptr_eq(&removed, &gone));
        assert!(!registry.contains(&CommId::from("gone")));

        // Dropped comms clean up after themselves, so nothing is stale.
        drop(keep);
        assert_eq!(registry.purge(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_secondary_is_registered_before_open_callback() {
        let registry = CommRegistry::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let lookup = registry.clone();
        let config = CommConfig::new()
            .with_comm_id("early")
            .with_role(Role::Secondary)
            .with_on_open(move |_| {
                sink.lock().push(lookup.contains(&CommId::from("early")));
            });

        let publisher = Arc::new(RecordingPublisher::default());
        let _comm = Comm::new(config, publisher, registry.clone()).unwrap();

        assert_eq!(*seen.lock(), vec![true]);
    }

    #[test]
    fn test_unregister_dead_keeps_live_replacement() {
        let registry = CommRegistry::new();
        let first = secondary(&registry, "dup");
        let second = secondary(&registry, "dup");

        // The stale comm must not evict the live entry that replaced it.
        drop(first);
        let found = registry.get(&CommId::from("dup")).unwrap();
        assert!(Arc::ptr_eq(&found, &second));
    }
}
