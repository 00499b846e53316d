//! Background task that advances `lastApplied` toward `commitIndex`,
//! applying each committed entry's command to the storage state
//! machine in strictly ascending order (C7).

use crate::error::fatal;
use crate::node_state::NodeState;
use crate::store::DataStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often the applier polls for commit advances. The design doesn't
/// name a specific value for this; it only requires that applying
/// happens "whenever lastApplied < commitIndex", so a short poll
/// interval is an implementation detail, not a protocol parameter.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct Applier {
    node: Arc<NodeState>,
    storage: Arc<dyn DataStore>,
    shutdown: Arc<AtomicBool>,
}

impl Applier {
    pub fn new(node: Arc<NodeState>, storage: Arc<dyn DataStore>, shutdown: Arc<AtomicBool>) -> Self {
        Self { node, storage, shutdown }
    }

    pub fn run(&self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.apply_ready_entries();
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn apply_ready_entries(&self) {
        loop {
            let next_index = {
                let mut state = self.node.lock();
                if state.last_applied >= state.commit_index {
                    return;
                }
                state.last_applied += 1;
                state.last_applied
            };

            let entry = self.node.log().at(next_index);
            if let Err(err) = self.storage.put(&entry.key, &entry.value) {
                fatal(format!(
                    "applier failed to apply committed entry at index {next_index}: {err}"
                ));
            }
            tracing::trace!(index = next_index, key = %entry.key, "applied committed entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogEntry;
    use crate::store::InMemoryDataStore;

    #[test]
    fn applier_advances_last_applied_in_order() {
        let node_store: Arc<dyn DataStore> = Arc::new(InMemoryDataStore::new());
        let node = Arc::new(NodeState::load("n1".into(), node_store).unwrap());
        for i in 1..=3u64 {
            node.log().set(i, LogEntry::new(1, i.to_string(), (i * 10).to_string())).unwrap();
        }
        node.lock().commit_index = 3;

        let storage = Arc::new(InMemoryDataStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let applier = Applier::new(node.clone(), storage.clone(), shutdown);
        applier.apply_ready_entries();

        assert_eq!(node.last_applied(), 3);
        assert_eq!(storage.get("1").unwrap(), Some("10".to_string()));
        assert_eq!(storage.get("2").unwrap(), Some("20".to_string()));
        assert_eq!(storage.get("3").unwrap(), Some("30".to_string()));
    }

    #[test]
    fn applier_does_nothing_when_caught_up() {
        let node_store: Arc<dyn DataStore> = Arc::new(InMemoryDataStore::new());
        let node = Arc::new(NodeState::load("n1".into(), node_store).unwrap());
        let storage = Arc::new(InMemoryDataStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let applier = Applier::new(node.clone(), storage, shutdown);
        applier.apply_ready_entries();
        assert_eq!(node.last_applied(), 0);
    }
}
