//! Server side of the log-replication RPC (C4).

use crate::node_state::{NodeState, Role};
use crate::log::LogEntry;
use crate::rpc::{AppendEntriesRequest, AppendEntriesResponse};
use crossbeam_channel::Sender;

/// Runs the ten-step algorithm against `node`, unconditionally posting
/// a timer-reset token first.
pub fn handle_append_entries(
    node: &NodeState,
    timer_reset: &Sender<()>,
    request: AppendEntriesRequest,
) -> AppendEntriesResponse {
    // Step 1: signal the election timer before any validation.
    let _ = timer_reset.try_send(());

    // Step 2: empty entries is a pure heartbeat, answered without
    // touching term state, matching the algorithm's literal ordering.
    if request.entries.is_empty() {
        let term = node.current_term();
        tracing::trace!(term, leader = %request.leader_id, "heartbeat accepted");
        return AppendEntriesResponse { term, success: true };
    }

    let mut state = node.lock();
    let mut term = state.current_term;

    // Step 3: stale leader.
    if request.term < term {
        tracing::debug!(request_term = request.term, term, "rejecting stale append_entries");
        return AppendEntriesResponse { term, success: false };
    }

    // Step 4: adopt a newer term before continuing.
    if request.term > term {
        if let Err(err) = node.adopt_term_and_step_down(&mut state, request.term) {
            tracing::error!(%err, "failed to persist adopted term");
            return AppendEntriesResponse { term, success: false };
        }
        term = request.term;
    }

    let log = node.log();

    // Step 5: log-consistency check.
    if request.prev_log_index > log.length() {
        tracing::debug!(prev_log_index = request.prev_log_index, length = log.length(), "rejecting: prev_log_index beyond log");
        return AppendEntriesResponse { term, success: false };
    }
    if request.prev_log_index > 0 && log.at(request.prev_log_index).term != request.prev_log_term {
        tracing::debug!(prev_log_index = request.prev_log_index, "rejecting: prev_log_term mismatch");
        return AppendEntriesResponse { term, success: false };
    }

    // Step 6: write each new entry, skipping ones already present with
    // a matching term (idempotence).
    for (offset, entry) in request.entries.iter().enumerate() {
        let index = request.prev_log_index + offset as u64 + 1;
        let needs_write = log.length() < index || log.at(index).term != term;
        if needs_write {
            let to_persist = LogEntry::new(term, entry.key.clone(), entry.value.clone());
            if let Err(err) = log.set(index, to_persist) {
                tracing::error!(%err, index, "failed to persist log entry, aborting append");
                return AppendEntriesResponse { term, success: false };
            }
        }
    }

    // Step 7: drop anything the leader didn't send.
    let last_new_index = request.prev_log_index + request.entries.len() as u64;
    if log.length() > last_new_index {
        if let Err(err) = log.truncate_from(last_new_index + 1) {
            tracing::error!(%err, "failed to truncate stale tail");
            return AppendEntriesResponse { term, success: false };
        }
    }

    // Step 8.
    state.leader_id = Some(request.leader_id.clone());

    // Step 9: Raft-paper-correct commit advance, not the source's
    // `log.length - 1` clamp.
    if request.leader_commit > state.commit_index {
        state.commit_index = request.leader_commit.min(last_new_index);
    }

    if state.role != Role::Follower {
        state.role = Role::Follower;
    }

    tracing::debug!(term, last_new_index, commit_index = state.commit_index, "append_entries accepted");
    AppendEntriesResponse { term, success: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_state::NodeState;
    use crate::store::InMemoryDataStore;
    use std::sync::Arc;

    fn fresh_node() -> NodeState {
        NodeState::load("n1".into(), Arc::new(InMemoryDataStore::new())).unwrap()
    }

    fn entry(key: &str, value: &str) -> LogEntry {
        LogEntry::new(0, key.into(), value.into())
    }

    #[test]
    fn heartbeat_succeeds_and_resets_timer() {
        let node = fresh_node();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let response = handle_append_entries(
            &node,
            &tx,
            AppendEntriesRequest {
                term: 0,
                leader_id: "leader".into(),
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![],
                leader_commit: 0,
            },
        );
        assert_eq!(response.term, 0);
        assert!(response.success);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn stale_term_is_rejected_without_mutating_log() {
        let node = fresh_node();
        {
            let mut inner = node.lock();
            node.adopt_term_and_step_down(&mut inner, 1).unwrap();
        }
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let response = handle_append_entries(
            &node,
            &tx,
            AppendEntriesRequest {
                term: 0,
                leader_id: "leader".into(),
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![entry("a", "A")],
                leader_commit: 0,
            },
        );
        assert_eq!(response, AppendEntriesResponse { term: 1, success: false });
        assert_eq!(node.log().length(), 0);
    }

    #[test]
    fn log_mismatch_is_rejected() {
        let node = fresh_node();
        node.log().set(1, LogEntry::new(1, "a".into(), "A".into())).unwrap();
        {
            let mut inner = node.lock();
            node.adopt_term_and_step_down(&mut inner, 1).unwrap();
        }
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let response = handle_append_entries(
            &node,
            &tx,
            AppendEntriesRequest {
                term: 1,
                leader_id: "leader".into(),
                prev_log_index: 1,
                prev_log_term: 0,
                entries: vec![entry("b", "B")],
                leader_commit: 0,
            },
        );
        assert_eq!(response, AppendEntriesResponse { term: 1, success: false });
        assert_eq!(node.log().length(), 1);
        assert_eq!(node.log().at(1).key, "a");
    }

    #[test]
    fn commit_index_advances_to_min_of_leader_commit_and_last_new_index() {
        let node = fresh_node();
        node.log().set(1, LogEntry::new(0, "a".into(), "A".into())).unwrap();
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let response = handle_append_entries(
            &node,
            &tx,
            AppendEntriesRequest {
                term: 1,
                leader_id: "leader".into(),
                prev_log_index: 1,
                prev_log_term: 0,
                entries: vec![entry("b", "B")],
                leader_commit: 2,
            },
        );
        assert_eq!(response, AppendEntriesResponse { term: 1, success: true });
        assert_eq!(node.log().at(2).key, "b");
        assert_eq!(node.log().at(2).term, 1);
        assert_eq!(node.commit_index(), 2);
    }

    #[test]
    fn overlapping_entries_of_same_term_are_not_rewritten() {
        let node = fresh_node();
        {
            let mut inner = node.lock();
            node.adopt_term_and_step_down(&mut inner, 1).unwrap();
        }
        node.log().set(1, LogEntry::new(1, "a".into(), "A".into())).unwrap();
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let response = handle_append_entries(
            &node,
            &tx,
            AppendEntriesRequest {
                term: 1,
                leader_id: "leader".into(),
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![entry("a", "A")],
                leader_commit: 0,
            },
        );
        assert!(response.success);
        assert_eq!(node.log().length(), 1);
    }
}
