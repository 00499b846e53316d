//! Server side of the election RPC (C5).

use crate::node_state::NodeState;
use crate::rpc::{RequestVoteRequest, RequestVoteResponse};
use crossbeam_channel::Sender;

pub fn handle_request_vote(
    node: &NodeState,
    timer_reset: &Sender<()>,
    request: RequestVoteRequest,
) -> RequestVoteResponse {
    let mut state = node.lock();
    let mut term = state.current_term;

    // Step 1: stale candidate.
    if request.term < term {
        tracing::debug!(request_term = request.term, term, "rejecting vote: stale term");
        return RequestVoteResponse { term, vote_granted: false };
    }

    // Step 2: adopt a newer term before continuing.
    if request.term > term {
        if let Err(err) = node.adopt_term_and_step_down(&mut state, request.term) {
            tracing::error!(%err, "failed to persist adopted term");
            return RequestVoteResponse { term, vote_granted: false };
        }
        term = request.term;
    }

    // Step 3: at most one vote per term.
    if let Some(ref voted_for) = state.voted_for {
        if voted_for != &request.candidate_id {
            tracing::debug!(candidate = %request.candidate_id, "rejecting vote: already voted this term");
            return RequestVoteResponse { term, vote_granted: false };
        }
    }

    // Step 4: log-up-to-date test.
    let log = node.log();
    let my_last_index = log.length();
    let my_last_term = if my_last_index > 0 { log.at(my_last_index).term } else { 0 };
    let candidate_up_to_date = request.last_log_term > my_last_term
        || (request.last_log_term == my_last_term && request.last_log_index >= my_last_index);

    if !candidate_up_to_date {
        tracing::debug!(candidate = %request.candidate_id, "rejecting vote: log not up to date");
        return RequestVoteResponse { term, vote_granted: false };
    }

    // Step 5: persist votedFor before replying, then reset the timer.
    if let Err(err) = node.persist_voted_for(Some(&request.candidate_id)) {
        tracing::error!(%err, "failed to persist votedFor");
        return RequestVoteResponse { term, vote_granted: false };
    }
    state.voted_for = Some(request.candidate_id.clone());
    let _ = timer_reset.try_send(());

    tracing::debug!(candidate = %request.candidate_id, term, "vote granted");
    RequestVoteResponse { term, vote_granted: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogEntry;
    use crate::store::InMemoryDataStore;
    use std::sync::Arc;

    fn fresh_node() -> NodeState {
        NodeState::load("n1".into(), Arc::new(InMemoryDataStore::new())).unwrap()
    }

    #[test]
    fn rejects_then_grants_across_a_vote_probe() {
        let node = fresh_node();
        node.log().set(1, LogEntry::new(1, "a".into(), "A".into())).unwrap();
        {
            let mut inner = node.lock();
            node.adopt_term_and_step_down(&mut inner, 1).unwrap();
        }
        let (tx, _rx) = crossbeam_channel::bounded(1);
        node.persist_voted_for(Some("1")).unwrap();
        node.lock().voted_for = Some("1".into());

        let r1 = handle_request_vote(&node, &tx, RequestVoteRequest {
            term: 0, candidate_id: "1".into(), last_log_index: 1, last_log_term: 0,
        });
        assert_eq!(r1, RequestVoteResponse { term: 1, vote_granted: false });

        let r2 = handle_request_vote(&node, &tx, RequestVoteRequest {
            term: 1, candidate_id: "2".into(), last_log_index: 1, last_log_term: 1,
        });
        assert_eq!(r2, RequestVoteResponse { term: 1, vote_granted: false });

        let r3 = handle_request_vote(&node, &tx, RequestVoteRequest {
            term: 1, candidate_id: "1".into(), last_log_index: 0, last_log_term: 0,
        });
        assert_eq!(r3, RequestVoteResponse { term: 1, vote_granted: false });

        // A candidate reporting a last-log-term higher than ours has seen
        // a later leader, so it counts as at least as up to date as we
        // are and the vote is granted, not rejected.
        let r4 = handle_request_vote(&node, &tx, RequestVoteRequest {
            term: 1, candidate_id: "1".into(), last_log_index: 1, last_log_term: 2,
        });
        assert_eq!(r4, RequestVoteResponse { term: 1, vote_granted: true });

        let r5 = handle_request_vote(&node, &tx, RequestVoteRequest {
            term: 1, candidate_id: "1".into(), last_log_index: 1, last_log_term: 1,
        });
        assert_eq!(r5, RequestVoteResponse { term: 1, vote_granted: true });
    }

    #[test]
    fn grants_at_most_one_vote_per_term() {
        let node = fresh_node();
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let first = handle_request_vote(&node, &tx, RequestVoteRequest {
            term: 1, candidate_id: "a".into(), last_log_index: 0, last_log_term: 0,
        });
        assert!(first.vote_granted);

        let second = handle_request_vote(&node, &tx, RequestVoteRequest {
            term: 1, candidate_id: "b".into(), last_log_index: 0, last_log_term: 0,
        });
        assert!(!second.vote_granted);
    }
}
