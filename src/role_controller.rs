//! State machine over {Follower, Candidate, Leader} (C6). Runs as an
//! independent thread, driving elections on timeout and, while leader,
//! replicating the log to every peer through the injected `PeerClient`.

use crate::error::fatal;
use crate::node_state::{Inner, NodeState, Role};
use crate::rpc::{AppendEntriesRequest, AppendEntriesResponse, PeerClient, RequestVoteRequest};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct ElectionConfig {
    pub election_timeout: Duration,
    pub election_timeout_jitter: Duration,
    pub leader_heartbeat_period: Duration,
    pub outbound_rpc_timeout: Duration,
}

pub struct RoleController {
    id: String,
    node: Arc<NodeState>,
    peers: Vec<String>,
    peer_client: Arc<dyn PeerClient>,
    config: ElectionConfig,
    timer_reset_rx: Receiver<()>,
    shutdown: Arc<AtomicBool>,
}

impl RoleController {
    /// Returns the controller plus the `Sender` half of its timer-reset
    /// channel; that sender is handed to the RPC handlers so accepted
    /// inbound messages can keep this node from starting an election.
    pub fn new(
        id: String,
        node: Arc<NodeState>,
        peers: Vec<String>,
        peer_client: Arc<dyn PeerClient>,
        config: ElectionConfig,
        shutdown: Arc<AtomicBool>,
    ) -> (Self, Sender<()>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (
            Self { id, node, peers, peer_client, config, timer_reset_rx: rx, shutdown },
            tx,
        )
    }

    pub fn run(&self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.node.role() {
                Role::Follower => self.run_follower(),
                Role::Candidate => self.run_candidate(),
                Role::Leader => self.run_leader(),
            }
        }
    }

    fn random_timeout(&self) -> Duration {
        let avg = self.config.election_timeout.as_millis() as i64;
        let jitter = self.config.election_timeout_jitter.as_millis() as i64;
        let delta = if jitter > 0 {
            rand::rng().random_range(-jitter..jitter)
        } else {
            0
        };
        Duration::from_millis((avg + delta).max(0) as u64)
    }

    fn run_follower(&self) {
        match self.timer_reset_rx.recv_timeout(self.random_timeout()) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => {
                let mut state = self.node.lock();
                if state.role == Role::Follower {
                    state.role = Role::Candidate;
                }
            }
            Err(RecvTimeoutError::Disconnected) => self.shutdown.store(true, Ordering::Relaxed),
        }
    }

    fn run_candidate(&self) {
        let (term, last_log_index, last_log_term) = {
            let mut state = self.node.lock();
            state.current_term += 1;
            let term = state.current_term;
            if let Err(err) = self.node.persist_current_term(term) {
                fatal(format!("cannot persist currentTerm during election: {err}"));
            }
            state.voted_for = Some(self.id.clone());
            if let Err(err) = self.node.persist_voted_for(Some(&self.id)) {
                fatal(format!("cannot persist votedFor during election: {err}"));
            }
            state.role = Role::Candidate;
            let log = self.node.log();
            let last_log_index = log.length();
            let last_log_term = if last_log_index > 0 { log.at(last_log_index).term } else { 0 };
            (term, last_log_index, last_log_term)
        };

        // Drain any stale reset token accumulated before this election began.
        while self.timer_reset_rx.try_recv().is_ok() {}

        tracing::info!(term, "starting election");
        let deadline = Instant::now() + self.random_timeout();

        let mut votes = 1usize; // self
        let total_members = self.peers.len() + 1;
        let majority = total_members / 2 + 1;

        let handles: Vec<_> = self
            .peers
            .iter()
            .map(|peer| {
                let peer_client = self.peer_client.clone();
                let peer = peer.clone();
                let request = RequestVoteRequest {
                    term,
                    candidate_id: self.id.clone(),
                    last_log_index,
                    last_log_term,
                };
                let timeout = self.config.outbound_rpc_timeout;
                std::thread::spawn(move || peer_client.request_vote(&peer, request, timeout))
            })
            .collect();

        for handle in handles {
            let Ok(Some(response)) = handle.join() else { continue };
            if response.term > term {
                let mut state = self.node.lock();
                if response.term > state.current_term {
                    if let Err(err) = self.node.adopt_term_and_step_down(&mut state, response.term) {
                        fatal(format!("cannot persist adopted term: {err}"));
                    }
                }
                return;
            }
            if response.vote_granted {
                votes += 1;
            }
        }

        if self.node.role() != Role::Candidate {
            // A concurrent handler already stepped us down to Follower.
            return;
        }

        if votes >= majority {
            self.become_leader(term);
            return;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.timer_reset_rx.recv_timeout(remaining) {
            Err(RecvTimeoutError::Disconnected) => self.shutdown.store(true, Ordering::Relaxed),
            _ => {}
        }
        // Either the timer expired or a reset arrived mid-election; the
        // outer `run` loop re-enters `run_candidate` and bumps the term
        // again unless a handler already moved us to Follower.
    }

    fn become_leader(&self, term: u64) {
        {
            let mut state = self.node.lock();
            if state.current_term != term || state.role != Role::Candidate {
                return;
            }
            state.role = Role::Leader;
            state.leader_id = Some(self.id.clone());
            let next = self.node.log().length() + 1;
            state.next_index.clear();
            state.match_index.clear();
            for peer in &self.peers {
                state.next_index.insert(peer.clone(), next);
                state.match_index.insert(peer.clone(), 0);
            }
        }
        tracing::info!(term, "became leader");
        self.replicate_round();
    }

    fn run_leader(&self) {
        // A leader does not meaningfully reset its own heartbeat clock;
        // it simply sends a round every `leader_heartbeat_period`.
        match self.timer_reset_rx.recv_timeout(self.config.leader_heartbeat_period) {
            Err(RecvTimeoutError::Disconnected) => {
                self.shutdown.store(true, Ordering::Relaxed);
                return;
            }
            _ => {}
        }
        if self.node.role() != Role::Leader {
            return;
        }
        self.replicate_round();
    }

    fn replicate_round(&self) {
        let term = self.node.current_term();
        let commit_index = self.node.commit_index();

        for peer in self.peers.clone() {
            if self.node.role() != Role::Leader {
                return;
            }

            let (prev_log_index, prev_log_term, entries) = {
                let state = self.node.lock();
                let next_index = *state.next_index.get(&peer).unwrap_or(&1);
                let prev_log_index = next_index.saturating_sub(1);
                let log = self.node.log();
                let prev_log_term = if prev_log_index > 0 { log.at(prev_log_index).term } else { 0 };
                let entries = (next_index..=log.length()).map(|i| log.at(i)).collect::<Vec<_>>();
                (prev_log_index, prev_log_term, entries)
            };

            let entry_count = entries.len() as u64;
            let request = AppendEntriesRequest {
                term,
                leader_id: self.id.clone(),
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit: commit_index,
            };

            if let Some(response) = self.peer_client.append_entries(&peer, request, self.config.outbound_rpc_timeout) {
                self.handle_append_entries_response(&peer, term, prev_log_index, entry_count, response);
            }
        }
    }

    fn handle_append_entries_response(
        &self,
        peer: &str,
        term: u64,
        prev_log_index: u64,
        entry_count: u64,
        response: AppendEntriesResponse,
    ) {
        let mut state = self.node.lock();
        if response.term > state.current_term {
            if let Err(err) = self.node.adopt_term_and_step_down(&mut state, response.term) {
                fatal(format!("cannot persist adopted term: {err}"));
            }
            return;
        }
        if state.role != Role::Leader || state.current_term != term {
            return;
        }

        if response.success {
            let match_index = prev_log_index + entry_count;
            state.match_index.insert(peer.to_string(), match_index);
            state.next_index.insert(peer.to_string(), match_index + 1);
            self.advance_commit_index(&mut state);
        } else {
            let next = state.next_index.get(peer).copied().unwrap_or(1);
            state.next_index.insert(peer.to_string(), next.saturating_sub(1).max(1));
        }
    }

    /// Advances `commitIndex` to the largest N with an entry from the
    /// current term that a strict majority of the cluster (including
    /// this leader) has matched.
    fn advance_commit_index(&self, state: &mut Inner) {
        let log = self.node.log();
        let last_index = log.length();
        let total_members = self.peers.len() + 1;
        let majority = total_members / 2 + 1;

        let mut n = last_index;
        while n > state.commit_index {
            if log.at(n).term == state.current_term {
                let matched = 1 + state.match_index.values().filter(|&&m| m >= n).count();
                if matched >= majority {
                    state.commit_index = n;
                    break;
                }
            }
            n -= 1;
        }
    }
}
