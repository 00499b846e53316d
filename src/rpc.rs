//! Wire message shapes and the outbound-RPC seam.
//!
//! The actual transport (framing, connection management, the legacy
//! JSON/HTTP `POST /append_entries` variant) is an external collaborator;
//! these types only need to be `serde`-derivable so whatever transport
//! is wired in can encode them.

use crate::log::LogEntry;
use crate::node_state::NodeState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: String,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: u64,
    pub candidate_id: String,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

/// Abstract outbound-RPC contract the `RoleController` drives as
/// Candidate and Leader. `RoleController` never talks to a socket
/// directly; it only knows this trait, matching the corpus's own
/// "in a real implementation, we would send..." stub seam in its
/// election/replication managers.
pub trait PeerClient: Send + Sync {
    fn append_entries(
        &self,
        peer: &str,
        request: AppendEntriesRequest,
        deadline: Duration,
    ) -> Option<AppendEntriesResponse>;

    fn request_vote(
        &self,
        peer: &str,
        request: RequestVoteRequest,
        deadline: Duration,
    ) -> Option<RequestVoteResponse>;
}

/// A `PeerClient` that never reaches a peer; every call behaves as a
/// deadline-exceeded timeout. Useful for exercising `RoleController` in
/// isolation (e.g. "stays Candidate with no reachable peers").
pub struct NullPeerClient;

impl PeerClient for NullPeerClient {
    fn append_entries(
        &self,
        _peer: &str,
        _request: AppendEntriesRequest,
        _deadline: Duration,
    ) -> Option<AppendEntriesResponse> {
        None
    }

    fn request_vote(
        &self,
        _peer: &str,
        _request: RequestVoteRequest,
        _deadline: Duration,
    ) -> Option<RequestVoteResponse> {
        None
    }
}

/// A peer reachable through this process's own handler functions rather
/// than a socket: dispatching `append_entries`/`request_vote` against
/// its `NodeState` directly, posting to its timer-reset channel exactly
/// as an inbound RPC would. Lets tests wire several in-process
/// `RoleController`s into a single cluster and exercise real elections
/// and replication without a network.
pub struct ChannelPeerClient {
    peers: HashMap<String, (Arc<NodeState>, crossbeam_channel::Sender<()>)>,
}

impl ChannelPeerClient {
    pub fn new() -> Self {
        Self { peers: HashMap::new() }
    }

    pub fn register(&mut self, id: impl Into<String>, node: Arc<NodeState>, timer_reset: crossbeam_channel::Sender<()>) {
        self.peers.insert(id.into(), (node, timer_reset));
    }
}

impl Default for ChannelPeerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerClient for ChannelPeerClient {
    fn append_entries(
        &self,
        peer: &str,
        request: AppendEntriesRequest,
        _deadline: Duration,
    ) -> Option<AppendEntriesResponse> {
        let (node, timer_reset) = self.peers.get(peer)?;
        Some(crate::handlers::handle_append_entries(node, timer_reset, request))
    }

    fn request_vote(
        &self,
        peer: &str,
        request: RequestVoteRequest,
        _deadline: Duration,
    ) -> Option<RequestVoteResponse> {
        let (node, timer_reset) = self.peers.get(peer)?;
        Some(crate::handlers::handle_request_vote(node, timer_reset, request))
    }
}
