//! Single-node Raft replication and election engine.
//!
//! This crate implements the replication and election core of a
//! Raft-replicated key-value store: persistent node state, the
//! AppendEntries and RequestVote RPC handlers, the Follower/Candidate/
//! Leader role state machine, and the applier that advances a node's
//! local state machine as entries commit. The RPC transport, the
//! client-facing command API, and the leader's broadcast scheduling
//! policy are external collaborators this crate exposes hooks for
//! (see [`rpc::PeerClient`]) rather than implements.

pub mod applier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod log;
pub mod node_state;
pub mod role_controller;
pub mod rpc;
pub mod store;

pub use error::{RaftError, Result};
