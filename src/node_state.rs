//! Aggregates persistent and volatile node state behind a single
//! writer-priority lock, so every handler's critical section is
//! "check term, mutate, persist, release" with no way to skip the
//! persist step before another thread observes the mutation.

use crate::error::Result;
use crate::log::Log;
use crate::store::DataStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

const CURRENT_TERM_KEY: &str = "CurrentTerm";
const VOTED_FOR_KEY: &str = "VotedFor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// Everything guarded by `NodeState`'s single lock. Fields are
/// `pub(crate)` rather than hidden behind accessors because every
/// mutation site lives in this crate and needs the same critical
/// section; nothing outside the crate ever sees an `Inner`.
pub struct Inner {
    pub current_term: u64,
    pub voted_for: Option<String>,
    pub commit_index: u64,
    pub last_applied: u64,
    pub leader_id: Option<String>,
    pub role: Role,
    pub next_index: HashMap<String, u64>,
    pub match_index: HashMap<String, u64>,
}

pub struct NodeState {
    id: String,
    store: Arc<dyn DataStore>,
    log: Log,
    inner: Mutex<Inner>,
}

impl NodeState {
    /// Loads persistent fields from `store`, defaulting to term 0 /
    /// no vote / empty log when absent. Volatile fields always start
    /// fresh: Follower, commitIndex=0, lastApplied=0, empty peer maps.
    pub fn load(id: String, store: Arc<dyn DataStore>) -> Result<Self> {
        let current_term = store
            .get(CURRENT_TERM_KEY)?
            .map(|raw| raw.parse::<u64>())
            .transpose()
            .map_err(|e| crate::error::RaftError::Corrupt(format!("CurrentTerm: {e}")))?
            .unwrap_or(0);

        let voted_for = store.get(VOTED_FOR_KEY)?.filter(|v| !v.is_empty());

        let log = Log::load(store.clone())?;

        Ok(Self {
            id,
            store,
            log,
            inner: Mutex::new(Inner {
                current_term,
                voted_for,
                commit_index: 0,
                last_applied: 0,
                leader_id: None,
                role: Role::Follower,
                next_index: HashMap::new(),
                match_index: HashMap::new(),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Acquires the single writer-priority lock. Callers must persist
    /// any durable field they mutate, inside the critical section,
    /// before releasing the guard; see `persist_current_term` and
    /// `persist_voted_for`.
    pub fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("node state lock poisoned")
    }

    pub fn persist_current_term(&self, term: u64) -> Result<()> {
        self.store.put(CURRENT_TERM_KEY, &term.to_string())
    }

    pub fn persist_voted_for(&self, candidate: Option<&str>) -> Result<()> {
        self.store.put(VOTED_FOR_KEY, candidate.unwrap_or(""))
    }

    pub fn current_term(&self) -> u64 {
        self.lock().current_term
    }

    pub fn role(&self) -> Role {
        self.lock().role
    }

    pub fn commit_index(&self) -> u64 {
        self.lock().commit_index
    }

    pub fn last_applied(&self) -> u64 {
        self.lock().last_applied
    }

    pub fn leader_id(&self) -> Option<String> {
        self.lock().leader_id.clone()
    }

    /// Adopts a higher term observed in any inbound message or reply:
    /// persists the term, clears and persists `votedFor`, steps down
    /// to Follower. Invariant 4 in the data model requires this happen
    /// before any further processing of the message that revealed it.
    pub fn adopt_term_and_step_down(&self, inner: &mut Inner, term: u64) -> Result<()> {
        inner.current_term = term;
        inner.voted_for = None;
        inner.role = Role::Follower;
        self.persist_current_term(term)?;
        self.persist_voted_for(None)?;
        Ok(())
    }
}
