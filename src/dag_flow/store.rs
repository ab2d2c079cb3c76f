//! In-memory run table shared between the engine and query callers.
//!
//! Entries live for the lifetime of the store; there is no eviction.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;

use super::state::{NodeResult, RunState, RunStatus};
use crate::core::errors::{DagError, Result};

struct RunEntry {
    state: RunState,
    status_tx: watch::Sender<RunStatus>,
}

/// Run identifier -> run state.
///
/// Every mutation goes through [`RunStore::update_run`] or
/// [`RunStore::update_node`], which hold the entry's shard lock for the
/// duration of the closure and advance the run's `updated_at`.
#[derive(Clone, Default)]
pub struct RunStore {
    runs: Arc<DashMap<String, RunEntry>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new run. An existing run with the same id is left untouched
    /// and the insert fails with [`DagError::DuplicateRun`].
    pub fn insert(&self, state: RunState) -> Result<()> {
        match self.runs.entry(state.run_id.clone()) {
            Entry::Occupied(entry) => Err(DagError::DuplicateRun(entry.key().clone())),
            Entry::Vacant(entry) => {
                let (status_tx, _) = watch::channel(state.status);
                entry.insert(RunEntry { state, status_tx });
                Ok(())
            }
        }
    }

    /// Snapshot of a run
    pub fn get(&self, run_id: &str) -> Option<RunState> {
        self.runs.get(run_id).map(|entry| entry.state.clone())
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.runs.contains_key(run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// All known run ids, sorted
    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Mutate a run. Returns `None` if the run does not exist.
    pub fn update_run<R>(&self, run_id: &str, f: impl FnOnce(&mut RunState) -> R) -> Option<R> {
        let mut entry = self.runs.get_mut(run_id)?;
        let entry = &mut *entry;
        let out = f(&mut entry.state);
        entry.state.touch(Utc::now());
        let status = entry.state.status;
        entry.status_tx.send_if_modified(|current| {
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        });
        Some(out)
    }

    /// Mutate one node of a run. Returns `None` if the run or node does not exist.
    pub fn update_node<R>(
        &self,
        run_id: &str,
        node_id: &str,
        f: impl FnOnce(&mut NodeResult) -> R,
    ) -> Option<R> {
        let mut entry = self.runs.get_mut(run_id)?;
        let node = entry.state.nodes.get_mut(node_id)?;
        let out = f(node);
        entry.state.touch(Utc::now());
        Some(out)
    }

    /// Receiver that observes the run's status transitions
    pub fn subscribe(&self, run_id: &str) -> Option<watch::Receiver<RunStatus>> {
        self.runs.get(run_id).map(|entry| entry.status_tx.subscribe())
    }
}
