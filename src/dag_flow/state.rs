//! Run and node state tracked for polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::spec::{JsonMap, WorkflowSpec};

/// Reserved node id used to record orchestration-level failures
pub const ORCHESTRATOR_NODE_ID: &str = "_orchestrator";

/// Error recorded on nodes that never started because the run was aborted
pub const ABORTED_MESSAGE: &str = "Aborted due to orchestration error";

/// Status shared by runs and nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Per-node execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: RunStatus,
    pub output: Option<JsonMap>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Attempts made so far, counted before each invocation
    pub attempts: u32,
    /// Append-only attempt annotations
    pub logs: Vec<String>,
}

impl NodeResult {
    pub fn pending() -> Self {
        Self::with_status(RunStatus::Pending)
    }

    pub fn with_status(status: RunStatus) -> Self {
        Self {
            status,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            attempts: 0,
            logs: Vec::new(),
        }
    }

    /// Terminal failure with the given message
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(at);
    }
}

/// State of one submitted workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStatus,
    pub nodes: BTreeMap<String, NodeResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// Initial state: run and every declared node PENDING.
    ///
    /// Duplicate node ids collapse into one entry here; the engine rejects
    /// them once execution starts.
    pub fn new(run_id: impl Into<String>, spec: &WorkflowSpec) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            status: RunStatus::Pending,
            nodes: spec
                .nodes
                .iter()
                .map(|n| (n.id.clone(), NodeResult::pending()))
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance `updated_at`; never moves it backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// FAILED if any node (pseudo-node included) failed, else SUCCEEDED
    pub fn aggregate_status(&self) -> RunStatus {
        if self.nodes.values().any(|n| n.status == RunStatus::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        }
    }

    /// Fail the run because of an orchestration-level error.
    ///
    /// Nodes that never started go straight from PENDING to FAILED, and the
    /// cause is recorded against the pseudo-node.
    pub fn abort(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        for node in self.nodes.values_mut() {
            if node.status == RunStatus::Pending {
                node.fail(ABORTED_MESSAGE, now);
            }
        }
        // A spec declaring the reserved id is itself rejected, so replacing
        // that entry loses no user result.
        let mut pseudo = NodeResult::pending();
        pseudo.fail(error, now);
        self.nodes.insert(ORCHESTRATOR_NODE_ID.to_string(), pseudo);
        self.status = RunStatus::Failed;
        self.touch(now);
    }

    pub fn node(&self, id: &str) -> Option<&NodeResult> {
        self.nodes.get(id)
    }
}
