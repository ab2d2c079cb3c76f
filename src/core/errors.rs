use thiserror::Error;

/// Unified error type for graph validation, registry lookups and node execution
#[derive(Debug, Error)]
pub enum DagError {
    /// An edge points at a node id that was never declared
    #[error("Edge references unknown node: {from}->{to}")]
    UnknownNodeReference { from: String, to: String },

    /// An edge whose source and target are the same node
    #[error("Self-edge on node '{0}'")]
    SelfEdge(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// A user node tried to claim the id reserved for orchestration errors
    #[error("Node id '{0}' is reserved")]
    ReservedNodeId(String),

    /// Leveling could not emit every node; the listed ids were never emitted
    #[error("Graph has cycles; DAG required (unresolved nodes: {})", .0.join(", "))]
    CyclicGraph(Vec<String>),

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Failed to create agent '{agent}': {message}")]
    AgentCreation { agent: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Node '{node}' timed out after {secs}s")]
    Timeout { node: String, secs: f64 },

    #[error("Agent error in node '{node}': {message}")]
    Agent { node: String, message: String },

    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArgs { tool: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A run with this id was already submitted
    #[error("Run id already in use: {0}")]
    DuplicateRun(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an agent execution error, keeping the full anyhow context chain
    pub fn agent<S: Into<String>>(node: S, error: &anyhow::Error) -> Self {
        Self::Agent {
            node: node.into(),
            message: format!("{error:#}"),
        }
    }

    /// Whether this error was raised while validating the graph structure.
    /// These abort the whole run instead of a single node.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownNodeReference { .. }
                | Self::SelfEdge(_)
                | Self::DuplicateNode(_)
                | Self::ReservedNodeId(_)
                | Self::CyclicGraph(_)
        )
    }

    /// Whether this error is a per-attempt deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, DagError>;
