// Core infrastructure modules
pub mod core {
    pub mod config;
    pub mod errors;
    pub mod logging;
}

pub mod builtin;   // tool.agent, json.pick, http.get
pub mod dag_flow;  // Graph building, leveling and run execution
pub mod registry;  // Agent and tool registries

// Re-exports for convenience
pub use crate::core::config::OrchestratorConfig;
pub use crate::core::errors::{DagError, Result};
pub use crate::core::logging::init_logging;
pub use dag_flow::*;
pub use registry::{
    Agent, AgentFactory, AgentRegistry, Descriptor, NodeInputs, Tool, ToolFactory, ToolRegistry,
};
