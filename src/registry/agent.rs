//! Agent capability and the agent-type registry.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::tool::ToolRegistry;
use super::Descriptor;
use crate::core::errors::{DagError, Result};
use crate::dag_flow::spec::JsonMap;

/// Outputs of a node's completed ancestors, keyed by node id
pub type NodeInputs = BTreeMap<String, JsonMap>;

/// Pluggable executor performing one node's work.
///
/// Agents are invoked under a per-attempt deadline; when it expires the
/// returned future is dropped, so agents should not rely on running to
/// completion. An ancestor that failed is absent from `inputs`; treating
/// that as an input error is up to the agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Type name used in `AgentSpec.type`
    fn type_name(&self) -> &str;

    fn description(&self) -> &str {
        "No description provided"
    }

    async fn run(
        &self,
        params: &JsonMap,
        inputs: &NodeInputs,
        tools: &ToolRegistry,
    ) -> anyhow::Result<JsonMap>;
}

/// Builds an agent from the node's `AgentSpec.config`
pub type AgentFactory = Arc<dyn Fn(&JsonMap) -> anyhow::Result<Arc<dyn Agent>> + Send + Sync>;

/// Registry for agent types
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<DashMap<String, AgentFactory>>,
}

impl AgentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `tool.agent`
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_agent(Arc::new(crate::builtin::ToolAgent));
        registry
    }

    /// Register a factory; a later registration under the same name wins
    pub fn register(&self, type_name: impl Into<String>, factory: AgentFactory) {
        let type_name = type_name.into();
        if self.agents.insert(type_name.clone(), factory).is_some() {
            warn!(agent = %type_name, "Replaced previously registered agent type");
        } else {
            debug!(agent = %type_name, "Registered agent type");
        }
    }

    /// Register a shared instance that ignores node config
    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        let type_name = agent.type_name().to_string();
        self.register(
            type_name,
            Arc::new(move |_config: &JsonMap| -> anyhow::Result<Arc<dyn Agent>> {
                Ok(agent.clone())
            }),
        );
    }

    /// Build an agent for one node
    pub fn create(&self, type_name: &str, config: &JsonMap) -> Result<Arc<dyn Agent>> {
        let factory = self
            .agents
            .get(type_name)
            .map(|f| f.value().clone())
            .ok_or_else(|| DagError::UnknownAgentType(type_name.to_string()))?;
        factory(config).map_err(|e| DagError::AgentCreation {
            agent: type_name.to_string(),
            message: format!("{e:#}"),
        })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.agents.contains_key(type_name)
    }

    /// Registered agent types. The description comes from an instance built
    /// with an empty config and is absent when the factory refuses that.
    pub fn list(&self) -> BTreeMap<String, Descriptor> {
        let factories: Vec<(String, AgentFactory)> = self
            .agents
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let empty = JsonMap::new();
        factories
            .into_iter()
            .map(|(name, factory)| {
                let description = factory(&empty)
                    .ok()
                    .map(|agent| agent.description().to_string());
                (
                    name.clone(),
                    Descriptor {
                        name,
                        description,
                    },
                )
            })
            .collect()
    }
}
