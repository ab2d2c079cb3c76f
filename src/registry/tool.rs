//! Tool capability and the name-keyed tool registry.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Descriptor;
use crate::core::errors::{DagError, Result};
use crate::dag_flow::spec::JsonMap;

/// A narrow capability invoked by agents (fetch data, extract a field, ...)
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry name of the tool
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        "No description provided"
    }

    /// Optional JSON schema for the named arguments
    fn parameters_schema(&self) -> Option<Value> {
        None
    }

    /// Run with named arguments
    async fn run(&self, args: JsonMap) -> anyhow::Result<JsonMap>;

    /// Check `args` against [`Tool::parameters_schema`], if any
    fn validate_args(&self, args: &JsonMap) -> Result<()> {
        let Some(schema) = self.parameters_schema() else {
            return Ok(());
        };
        let validator = jsonschema::validator_for(&schema).map_err(|e| DagError::InvalidArgs {
            tool: self.name().to_string(),
            message: format!("failed to compile parameters schema: {e}"),
        })?;
        let instance = Value::Object(args.clone());
        let errors: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            warn!(tool = self.name(), "Argument validation failed: {}", errors.join("; "));
            return Err(DagError::InvalidArgs {
                tool: self.name().to_string(),
                message: errors.join("; "),
            });
        }
        Ok(())
    }
}

/// Builds a tool instance
pub type ToolFactory = Arc<dyn Fn() -> Arc<dyn Tool> + Send + Sync>;

/// Registry for tools, shared by every agent of every run
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<DashMap<String, ToolFactory>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `http.get` and `json.pick` tools
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_tool(Arc::new(crate::builtin::HttpGet::new()));
        registry.register_tool(Arc::new(crate::builtin::JsonPick));
        registry
    }

    /// Register a factory; a later registration under the same name wins
    pub fn register(&self, name: impl Into<String>, factory: ToolFactory) {
        let name = name.into();
        if self.tools.insert(name.clone(), factory).is_some() {
            warn!(tool = %name, "Replaced previously registered tool");
        } else {
            debug!(tool = %name, "Registered tool");
        }
    }

    /// Register a shared instance under its own name
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.register(name, Arc::new(move || tool.clone()));
    }

    /// Get a tool by name
    pub fn create(&self, name: &str) -> Result<Arc<dyn Tool>> {
        // Clone the factory out so the shard lock is not held while it runs.
        let factory = self
            .tools
            .get(name)
            .map(|f| f.value().clone())
            .ok_or_else(|| DagError::UnknownTool(name.to_string()))?;
        Ok(factory())
    }

    /// Look up, validate arguments and run a tool
    pub async fn invoke(&self, name: &str, args: JsonMap) -> anyhow::Result<JsonMap> {
        let tool = self.create(name)?;
        tool.validate_args(&args)?;
        tool.run(args).await
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tools with their descriptions
    pub fn list(&self) -> BTreeMap<String, Descriptor> {
        let factories: Vec<(String, ToolFactory)> = self
            .tools
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        factories
            .into_iter()
            .map(|(name, factory)| {
                let tool = factory();
                let descriptor = Descriptor {
                    name: name.clone(),
                    description: Some(tool.description().to_string()),
                };
                (name, descriptor)
            })
            .collect()
    }
}
