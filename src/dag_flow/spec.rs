//! Workflow submission types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::core::errors::Result;

/// JSON object used for params, agent config and node outputs
pub type JsonMap = Map<String, Value>;

fn default_timeout_sec() -> Option<f64> {
    Some(30.0)
}

fn default_retries() -> i64 {
    1
}

/// Which agent to run and its configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Agent type name registered in the agent registry
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Passed to the agent factory
    #[serde(default)]
    pub config: JsonMap,
    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: Option<f64>,
    /// Attempt budget; values below 1 still allow one attempt
    #[serde(default = "default_retries")]
    pub retries: i64,
}

impl AgentSpec {
    pub fn new(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            config: JsonMap::new(),
            timeout_sec: default_timeout_sec(),
            retries: default_retries(),
        }
    }

    pub fn with_config(mut self, config: JsonMap) -> Self {
        self.config = config;
        self
    }

    pub fn with_timeout(mut self, timeout_sec: f64) -> Self {
        self.timeout_sec = Some(timeout_sec);
        self
    }

    pub fn with_retries(mut self, retries: i64) -> Self {
        self.retries = retries;
        self
    }

    /// Number of attempts the engine will make, never less than one
    pub fn retry_budget(&self) -> u32 {
        self.retries.clamp(1, i64::from(u32::MAX)) as u32
    }
}

/// A node in the execution graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub agent: AgentSpec,
    #[serde(default)]
    pub params: JsonMap,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, agent: AgentSpec) -> Self {
        Self {
            id: id.into(),
            agent,
            params: JsonMap::new(),
        }
    }

    /// Set params from a JSON object; any other JSON value leaves params empty
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = match params {
            Value::Object(map) => map,
            _ => JsonMap::new(),
        };
        self
    }
}

/// Directed edge: output of `source` is an input dependency of `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
}

impl EdgeSpec {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Full graph specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSpec {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl WorkflowSpec {
    pub fn new(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> Self {
        Self { nodes, edges }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
