use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::dag_flow::spec::JsonMap;
use crate::registry::{Agent, NodeInputs, ToolRegistry};

/// Runs a single tool with the node's params.
///
/// params:
/// - `tool`: registered tool name (required)
/// - `args`: object passed to the tool as named arguments
/// - `input_from`: ancestor node id whose output is passed as `data`
pub struct ToolAgent;

#[async_trait]
impl Agent for ToolAgent {
    fn type_name(&self) -> &str {
        "tool.agent"
    }

    fn description(&self) -> &str {
        "Runs a single registered tool with the node params"
    }

    async fn run(
        &self,
        params: &JsonMap,
        inputs: &NodeInputs,
        tools: &ToolRegistry,
    ) -> anyhow::Result<JsonMap> {
        let tool_name = params
            .get("tool")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("params.tool is required"))?;

        let mut args = match params.get("args") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => JsonMap::new(),
            Some(other) => anyhow::bail!("params.args must be an object, got {other}"),
        };

        if let Some(source) = params.get("input_from").and_then(Value::as_str) {
            let data = inputs
                .get(source)
                .map(|output| Value::Object(output.clone()))
                .unwrap_or(Value::Null);
            args.insert("data".to_string(), data);
        }

        debug!(tool = tool_name, "Invoking tool");
        tools.invoke(tool_name, args).await
    }
}
