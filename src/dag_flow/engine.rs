//! Run execution: level-by-level dispatch with per-node retry and timeout.

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::events::{EventSink, RunEvent, RunEventEnvelope};
use super::graph::{build_graph, topo_levels, Graph};
use super::spec::{JsonMap, NodeSpec, WorkflowSpec};
use super::state::{RunState, RunStatus};
use super::store::RunStore;
use crate::core::config::OrchestratorConfig;
use crate::core::errors::{DagError, Result};
use crate::registry::{AgentRegistry, Descriptor, NodeInputs, ToolRegistry};

/// Outputs of succeeded nodes, written once per node id
type Outputs = Arc<DashMap<String, JsonMap>>;

/// Accepts workflow specs and drives each one to a terminal state in the
/// background.
///
/// Cloning is cheap; clones share registries, the run store and the sink.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    agents: AgentRegistry,
    tools: ToolRegistry,
    store: RunStore,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl Orchestrator {
    /// Orchestrator with the built-in agents and tools and a fresh run store
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        Self::with_registries(
            config,
            AgentRegistry::with_defaults(),
            ToolRegistry::with_defaults(),
            RunStore::new(),
        )
    }

    /// Fails with a configuration error if `config` does not validate
    pub fn with_registries(
        config: OrchestratorConfig,
        agents: AgentRegistry,
        tools: ToolRegistry,
        store: RunStore,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            agents,
            tools,
            store,
            event_sink: None,
        })
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Submit under a freshly generated run id.
    ///
    /// See [`Orchestrator::submit_with_id`].
    pub fn submit(&self, spec: WorkflowSpec) -> Result<RunState> {
        let run_id: String = Uuid::new_v4().simple().to_string().chars().take(12).collect();
        self.submit_with_id(run_id, spec)
    }

    /// Record the run as PENDING, start executing it in the background and
    /// return the initial snapshot.
    ///
    /// Structural problems in the workflow are not reported here; they surface
    /// as a FAILED run once execution starts. The only error is
    /// [`DagError::DuplicateRun`] for an id that is already in the store. Must
    /// be called from within a tokio runtime.
    pub fn submit_with_id(
        &self,
        run_id: impl Into<String>,
        spec: WorkflowSpec,
    ) -> Result<RunState> {
        let run_id = run_id.into();
        let state = RunState::new(run_id.clone(), &spec);
        self.store.insert(state.clone())?;
        info!(run_id = %run_id, nodes = spec.nodes.len(), "Run submitted");

        let this = self.clone();
        let span = info_span!("run", run_id = %run_id);
        tokio::spawn(async move { this.execute(run_id, spec).await }.instrument(span));
        Ok(state)
    }

    /// Build and level the graph without running anything
    pub fn validate(&self, spec: &WorkflowSpec) -> Result<Vec<Vec<String>>> {
        plan(spec).map(|(_, levels)| levels)
    }

    pub fn get_run(&self, run_id: &str) -> Option<RunState> {
        self.store.get(run_id)
    }

    /// Wait until the run reaches SUCCEEDED or FAILED and return its final
    /// state. `None` if the run is unknown.
    pub async fn wait_for_run(&self, run_id: &str) -> Option<RunState> {
        let mut status = self.store.subscribe(run_id)?;
        if status.wait_for(|s| s.is_terminal()).await.is_err() {
            debug!(run_id, "Run status channel closed");
        }
        self.store.get(run_id)
    }

    pub fn list_runs(&self) -> Vec<String> {
        self.store.run_ids()
    }

    pub fn list_agents(&self) -> BTreeMap<String, Descriptor> {
        self.agents.list()
    }

    pub fn list_tools(&self) -> BTreeMap<String, Descriptor> {
        self.tools.list()
    }

    fn emit(&self, run_id: &str, event: RunEvent) {
        if let Some(sink) = &self.event_sink {
            sink.emit(&RunEventEnvelope::new(run_id, event));
        }
    }

    async fn execute(self, run_id: String, spec: WorkflowSpec) {
        self.store
            .update_run(&run_id, |run| run.status = RunStatus::Running);
        self.emit(
            &run_id,
            RunEvent::RunStarted {
                nodes: spec.nodes.len(),
            },
        );

        let (graph, levels) = match plan(&spec) {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, "Run aborted");
                let message = e.to_string();
                self.store
                    .update_run(&run_id, |run| run.abort(message, Utc::now()));
                self.emit(
                    &run_id,
                    RunEvent::RunFinished {
                        status: RunStatus::Failed,
                    },
                );
                return;
            }
        };
        debug!(levels = levels.len(), "Graph leveled");

        let mut nodes: HashMap<String, NodeSpec> = spec
            .nodes
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();
        let outputs: Outputs = Arc::new(DashMap::new());

        for level in levels {
            let mut ids = Vec::with_capacity(level.len());
            let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(level.len());
            for node_id in level {
                let Some(node) = nodes.remove(&node_id) else {
                    continue;
                };
                let ancestors = graph.ancestors(&node_id);
                let this = self.clone();
                let run = run_id.clone();
                let outputs = outputs.clone();
                let span = info_span!("node", node_id = %node_id);
                handles.push(tokio::spawn(
                    async move { this.run_node(&run, node, ancestors, outputs).await }
                        .instrument(span),
                ));
                ids.push(node_id);
            }

            for (node_id, joined) in ids.into_iter().zip(join_all(handles).await) {
                if let Err(e) = joined {
                    let message = format!("Node task failed: {e}");
                    error!(node_id = %node_id, "{}", message);
                    let attempts = self.store.update_node(&run_id, &node_id, |result| {
                        result.logs.push(format!("attempt={} error={}", result.attempts, message));
                        result.fail(message.clone(), Utc::now());
                        result.attempts
                    });
                    self.emit(
                        &run_id,
                        RunEvent::NodeFailed {
                            node_id,
                            attempts: attempts.unwrap_or(0),
                            error: message,
                        },
                    );
                }
            }
        }

        let status = self
            .store
            .update_run(&run_id, |run| {
                run.status = run.aggregate_status();
                run.status
            })
            .unwrap_or(RunStatus::Failed);
        match status {
            RunStatus::Succeeded => info!("Run succeeded"),
            _ => warn!(status = %status, "Run finished with failures"),
        }
        self.emit(&run_id, RunEvent::RunFinished { status });
    }

    /// Drive one node to SUCCEEDED or FAILED
    async fn run_node(
        &self,
        run_id: &str,
        node: NodeSpec,
        ancestors: Vec<String>,
        outputs: Outputs,
    ) {
        let node_id = node.id.as_str();
        let agent = match self.agents.create(&node.agent.agent_type, &node.agent.config) {
            Ok(agent) => agent,
            Err(e) => {
                error!(agent = %node.agent.agent_type, error = %e, "Node failed before its first attempt");
                let message = e.to_string();
                let now = Utc::now();
                self.store.update_node(run_id, node_id, |result| {
                    result.started_at = Some(now);
                    result.logs.push(format!("attempt=0 error={message}"));
                    result.fail(message.clone(), now);
                });
                self.emit(
                    run_id,
                    RunEvent::NodeFailed {
                        node_id: node_id.to_string(),
                        attempts: 0,
                        error: message,
                    },
                );
                return;
            }
        };

        let timeout = self.config.effective_timeout(node.agent.timeout_sec);
        let budget = node.agent.retry_budget();

        let started = Utc::now();
        self.store.update_node(run_id, node_id, |result| {
            result.status = RunStatus::Running;
            result.started_at = Some(started);
        });
        info!(agent = %node.agent.agent_type, budget, "Node started");
        self.emit(
            run_id,
            RunEvent::NodeStarted {
                node_id: node_id.to_string(),
                agent: node.agent.agent_type.clone(),
            },
        );

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.store
                .update_node(run_id, node_id, |result| result.attempts = attempt);

            let inputs = collect_inputs(&ancestors, &outputs);
            let outcome =
                match tokio::time::timeout(timeout, agent.run(&node.params, &inputs, &self.tools))
                    .await
                {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => Err(DagError::agent(node_id, &e)),
                    Err(_) => Err(DagError::Timeout {
                        node: node_id.to_string(),
                        secs: timeout.as_secs_f64(),
                    }),
                };

            match outcome {
                Ok(output) => {
                    outputs.insert(node_id.to_string(), output.clone());
                    let now = Utc::now();
                    self.store.update_node(run_id, node_id, |result| {
                        result.logs.push(format!("attempt={attempt} success"));
                        result.output = Some(output);
                        result.status = RunStatus::Succeeded;
                        result.completed_at = Some(now);
                    });
                    info!(attempt, "Node succeeded");
                    self.emit(
                        run_id,
                        RunEvent::NodeSucceeded {
                            node_id: node_id.to_string(),
                            attempts: attempt,
                        },
                    );
                    return;
                }
                Err(e) => {
                    let message = node_error_message(&e);
                    let exhausted = attempt >= budget;
                    let now = Utc::now();
                    self.store.update_node(run_id, node_id, |result| {
                        result.logs.push(format!("attempt={attempt} error={message}"));
                        if exhausted {
                            result.fail(message.clone(), now);
                        } else {
                            result.error = Some(message.clone());
                        }
                    });

                    if exhausted {
                        error!(attempt, error = %message, "Node failed");
                        self.emit(
                            run_id,
                            RunEvent::NodeFailed {
                                node_id: node_id.to_string(),
                                attempts: attempt,
                                error: message,
                            },
                        );
                        return;
                    }

                    let delay = self.config.retry_strategy.delay_for(attempt);
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    warn!(attempt, delay_ms, error = %message, "Attempt failed; retrying");
                    self.emit(
                        run_id,
                        RunEvent::NodeRetrying {
                            node_id: node_id.to_string(),
                            attempt,
                            error: message,
                            delay_ms,
                        },
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn plan(spec: &WorkflowSpec) -> Result<(Graph, Vec<Vec<String>>)> {
    let graph = build_graph(spec)?;
    let levels = topo_levels(&graph)?;
    Ok((graph, levels))
}

/// Outputs of the ancestors that have succeeded so far
fn collect_inputs(ancestors: &[String], outputs: &DashMap<String, JsonMap>) -> NodeInputs {
    ancestors
        .iter()
        .filter_map(|id| {
            outputs
                .get(id)
                .map(|output| (id.clone(), output.value().clone()))
        })
        .collect()
}

// Agent errors are recorded with their own message, timeouts with the
// engine's timeout message.
fn node_error_message(error: &DagError) -> String {
    match error {
        DagError::Agent { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
