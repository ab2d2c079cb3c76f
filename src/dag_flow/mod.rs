pub mod engine;
pub mod events;
pub mod graph;
pub mod retry;
pub mod spec;
pub mod state;
pub mod store;

pub use engine::Orchestrator;
pub use events::{
    BroadcastEventSink, BufferingEventSink, EventSink, LoggingEventSink, RunEvent,
    RunEventEnvelope,
};
pub use graph::{build_graph, topo_levels, Graph};
pub use retry::RetryStrategy;
pub use spec::{AgentSpec, EdgeSpec, JsonMap, NodeSpec, WorkflowSpec};
pub use state::{NodeResult, RunState, RunStatus, ABORTED_MESSAGE, ORCHESTRATOR_NODE_ID};
pub use store::RunStore;
