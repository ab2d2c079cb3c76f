//! Plug-ins registered by `with_defaults()`.

mod http_get;
mod json_pick;
mod tool_agent;

pub use http_get::HttpGet;
pub use json_pick::{pick, JsonPick};
pub use tool_agent::ToolAgent;
