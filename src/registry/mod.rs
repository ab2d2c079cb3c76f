//! Name-keyed registries for agents and tools.
//!
//! The engine only depends on the [`Agent`] and [`Tool`] capabilities;
//! concrete implementations plug in here at startup.

pub mod agent;
pub mod tool;

pub use agent::*;
pub use tool::*;

use serde::{Deserialize, Serialize};

/// Discovery metadata for a registered agent type or tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub description: Option<String>,
}
