//! Coordinator core: node table, task table, and assignment index behind
//! one synchronization domain.

mod store;
mod types;

pub use store::{Registry, RegistryError};
pub use types::{NodeSnapshot, NodeStatus, Reassignment, TaskSnapshot, TaskStatus};
