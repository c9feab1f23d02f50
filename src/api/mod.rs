//! Coordinator HTTP surface: node registration, task assignment and
//! reassignment, completion reports, the per-node event stream, and the
//! artifact relay.

pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod state;
pub mod utils;

pub use server::{build_router, run};
pub use state::AppState;
