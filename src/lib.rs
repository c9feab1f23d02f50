pub mod agent;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod observability;
pub mod registry;
pub mod relay;
