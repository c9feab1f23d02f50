//! Node agent: the worker-side half of the protocol.

pub mod client;
pub mod events;
pub mod fetcher;
pub mod runner;

pub use client::{ClientError, CoordinatorClient};
pub use events::EventStream;
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use runner::{AgentError, CompletionHook, DownloadOutcome, NodeAgent};
