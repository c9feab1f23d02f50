//! Observability stubs (metrics, tracing)

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    nodes_registered: AtomicU64,
    tasks_assigned: AtomicU64,
    reassignments: AtomicU64,
    relay_uploads: AtomicU64,
    relay_downloads: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_registered(&self) {
        self.nodes_registered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "nodes_registered", "Metric incremented");
    }

    pub fn task_assigned(&self) {
        self.tasks_assigned.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_assigned", "Metric incremented");
    }

    pub fn reassignment(&self) {
        self.reassignments.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "reassignments", "Metric incremented");
    }

    pub fn relay_upload(&self) {
        self.relay_uploads.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "relay_uploads", "Metric incremented");
    }

    pub fn relay_download(&self) {
        self.relay_downloads.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "relay_downloads", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nodes_registered: self.nodes_registered.load(Ordering::Relaxed),
            tasks_assigned: self.tasks_assigned.load(Ordering::Relaxed),
            reassignments: self.reassignments.load(Ordering::Relaxed),
            relay_uploads: self.relay_uploads.load(Ordering::Relaxed),
            relay_downloads: self.relay_downloads.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub nodes_registered: u64,
    pub tasks_assigned: u64,
    pub reassignments: u64,
    pub relay_uploads: u64,
    pub relay_downloads: u64,
}
