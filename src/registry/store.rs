use super::types::{
    NodeRecord, NodeSnapshot, NodeStatus, Reassignment, TaskSnapshot, TaskStatus,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Every other registered node is either the reporter itself, marked
    /// failed, or still inside its cooldown window
    #[error("no available nodes")]
    NoAvailableNodes,

    /// Reassignment was requested for a URL the coordinator never assigned
    #[error("unknown task: {0}")]
    UnknownTask(String),
}

/// Authoritative node/task state for the coordinator.
///
/// The node table, task table, and assignment index form one logical unit:
/// every mutating operation takes the write lock for its whole critical
/// section, so cross-field consistency (a task's `assigned_to` versus the
/// index) is never observable torn. Channel I/O is never performed under
/// this lock; operations return what the caller should dispatch.
pub struct Registry {
    cooldown: Duration,
    inner: RwLock<RegistryInner>,
}

struct RegistryInner {
    nodes: HashMap<String, NodeRecord>,
    /// Node ids in registration order; keeps candidate iteration (and
    /// therefore tie-breaking) deterministic
    order: Vec<String>,
    tasks: HashMap<String, TaskSnapshot>,
    /// Assignment index: node id -> set of task URLs it currently owns
    assignments: HashMap<String, HashSet<String>>,
}

impl Registry {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            inner: RwLock::new(RegistryInner {
                nodes: HashMap::new(),
                order: Vec::new(),
                tasks: HashMap::new(),
                assignments: HashMap::new(),
            }),
        }
    }

    /// Register a node, idempotently. Re-registering an existing id resets
    /// it to active and refreshes `last_seen`, which is how a node comes
    /// back after a reconnect.
    pub async fn register(&self, node_id: &str) -> NodeSnapshot {
        let mut inner = self.inner.write().await;

        match inner.nodes.get_mut(node_id) {
            Some(record) => {
                record.status = NodeStatus::Active;
                record.last_seen = Utc::now();
                debug!(node_id, "Node re-registered");
            }
            None => {
                inner.nodes.insert(node_id.to_string(), NodeRecord::new());
                inner.order.push(node_id.to_string());
                inner
                    .assignments
                    .insert(node_id.to_string(), HashSet::new());
                info!(node_id, "Node registered");
            }
        }

        inner.snapshot_node(node_id).expect("node just inserted")
    }

    /// Assign a URL to a node, creating the task on first sight.
    ///
    /// A second submission of the same URL updates the same task (latest
    /// `assigned_to` wins); concurrent submissions of one resource are
    /// deliberately coalesced. Unknown node ids are registered implicitly
    /// so an assignment can never dangle.
    pub async fn assign(&self, url: &str, node_id: &str) -> TaskSnapshot {
        let mut inner = self.inner.write().await;
        inner.ensure_node(node_id);

        if let Some(task) = inner.tasks.get_mut(url) {
            let previous = task.assigned_to.clone();
            task.assigned_to = node_id.to_string();
            // Re-homing an orphaned or mid-hand-off task makes it a plain
            // pending assignment again, so the agent's resume poll can see
            // it even if the push dispatch never lands
            if matches!(task.status, TaskStatus::Failed | TaskStatus::Reassigned) {
                task.status = TaskStatus::Pending;
                task.reassigned_to = None;
                task.reassigned_from = None;
                task.reassigned_at = None;
            }
            if previous != node_id {
                if let Some(set) = inner.assignments.get_mut(&previous) {
                    set.remove(url);
                }
            }
            debug!(url, node_id, "Existing task re-assigned");
        } else {
            inner
                .tasks
                .insert(url.to_string(), TaskSnapshot::new(url.to_string(), node_id.to_string()));
            info!(url, node_id, "Task created");
        }

        inner
            .assignments
            .get_mut(node_id)
            .expect("assignment set exists for registered node")
            .insert(url.to_string());

        inner.tasks.get(url).cloned().expect("task just inserted")
    }

    /// Record a successful download. Unknown URLs are a benign no-op
    /// (duplicate or delayed reports); returns whether the task was known.
    ///
    /// Success on an already-reassigned task still overwrites to completed:
    /// last writer wins, by design of the reassignment race.
    pub async fn notify_success(
        &self,
        node_id: &str,
        url: &str,
        output_path: &str,
    ) -> bool {
        let mut inner = self.inner.write().await;

        let Some(task) = inner.tasks.get_mut(url) else {
            warn!(node_id, url, "Success report for unknown task, ignoring");
            return false;
        };

        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        task.completed_by = Some(node_id.to_string());
        task.output_path = Some(output_path.to_string());
        info!(node_id, url, "Task completed");
        true
    }

    /// Handle a failure report: penalize the reporter and hand the task to
    /// the least-loaded eligible node.
    pub async fn request_reassignment(
        &self,
        node_id: &str,
        url: &str,
    ) -> Result<Reassignment, RegistryError> {
        self.request_reassignment_at(node_id, url, Instant::now())
            .await
    }

    /// Deterministic-time variant of [`request_reassignment`]; the cooldown
    /// comparison uses the supplied instant.
    ///
    /// [`request_reassignment`]: Registry::request_reassignment
    pub async fn request_reassignment_at(
        &self,
        node_id: &str,
        url: &str,
        now: Instant,
    ) -> Result<Reassignment, RegistryError> {
        let mut inner = self.inner.write().await;
        inner.ensure_node(node_id);

        // Unconditional penalty: one failure is enough to sideline the
        // reporter for the cooldown window
        let record = inner.nodes.get_mut(node_id).expect("node just ensured");
        record.status = NodeStatus::Failed;
        record.last_failure = Some(now);
        record.last_failure_at = Some(Utc::now());
        warn!(node_id, url, "Node reported failure, marked failed");

        if !inner.tasks.contains_key(url) {
            return Err(RegistryError::UnknownTask(url.to_string()));
        }

        // The failing node gives up ownership regardless of whether a new
        // owner can be found
        if let Some(set) = inner.assignments.get_mut(node_id) {
            set.remove(url);
        }

        let target = match inner.select_candidate(node_id, now, self.cooldown) {
            Some(target) => target,
            None => {
                let task = inner.tasks.get_mut(url).expect("checked above");
                task.status = TaskStatus::Failed;
                warn!(url, "No available nodes for reassignment");
                return Err(RegistryError::NoAvailableNodes);
            }
        };

        // Single atomic hand-off: task fields and both assignment sets
        // change inside this one critical section
        let task = inner.tasks.get_mut(url).expect("checked above");
        task.status = TaskStatus::Reassigned;
        task.assigned_to = target.clone();
        task.reassigned_to = Some(target.clone());
        task.reassigned_from = Some(node_id.to_string());
        task.reassigned_at = Some(Utc::now());
        let task = task.clone();

        inner
            .assignments
            .get_mut(&target)
            .expect("candidate came from the node table")
            .insert(url.to_string());

        info!(url, from = node_id, to = %target, "Task reassigned");

        Ok(Reassignment {
            task,
            source: node_id.to_string(),
            target,
        })
    }

    /// Node-to-node completion: the task is marked completed on behalf of
    /// `source_node`. Unknown URLs are ignored, same as `notify_success`.
    pub async fn notify_node(
        &self,
        source_node: &str,
        url: &str,
        output_path: &str,
    ) -> bool {
        self.notify_success(source_node, url, output_path).await
    }

    /// Record the coordinator-local relay path on the task, if it exists.
    pub async fn record_relay_file(&self, url: &str, path: PathBuf) -> bool {
        let mut inner = self.inner.write().await;
        match inner.tasks.get_mut(url) {
            Some(task) => {
                task.relay_file = Some(path);
                true
            }
            None => {
                warn!(url, "Relay upload for unknown task, path not recorded");
                false
            }
        }
    }

    /// Flip a pending task to processing once a live push was delivered.
    pub async fn mark_processing(&self, url: &str) {
        let mut inner = self.inner.write().await;
        if let Some(task) = inner.tasks.get_mut(url) {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Processing;
            }
        }
    }

    pub async fn task(&self, url: &str) -> Option<TaskSnapshot> {
        self.inner.read().await.tasks.get(url).cloned()
    }

    /// URLs currently owned by a node, or None for an unknown node
    pub async fn node_tasks(&self, node_id: &str) -> Option<Vec<TaskSnapshot>> {
        let inner = self.inner.read().await;
        let set = inner.assignments.get(node_id)?;
        let mut tasks: Vec<TaskSnapshot> = set
            .iter()
            .filter_map(|url| inner.tasks.get(url).cloned())
            .collect();
        tasks.sort_by(|a, b| a.url.cmp(&b.url));
        Some(tasks)
    }

    /// All nodes in registration order
    pub async fn nodes(&self) -> Vec<NodeSnapshot> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.snapshot_node(id))
            .collect()
    }
}

impl RegistryInner {
    fn ensure_node(&mut self, node_id: &str) {
        if !self.nodes.contains_key(node_id) {
            self.nodes.insert(node_id.to_string(), NodeRecord::new());
            self.order.push(node_id.to_string());
            self.assignments
                .insert(node_id.to_string(), HashSet::new());
        }
    }

    /// First minimal-load eligible candidate, iterating in registration
    /// order. A node that failed within the cooldown window is excluded
    /// even though its status field has not been externally reset; the
    /// boundary itself (elapsed == cooldown) is still excluded.
    fn select_candidate(
        &self,
        reporter: &str,
        now: Instant,
        cooldown: Duration,
    ) -> Option<String> {
        let mut best: Option<(&str, usize)> = None;

        for id in &self.order {
            if id == reporter {
                continue;
            }
            // A failed node flips back to active implicitly once its
            // cooldown elapses, so eligibility reduces to the cooldown
            // check: never-failed or strictly past the window
            let record = &self.nodes[id.as_str()];
            if !cooled_down(record.last_failure, now, cooldown) {
                continue;
            }

            let load = self.assignments.get(id).map_or(0, HashSet::len);
            match best {
                Some((_, best_load)) if load >= best_load => {}
                _ => best = Some((id, load)),
            }
        }

        best.map(|(id, _)| id.to_string())
    }

    fn snapshot_node(&self, node_id: &str) -> Option<NodeSnapshot> {
        let record = self.nodes.get(node_id)?;
        Some(NodeSnapshot {
            id: node_id.to_string(),
            status: record.status,
            last_seen: record.last_seen,
            last_failure_at: record.last_failure_at,
            assigned: self.assignments.get(node_id).map_or(0, HashSet::len),
        })
    }
}

/// A node is eligible again only strictly after the cooldown window;
/// elapsed time exactly equal to the window still excludes it.
fn cooled_down(last_failure: Option<Instant>, now: Instant, cooldown: Duration) -> bool {
    match last_failure {
        None => true,
        Some(failed_at) => now.saturating_duration_since(failed_at) > cooldown,
    }
}
