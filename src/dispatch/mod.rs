//! Coordinator-to-node push dispatch.
//!
//! A node's live channel is an mpsc sender feeding its open event stream.
//! Dispatching copies the sender out of the channel table before any send,
//! so slow consumers never block registry mutations. When the channel is
//! missing or closed, delivery is retried on a spawned task with bounded
//! exponential backoff instead of being dropped silently; a dispatch that
//! still cannot be delivered is logged and left for the agent's own poll
//! of its pending tasks.

use crate::config::DispatchRetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

/// Events pushed to node agents over their live channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// Plain assignment: fetch this URL
    Assignment { url: String },
    /// The task moved here from a failed node; report back to `source_node`
    /// through the coordinator when done
    Reassignment { url: String, source_node: String },
    /// An artifact for this task is ready on the coordinator's relay
    RelayReady { url: String },
}

impl DispatchEvent {
    pub fn url(&self) -> &str {
        match self {
            DispatchEvent::Assignment { url }
            | DispatchEvent::Reassignment { url, .. }
            | DispatchEvent::RelayReady { url } => url,
        }
    }
}

const CHANNEL_CAPACITY: usize = 32;

pub struct Dispatcher {
    channels: RwLock<HashMap<String, mpsc::Sender<DispatchEvent>>>,
    retry: DispatchRetryConfig,
}

impl Dispatcher {
    pub fn new(retry: DispatchRetryConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            retry,
        }
    }

    /// Open (or replace) the live channel for a node. The previous sender
    /// is dropped, which ends any stale event stream on the old connection.
    pub async fn open_channel(&self, node_id: &str) -> mpsc::Receiver<DispatchEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let previous = self
            .channels
            .write()
            .await
            .insert(node_id.to_string(), tx);
        if previous.is_some() {
            debug!(node_id, "Replaced existing live channel");
        }
        rx
    }

    pub async fn close_channel(&self, node_id: &str) {
        self.channels.write().await.remove(node_id);
    }

    pub async fn is_open(&self, node_id: &str) -> bool {
        self.channels
            .read()
            .await
            .get(node_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Push an event to a node with retry. Returns whether the first
    /// attempt was delivered over a live channel.
    pub async fn dispatch(self: &Arc<Self>, node_id: &str, event: DispatchEvent) -> bool {
        if self.try_send(node_id, event.clone()).await {
            debug!(node_id, url = event.url(), "Dispatch delivered");
            return true;
        }

        let dispatcher = Arc::clone(self);
        let node_id = node_id.to_string();
        let retry = self.retry.clone();
        tokio::spawn(async move {
            // Attempt 1 already happened; back off before each retry,
            // doubling every round
            for attempt in 2..=retry.max_attempts {
                tokio::time::sleep(retry_backoff(retry.backoff(), attempt)).await;

                if dispatcher.try_send(&node_id, event.clone()).await {
                    debug!(
                        node_id,
                        url = event.url(),
                        attempt,
                        "Dispatch delivered after retry"
                    );
                    return;
                }
            }
            warn!(
                node_id,
                url = event.url(),
                attempts = retry.max_attempts,
                "Dispatch undeliverable, waiting for the node to poll"
            );
        });

        false
    }

    /// Single delivery attempt with no retry, for notifications whose
    /// absence the target discovers by other means (e.g. its next poll).
    pub async fn push_once(&self, node_id: &str, event: DispatchEvent) -> bool {
        self.try_send(node_id, event).await
    }

    /// One delivery attempt. The sender is cloned out of the table before
    /// sending so the channel lock is never held across the send.
    async fn try_send(&self, node_id: &str, event: DispatchEvent) -> bool {
        let sender = {
            let channels = self.channels.read().await;
            channels.get(node_id).cloned()
        };

        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

/// Backoff before retry `attempt` (attempt 1 is the initial send),
/// doubling each round. Saturates instead of overflowing for very large
/// configured attempt counts.
fn retry_backoff(base: std::time::Duration, attempt: u32) -> std::time::Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(2)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_retry(max_attempts: u32) -> DispatchRetryConfig {
        DispatchRetryConfig {
            max_attempts,
            backoff_ms: 10,
        }
    }

    fn assignment(url: &str) -> DispatchEvent {
        DispatchEvent::Assignment {
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_over_open_channel() {
        let dispatcher = Arc::new(Dispatcher::new(fast_retry(3)));
        let mut rx = dispatcher.open_channel("a").await;

        assert!(dispatcher.dispatch("a", assignment("http://x/v")).await);
        assert_eq!(rx.recv().await.unwrap(), assignment("http://x/v"));
    }

    #[tokio::test]
    async fn test_dispatch_retries_until_channel_opens() {
        let dispatcher = Arc::new(Dispatcher::new(fast_retry(5)));

        // First attempt fails: no channel yet
        assert!(!dispatcher.dispatch("a", assignment("http://x/v")).await);

        // Channel opens while the retry task is backing off
        let mut rx = dispatcher.open_channel("a").await;
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("retry should deliver within the backoff budget")
            .unwrap();
        assert_eq!(event, assignment("http://x/v"));
    }

    #[tokio::test]
    async fn test_dispatch_gives_up_after_max_attempts() {
        let dispatcher = Arc::new(Dispatcher::new(fast_retry(2)));

        assert!(!dispatcher.dispatch("a", assignment("http://x/v")).await);

        // Open the channel only after the retry budget is exhausted
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut rx = dispatcher.open_channel("a").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reopen_replaces_channel() {
        let dispatcher = Arc::new(Dispatcher::new(fast_retry(1)));

        let mut first = dispatcher.open_channel("a").await;
        let mut second = dispatcher.open_channel("a").await;

        assert!(dispatcher.dispatch("a", assignment("http://x/v")).await);
        assert!(first.recv().await.is_none()); // old stream ended
        assert_eq!(second.recv().await.unwrap(), assignment("http://x/v"));
    }

    #[tokio::test]
    async fn test_is_open_tracks_receiver_lifetime() {
        let dispatcher = Arc::new(Dispatcher::new(fast_retry(1)));
        assert!(!dispatcher.is_open("a").await);

        let rx = dispatcher.open_channel("a").await;
        assert!(dispatcher.is_open("a").await);

        drop(rx);
        assert!(!dispatcher.is_open("a").await);
    }

    #[test]
    fn test_retry_backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_backoff(base, 2), base);
        assert_eq!(retry_backoff(base, 3), base * 2);
        assert_eq!(retry_backoff(base, 4), base * 4);

        // Huge attempt counts must not panic; the exponent pins at
        // u32::MAX and the product saturates
        assert_eq!(retry_backoff(base, 200), base.saturating_mul(u32::MAX));
        assert_eq!(retry_backoff(Duration::MAX, 3), Duration::MAX);
    }

    #[test]
    fn test_event_wire_format() {
        let event = DispatchEvent::Reassignment {
            url: "http://x/v".to_string(),
            source_node: "a".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"reassignment","url":"http://x/v","source_node":"a"}"#
        );

        let parsed: DispatchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
