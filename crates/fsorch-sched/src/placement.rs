//! Process placement substrate.
//!
//! The substrate is the compute backend that runs metadata instances. It is
//! injected at construction, never looked up by platform name.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::SchedError;
use crate::instance::{InstanceId, NodeId};

/// Compute backend that runs metadata service instances.
#[async_trait]
pub trait PlacementSubstrate: Send + Sync {
    /// Launch an instance for a filesystem; returns the node it landed on.
    /// Launching an already-running instance returns its current node.
    async fn launch(&self, filesystem: &str, instance: InstanceId) -> Result<NodeId, SchedError>;

    /// Stop a running instance. Returns once the process has exited.
    /// Stopping an unknown instance is not an error.
    async fn stop(&self, instance: InstanceId) -> Result<(), SchedError>;
}

struct PlacementInner {
    next: usize,
    running: HashMap<InstanceId, NodeId>,
}

/// Round-robin placement over a fixed node list.
pub struct RoundRobinPlacement {
    nodes: Vec<NodeId>,
    inner: Mutex<PlacementInner>,
}

impl RoundRobinPlacement {
    /// Create a placement over the given nodes.
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self {
            nodes,
            inner: Mutex::new(PlacementInner {
                next: 0,
                running: HashMap::new(),
            }),
        }
    }

    /// Number of instances currently running.
    pub async fn running_count(&self) -> usize {
        self.inner.lock().await.running.len()
    }

    /// Node a running instance sits on, if any.
    pub async fn node_of(&self, instance: InstanceId) -> Option<NodeId> {
        self.inner.lock().await.running.get(&instance).copied()
    }
}

#[async_trait]
impl PlacementSubstrate for RoundRobinPlacement {
    async fn launch(&self, filesystem: &str, instance: InstanceId) -> Result<NodeId, SchedError> {
        if self.nodes.is_empty() {
            return Err(SchedError::NoPlacementCapacity {
                filesystem: filesystem.to_string(),
            });
        }
        let mut inner = self.inner.lock().await;
        if let Some(node) = inner.running.get(&instance) {
            return Ok(*node);
        }
        let node = self.nodes[inner.next % self.nodes.len()];
        inner.next += 1;
        inner.running.insert(instance, node);
        Ok(node)
    }

    async fn stop(&self, instance: InstanceId) -> Result<(), SchedError> {
        let mut inner = self.inner.lock().await;
        inner.running.remove(&instance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: u64) -> Vec<NodeId> {
        (1..=n).map(NodeId::new).collect()
    }

    #[tokio::test]
    async fn test_launch_round_robins() {
        let placement = RoundRobinPlacement::new(nodes(3));
        let a = placement.launch("testfs", InstanceId::new(1)).await.unwrap();
        let b = placement.launch("testfs", InstanceId::new(2)).await.unwrap();
        let c = placement.launch("testfs", InstanceId::new(3)).await.unwrap();
        let d = placement.launch("testfs", InstanceId::new(4)).await.unwrap();
        assert_eq!(a, NodeId::new(1));
        assert_eq!(b, NodeId::new(2));
        assert_eq!(c, NodeId::new(3));
        assert_eq!(d, NodeId::new(1));
    }

    #[tokio::test]
    async fn test_launch_idempotent() {
        let placement = RoundRobinPlacement::new(nodes(3));
        let first = placement.launch("testfs", InstanceId::new(1)).await.unwrap();
        let second = placement.launch("testfs", InstanceId::new(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(placement.running_count().await, 1);
    }

    #[tokio::test]
    async fn test_launch_no_nodes_fails() {
        let placement = RoundRobinPlacement::new(Vec::new());
        let err = placement.launch("testfs", InstanceId::new(1)).await;
        assert!(matches!(err, Err(SchedError::NoPlacementCapacity { .. })));
    }

    #[tokio::test]
    async fn test_stop_removes_instance() {
        let placement = RoundRobinPlacement::new(nodes(1));
        placement.launch("testfs", InstanceId::new(1)).await.unwrap();
        placement.stop(InstanceId::new(1)).await.unwrap();
        assert_eq!(placement.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_unknown_is_ok() {
        let placement = RoundRobinPlacement::new(nodes(1));
        assert!(placement.stop(InstanceId::new(99)).await.is_ok());
    }
}
