//! Node identity and payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable identity of a node.
///
/// Neighbor lists and subgraphs reference nodes by id only; payloads are
/// resolved through the subgraph that owns the node. Two nodes with the same
/// id are the same node, regardless of payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// A value-bearing node of the k-NN graph.
///
/// `partition` is written by the partitioner once the node has been assigned
/// to a shard; it is `None` for nodes that have not been partitioned yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node<T> {
    pub id: NodeId,
    pub value: T,
    pub partition: Option<u32>,
}

impl<T> Node<T> {
    /// Create a node with no partition assigned.
    pub fn new(id: NodeId, value: T) -> Self {
        Self {
            id,
            value,
            partition: None,
        }
    }
}

// Equality and hashing are by identity only.
impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Node<T> {}

impl<T> Hash for Node<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_payload() {
        let a = Node::new(NodeId(7), "left".to_string());
        let mut b = Node::new(NodeId(7), "right".to_string());
        b.partition = Some(3);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn distinct_ids_are_distinct_nodes() {
        let a = Node::new(NodeId(1), 0.0f64);
        let b = Node::new(NodeId(2), 0.0f64);
        assert_ne!(a, b);
    }
}
