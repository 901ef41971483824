//! Bounded top-k neighbor lists.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;

/// One edge of the k-NN graph: target node and similarity to the owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub node: NodeId,
    pub similarity: f64,
}

impl Neighbor {
    pub fn new(node: NodeId, similarity: f64) -> Self {
        Self { node, similarity }
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    /// Most similar first; equal similarities are ordered by ascending node
    /// id so that iteration order is stable across runs.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .similarity
            .total_cmp(&self.similarity)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Bounded list of the k most similar neighbors of one node.
///
/// Backed by a single buffer of capacity k (inline up to 16 entries), kept
/// sorted most-similar-first, with at most one entry per node id. When the
/// list is full, a new neighbor is admitted only if it is strictly more
/// similar than the current weakest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborList {
    capacity: usize,
    entries: SmallVec<[Neighbor; 16]>,
}

impl NeighborList {
    /// Create an empty list that will hold at most `capacity` neighbors.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: SmallVec::with_capacity(capacity.min(16)),
        }
    }

    /// Try to insert a neighbor.
    ///
    /// If an entry for the same node already exists, the higher similarity
    /// wins. Otherwise the neighbor is inserted if the list is not full, or
    /// if it is strictly more similar than the weakest entry (which is then
    /// evicted). Returns whether the list changed.
    pub fn add(&mut self, neighbor: Neighbor) -> bool {
        if self.capacity == 0 {
            return false;
        }

        if let Some(pos) = self.entries.iter().position(|e| e.node == neighbor.node) {
            if neighbor.similarity > self.entries[pos].similarity {
                self.entries.remove(pos);
                self.insert_sorted(neighbor);
                return true;
            }
            return false;
        }

        if self.entries.len() < self.capacity {
            self.insert_sorted(neighbor);
            return true;
        }

        let weakest = self.entries[self.entries.len() - 1];
        if neighbor.similarity > weakest.similarity {
            self.entries.pop();
            self.insert_sorted(neighbor);
            return true;
        }

        false
    }

    /// Merge another list into this one. Returns the number of accepted
    /// entries. Idempotent: merging the same list twice changes nothing.
    pub fn add_all(&mut self, other: &NeighborList) -> usize {
        other.iter().filter(|n| self.add(**n)).count()
    }

    /// Remove the entry for `node`, if present.
    pub fn remove(&mut self, node: NodeId) -> bool {
        match self.entries.iter().position(|e| e.node == node) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.iter().any(|e| e.node == node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate in sorted order, most similar first.
    pub fn iter(&self) -> std::slice::Iter<'_, Neighbor> {
        self.entries.iter()
    }

    /// The least similar entry currently held.
    pub fn weakest(&self) -> Option<&Neighbor> {
        self.entries.last()
    }

    /// Release any spare heap capacity.
    pub(crate) fn compact(&mut self) {
        self.entries.shrink_to_fit();
    }

    fn insert_sorted(&mut self, neighbor: Neighbor) {
        let pos = self.entries.partition_point(|e| *e < neighbor);
        self.entries.insert(pos, neighbor);
    }
}

impl<'a> IntoIterator for &'a NeighborList {
    type Item = &'a Neighbor;
    type IntoIter = std::slice::Iter<'a, Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nl(capacity: usize, pairs: &[(u64, f64)]) -> NeighborList {
        let mut list = NeighborList::new(capacity);
        for &(id, sim) in pairs {
            list.add(Neighbor::new(NodeId(id), sim));
        }
        list
    }

    #[test]
    fn keeps_top_k_sorted() {
        let list = nl(3, &[(1, 0.1), (2, 0.9), (3, 0.5), (4, 0.7)]);
        let ids: Vec<u64> = list.iter().map(|n| n.node.0).collect();
        assert_eq!(ids, vec![2, 4, 3]);
    }

    #[test]
    fn full_list_requires_strict_improvement() {
        let mut list = nl(2, &[(1, 0.5), (2, 0.3)]);
        // Equal to the weakest: rejected.
        assert!(!list.add(Neighbor::new(NodeId(3), 0.3)));
        // Strictly better: evicts the weakest.
        assert!(list.add(Neighbor::new(NodeId(3), 0.4)));
        assert!(!list.contains(NodeId(2)));
    }

    #[test]
    fn duplicate_keeps_max_similarity() {
        let mut list = nl(3, &[(1, 0.5)]);
        assert!(!list.add(Neighbor::new(NodeId(1), 0.2)));
        assert!(list.add(Neighbor::new(NodeId(1), 0.8)));
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().unwrap().similarity, 0.8);
    }

    #[test]
    fn ties_break_by_node_id() {
        let list = nl(4, &[(9, 0.5), (3, 0.5), (7, 0.5)]);
        let ids: Vec<u64> = list.iter().map(|n| n.node.0).collect();
        assert_eq!(ids, vec![3, 7, 9]);
    }

    #[test]
    fn add_all_is_idempotent() {
        let other = nl(3, &[(1, 0.9), (2, 0.8)]);
        let mut list = nl(3, &[(3, 0.1)]);
        let first = list.add_all(&other);
        assert_eq!(first, 2);
        assert_eq!(list.add_all(&other), 0);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut list = NeighborList::new(0);
        assert!(!list.add(Neighbor::new(NodeId(1), 1.0)));
        assert!(list.is_empty());
    }

    proptest! {
        #[test]
        fn prop_invariants_hold_under_random_inserts(
            capacity in 1usize..12,
            ops in proptest::collection::vec((0u64..40, -1.0f64..1.0), 0..200),
        ) {
            let mut list = NeighborList::new(capacity);
            for (id, sim) in ops {
                list.add(Neighbor::new(NodeId(id), sim));

                // Bounded.
                prop_assert!(list.len() <= capacity);

                // Unique node ids.
                let mut ids: Vec<u64> = list.iter().map(|n| n.node.0).collect();
                ids.sort_unstable();
                ids.dedup();
                prop_assert_eq!(ids.len(), list.len());

                // Sorted: descending similarity, ascending id on ties.
                for pair in list.iter().collect::<Vec<_>>().windows(2) {
                    prop_assert!(pair[0] <= pair[1]);
                }
            }
        }
    }
}
