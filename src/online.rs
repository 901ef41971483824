//! Online maintenance of a partitioned k-NN graph.
//!
//! [`OnlineGraph`] owns an [`ApproximateSearch`] (and through it the current
//! partitioned collection) and supports inserting and removing nodes with
//! bounded local work. Every mutation builds a new version of the collection
//! and swaps it in (functional update); the two most recent previous
//! versions are retained and older ones released. Every 100 insertions the
//! current version is checkpointed, which in this in-process substrate means
//! compacting its storage in place of truncating a deferred-transformation
//! lineage.
//!
//! Insertion attaches *back-edges*: the neighbor lists of the new node's
//! two-hop neighborhood are offered an edge to the new node, the symmetric
//! complement of the search-found forward edges, so the new node becomes
//! discoverable from existing nodes.
//!
//! Removal is approximate: nodes that pointed at the removed node get their
//! lists refilled from candidates within three hops of the affected
//! neighborhood, not from a global search.

use crate::distributed::{DistributedGraph, EdgeTable};
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::neighbors::{Neighbor, NeighborList};
use crate::node::{Node, NodeId};
use crate::search::ApproximateSearch;
use crate::similarity::Similarity;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

const PARTITIONING_ITERATIONS: usize = 5;
const DEFAULT_SEARCH_SPEEDUP: usize = 4;
const DEFAULT_MEDOID_UPDATE_RATIO: f64 = 0.1;

/// Insertions between two checkpoints of the current graph version.
const INSERTIONS_BETWEEN_CHECKPOINTS: u64 = 100;

/// Hops of the new node's neighborhood that receive back-edges.
const UPDATE_DEPTH: usize = 2;

/// Expansion depth when collecting replacement candidates for a removal.
const REMOVAL_EXPAND_DEPTH: usize = 3;

/// Counters exposed for instrumentation and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnlineStats {
    pub nodes_added: u64,
    pub nodes_removed: u64,
    pub checkpoints: u64,
    pub medoid_refreshes: u64,
}

/// A partitioned k-NN graph supporting online insertion and removal.
///
/// Mutations are strictly sequential on the caller's thread; per-shard work
/// inside a mutation runs in parallel.
pub struct OnlineGraph<T> {
    searcher: ApproximateSearch<T>,
    k: usize,
    similarity: Arc<dyn Similarity<T>>,
    partitions_size: Vec<u64>,
    previous_versions: VecDeque<Arc<DistributedGraph<T>>>,
    search_speedup: usize,
    medoid_update_ratio: f64,
    nodes_added: u64,
    nodes_before_update_medoids: u64,
    stats: OnlineStats,
}

impl<T: Clone + Send + Sync> OnlineGraph<T> {
    /// Build an online graph from an initial edge table, partitioning it
    /// into `partitions` shards.
    pub fn new(
        k: usize,
        similarity: Arc<dyn Similarity<T>>,
        initial: EdgeTable<T>,
        partitions: usize,
    ) -> Result<Self> {
        let searcher = ApproximateSearch::new(
            initial,
            PARTITIONING_ITERATIONS,
            partitions,
            Arc::clone(&similarity),
        )?;
        Self::build(k, similarity, searcher)
    }

    /// Like [`OnlineGraph::new`] with a fixed RNG seed.
    pub fn seeded(
        k: usize,
        similarity: Arc<dyn Similarity<T>>,
        initial: EdgeTable<T>,
        partitions: usize,
        seed: u64,
    ) -> Result<Self> {
        let searcher = ApproximateSearch::seeded(
            initial,
            PARTITIONING_ITERATIONS,
            partitions,
            Arc::clone(&similarity),
            seed,
        )?;
        Self::build(k, similarity, searcher)
    }

    fn build(
        k: usize,
        similarity: Arc<dyn Similarity<T>>,
        searcher: ApproximateSearch<T>,
    ) -> Result<Self> {
        if k == 0 {
            return Err(GraphError::InvalidParameter("k must be positive".into()));
        }
        let partitions_size = searcher.graph().partition_sizes();
        let mut online = Self {
            searcher,
            k,
            similarity,
            partitions_size,
            previous_versions: VecDeque::new(),
            search_speedup: DEFAULT_SEARCH_SPEEDUP,
            medoid_update_ratio: DEFAULT_MEDOID_UPDATE_RATIO,
            nodes_added: 0,
            nodes_before_update_medoids: 0,
            stats: OnlineStats::default(),
        };
        online.nodes_before_update_medoids = online.countdown();
        Ok(online)
    }

    /// Total number of nodes currently in the graph.
    pub fn size(&self) -> u64 {
        self.partitions_size.iter().sum()
    }

    /// Per-partition node counts.
    pub fn partition_sizes(&self) -> &[u64] {
        &self.partitions_size
    }

    pub fn stats(&self) -> OnlineStats {
        self.stats
    }

    /// Budget multiplier for the insertion search: the search spends at most
    /// `search_speedup * k` similarity computations (default 4).
    pub fn set_search_speedup(&mut self, search_speedup: usize) -> Result<()> {
        if search_speedup == 0 {
            return Err(GraphError::InvalidParameter(
                "search speedup must be at least 1".into(),
            ));
        }
        self.search_speedup = search_speedup;
        Ok(())
    }

    /// Fraction of the graph size to insert before medoids are recomputed
    /// (default 0.1; 0 disables medoid refreshes).
    pub fn set_medoid_update_ratio(&mut self, update_ratio: f64) -> Result<()> {
        if !(update_ratio >= 0.0) {
            return Err(GraphError::InvalidParameter(
                "medoid update ratio must be >= 0".into(),
            ));
        }
        self.medoid_update_ratio = update_ratio;
        self.nodes_before_update_medoids = self.countdown();
        Ok(())
    }

    /// Insert a node: find its neighbors, assign it to a partition under the
    /// capacity constraint, attach back-edges in its two-hop neighborhood,
    /// and append its own entry to its partition's subgraph.
    pub fn add_node(&mut self, mut node: Node<T>) {
        let list = self
            .searcher
            .search(&node.value, self.k, self.search_speedup * self.k);

        let partition = self.searcher.assign(&mut node, &self.partitions_size);
        self.partitions_size[partition as usize] += 1;

        let current = Arc::clone(self.searcher.graph());
        let similarity = Arc::clone(&self.similarity);
        let back_node = node.clone();
        let back_list = list.clone();
        let mut updated = current.map_shards(move |mut shard| {
            attach_back_edges(&mut shard, &back_node, &back_list, similarity.as_ref());
            shard
        });

        if let Some(shard) = updated.shard_mut(partition as usize) {
            debug_assert!(
                shard
                    .nodes()
                    .next()
                    .is_none_or(|existing| existing.partition == node.partition),
                "appending to a shard of a different partition"
            );
            shard.put(node, list);
        }

        self.nodes_added += 1;
        self.stats.nodes_added += 1;
        if self.nodes_added % INSERTIONS_BETWEEN_CHECKPOINTS == 0 {
            updated.checkpoint();
            self.stats.checkpoints += 1;
            debug!(nodes_added = self.nodes_added, "checkpointed graph version");
        }

        let updated = Arc::new(updated);
        self.searcher.set_graph(Arc::clone(&updated));

        // Retain the two most recent versions; release anything older.
        self.previous_versions.push_back(updated);
        while self.previous_versions.len() > 2 {
            drop(self.previous_versions.pop_front());
        }

        if self.nodes_before_update_medoids > 0 {
            self.nodes_before_update_medoids -= 1;
            if self.nodes_before_update_medoids == 0 {
                let graph = Arc::clone(self.searcher.graph());
                self.searcher.partitioner_mut().compute_new_medoids(&graph);
                self.stats.medoid_refreshes += 1;
                self.nodes_before_update_medoids = self.countdown();
            }
        }
    }

    /// Remove a node with bounded approximate repair.
    ///
    /// Every node that held the removed node in its neighbor list gets the
    /// entry dropped and is offered every candidate found within three hops
    /// of the affected neighborhood; the list's own eviction rule keeps the
    /// best k.
    pub fn fast_remove(&mut self, node: &Node<T>) {
        let target = node.id;
        let current = Arc::clone(self.searcher.graph());

        let to_update: Vec<NodeId> = current.flat_map_shards(|shard| {
            shard
                .entries()
                .filter(|(_, list)| list.contains(target))
                .map(|(n, _)| n.id)
                .collect()
        });

        let mut initial = Vec::with_capacity(to_update.len() + 1);
        initial.push(target);
        initial.extend(&to_update);

        let candidates: Vec<Node<T>> = current
            .flat_map_shards(|shard| shard.find_neighbors(&initial, REMOVAL_EXPAND_DEPTH))
            .into_iter()
            .filter(|candidate| candidate.id != target)
            .collect();

        let removed_partition = current.partition_of(target);

        let similarity = Arc::clone(&self.similarity);
        let updated = current.map_shards(|mut shard| {
            shard.remove(target);
            for &affected in &to_update {
                let Some(affected_node) = shard.node(affected) else {
                    // Belongs to another subgraph.
                    continue;
                };
                let affected_value = affected_node.value.clone();
                let scored: Vec<(NodeId, f64)> = candidates
                    .iter()
                    .map(|c| (c.id, similarity.similarity(&affected_value, &c.value)))
                    .collect();

                let Some(list) = shard.get_mut(affected) else {
                    continue;
                };
                list.remove(target);
                for (id, sim) in scored {
                    list.add(Neighbor::new(id, sim));
                }
            }
            shard
        });

        self.searcher.set_graph(Arc::new(updated));
        if let Some(p) = removed_partition {
            self.partitions_size[p] = self.partitions_size[p].saturating_sub(1);
        }
        self.stats.nodes_removed += 1;
        debug!(node = %target, "removed node");
    }

    /// The current graph as an edge table.
    pub fn get_graph(&self) -> EdgeTable<T> {
        self.searcher.graph().edge_table()
    }

    /// The current graph in its subgraph-per-partition representation.
    pub fn get_distributed_graph(&self) -> Arc<DistributedGraph<T>> {
        Arc::clone(self.searcher.graph())
    }

    fn countdown(&self) -> u64 {
        if self.medoid_update_ratio == 0.0 {
            return u64::MAX;
        }
        ((self.size() as f64 * self.medoid_update_ratio) as u64).max(1)
    }
}

/// Offer the new node as a neighbor throughout its two-hop neighborhood.
///
/// Starting from the new node's own neighbors, each round pops every node to
/// analyze, enqueues its not-yet-visited neighbors for the next round, and
/// tries to insert the new node into its list (the list's eviction rule
/// decides). Nodes whose list lives in another partition are skipped.
fn attach_back_edges<T: Clone>(
    shard: &mut Graph<T>,
    node: &Node<T>,
    list: &NeighborList,
    similarity: &dyn Similarity<T>,
) {
    let mut analyze: VecDeque<NodeId> = list.iter().map(|n| n.node).collect();
    let mut next: VecDeque<NodeId> = VecDeque::new();
    let mut visited: HashSet<NodeId> = HashSet::new();

    for _ in 0..UPDATE_DEPTH {
        while let Some(other) = analyze.pop_front() {
            let Some(other_node) = shard.node(other) else {
                // This part of the graph is in another partition.
                continue;
            };
            let sim = similarity.similarity(&node.value, &other_node.value);

            if let Some(other_list) = shard.get(other) {
                for neighbor in other_list.iter() {
                    if !visited.contains(&neighbor.node) {
                        next.push_back(neighbor.node);
                    }
                }
            }

            if let Some(other_list) = shard.get_mut(other) {
                other_list.add(Neighbor::new(node.id, sim));
            }
            visited.insert(other);
        }
        std::mem::swap(&mut analyze, &mut next);
        next.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Brute;
    use crate::similarity::L2Similarity;

    fn gaussian_points(n: usize, seed: u64) -> Vec<Vec<f64>> {
        crate::dataset::GaussianMixture::new(4, 3)
            .with_size(n)
            .with_seed(seed)
            .generate()
    }

    fn small_online(n: usize, partitions: usize) -> OnlineGraph<Vec<f64>> {
        let mut brute = Brute::new();
        brute.set_k(4).unwrap();
        brute.set_similarity(Arc::new(L2Similarity));
        let initial = brute.compute_graph(gaussian_points(n, 77)).unwrap();
        OnlineGraph::seeded(4, Arc::new(L2Similarity), initial, partitions, 13).unwrap()
    }

    #[test]
    fn rejects_zero_k() {
        let err = OnlineGraph::new(0, Arc::new(L2Similarity), Vec::new(), 2);
        assert!(err.is_err());
    }

    #[test]
    fn add_node_grows_exactly_one_partition() {
        let mut online = small_online(60, 3);
        let before = online.partition_sizes().to_vec();
        let before_size = online.size();

        let node = Node::new(NodeId(10_000), vec![0.5, 0.5, 0.5]);
        online.add_node(node.clone());

        assert_eq!(online.size(), before_size + 1);
        let after = online.partition_sizes();
        let grown: Vec<usize> = (0..after.len())
            .filter(|&p| after[p] != before[p])
            .collect();
        assert_eq!(grown.len(), 1);
        assert_eq!(after[grown[0]], before[grown[0]] + 1);

        // The inserted node is discoverable in its shard with its own list.
        let graph = online.get_distributed_graph();
        let p = graph.partition_of(node.id).expect("node present");
        assert_eq!(grown[0], p);
        let list = graph.shard(p).unwrap().get(node.id).unwrap();
        assert!(list.len() <= 4);
        assert!(!list.contains(node.id));
    }

    #[test]
    fn fast_remove_erases_every_reference() {
        let mut online = small_online(60, 2);
        let node = Node::new(NodeId(10_000), vec![0.4, 0.4, 0.4]);
        online.add_node(node.clone());
        let size_after_add = online.size();

        online.fast_remove(&node);

        assert_eq!(online.size(), size_after_add - 1);
        let graph = online.get_distributed_graph();
        assert!(graph.partition_of(node.id).is_none());
        for shard in graph.shards() {
            for (_, list) in shard.entries() {
                assert!(!list.contains(node.id));
            }
        }
    }

    #[test]
    fn checkpoints_every_hundred_insertions() {
        let mut online = small_online(30, 2);
        for i in 0..120u64 {
            online.add_node(Node::new(NodeId(20_000 + i), vec![0.1, 0.2, 0.3]));
        }
        assert_eq!(online.stats().checkpoints, 1);
    }

    #[test]
    fn short_neighbor_lists_are_not_an_error() {
        // k larger than the graph: the returned lists are just shorter.
        let mut brute = Brute::new();
        brute.set_k(8).unwrap();
        brute.set_similarity(Arc::new(L2Similarity));
        let initial = brute.compute_graph(gaussian_points(5, 3)).unwrap();
        let mut online =
            OnlineGraph::seeded(8, Arc::new(L2Similarity), initial, 2, 5).unwrap();

        online.add_node(Node::new(NodeId(9_000), vec![0.0, 0.0, 0.0]));
        assert_eq!(online.size(), 6);
    }
}
