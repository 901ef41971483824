//! Balanced k-medoids partitioning of a k-NN graph.
//!
//! Assigns every node to one of P partitions by iteratively refining P
//! medoids. Assignment is an online, per-shard greedy pass with a soft
//! capacity penalty: each node is scored against every medoid as
//! `similarity * (1 - used / capacity)` and sent to the argmax. The penalty
//! turns a score negative once a bucket is at capacity, which redirects
//! overflow to less loaded partitions without any global coordination; with
//! all-negative scores the argmax still picks the least-negative bucket.
//!
//! After each assignment pass the tuples are shuffled so that shard p holds
//! partition p, and each medoid is recomputed as the graph-theoretic center
//! (minimum positive eccentricity) of the largest strongly connected
//! component of its partition — not the classical k-medoids cost minimizer.

use crate::distributed::{DistributedGraph, EdgeTable};
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::neighbors::NeighborList;
use crate::node::{Node, NodeId};
use crate::similarity::Similarity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_ITERATIONS: usize = 5;
const DEFAULT_IMBALANCE: f64 = 1.05;

/// Iterative balanced k-medoids partitioner.
///
/// Retains its refined medoids so that single nodes can be assigned online
/// afterwards (see [`BalancedKMedoids::assign`]).
pub struct BalancedKMedoids<T> {
    partitions: usize,
    iterations: usize,
    imbalance: f64,
    similarity: Arc<dyn Similarity<T>>,
    rng: StdRng,
    medoids: Vec<Node<T>>,
}

impl<T> BalancedKMedoids<T> {
    /// Create a partitioner for `partitions` shards.
    pub fn new(partitions: usize, similarity: Arc<dyn Similarity<T>>) -> Result<Self> {
        if partitions == 0 {
            return Err(GraphError::InvalidParameter(
                "partitions must be at least 1".into(),
            ));
        }
        Ok(Self {
            partitions,
            iterations: DEFAULT_ITERATIONS,
            imbalance: DEFAULT_IMBALANCE,
            similarity,
            rng: StdRng::seed_from_u64(rand::rng().random()),
            medoids: Vec::new(),
        })
    }

    /// Number of refinement passes (default 5).
    pub fn with_iterations(mut self, iterations: usize) -> Result<Self> {
        if iterations == 0 {
            return Err(GraphError::InvalidParameter(
                "iterations must be at least 1".into(),
            ));
        }
        self.iterations = iterations;
        Ok(self)
    }

    /// Per-shard capacity multiplier (default 1.05).
    pub fn with_imbalance(mut self, imbalance: f64) -> Result<Self> {
        if !(imbalance >= 1.0) {
            return Err(GraphError::InvalidParameter(
                "imbalance must be at least 1.0".into(),
            ));
        }
        self.imbalance = imbalance;
        Ok(self)
    }

    /// Seed the tie-break and sampling RNG. With a fixed seed and identical
    /// input, repeated runs produce identical partition assignments.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// The current medoids, one per partition. Empty before the first
    /// [`BalancedKMedoids::partition`] call.
    pub fn medoids(&self) -> &[Node<T>] {
        &self.medoids
    }
}

impl<T: Clone + Send + Sync> BalancedKMedoids<T> {
    /// Partition an edge table into a [`DistributedGraph`].
    ///
    /// Runs the configured number of assignment/shuffle/recompute passes and
    /// returns the final shuffled collection with the `partition` attribute
    /// stamped on every node.
    pub fn partition(&mut self, entries: EdgeTable<T>) -> DistributedGraph<T> {
        let n = entries.len();
        if n == 0 {
            return DistributedGraph::empty(self.partitions);
        }

        self.medoids = self.sample_initial_medoids(&entries);

        // Initial shards: contiguous chunks of the input, the arrival order
        // a bulk builder would hand over.
        let chunk = n.div_ceil(self.partitions);
        let mut shards: Vec<EdgeTable<T>> = (0..self.partitions).map(|_| Vec::new()).collect();
        for (i, entry) in entries.into_iter().enumerate() {
            shards[i / chunk].push(entry);
        }

        for iteration in 0..self.iterations {
            shards = self.refine(shards, iteration);
        }

        let graphs: Vec<Graph<T>> = shards
            .into_iter()
            .enumerate()
            .map(|(p, entries)| {
                let mut graph = Graph::new();
                for (mut node, list) in entries {
                    node.partition = Some(p as u32);
                    graph.put(node, list);
                }
                graph
            })
            .collect();

        DistributedGraph::new(graphs)
    }

    /// One refinement pass: per-shard capacity-penalized assignment, shuffle
    /// by partition id, medoid recomputation.
    fn refine(&mut self, shards: Vec<EdgeTable<T>>, iteration: usize) -> Vec<EdgeTable<T>> {
        let seeds: Vec<u64> = (0..shards.len()).map(|_| self.rng.random()).collect();
        let similarity = Arc::clone(&self.similarity);
        let medoids = self.medoids.clone();
        let (imbalance, partitions) = (self.imbalance, self.partitions);

        let assigned: Vec<Vec<(u32, Node<T>, NeighborList)>> = shards
            .into_par_iter()
            .zip(seeds)
            .map(|(shard, seed)| {
                assign_shard(
                    shard,
                    &medoids,
                    similarity.as_ref(),
                    imbalance,
                    partitions,
                    &mut StdRng::seed_from_u64(seed),
                )
            })
            .collect();

        // Shuffle: all tuples of partition p end up in shard p. The modulo
        // is defensive; assignments are already in [0, P).
        let mut next: Vec<EdgeTable<T>> = (0..partitions).map(|_| Vec::new()).collect();
        for bucket in assigned {
            for (p, node, list) in bucket {
                next[p as usize % partitions].push((node, list));
            }
        }

        let recomputed: Vec<Option<Node<T>>> = next
            .par_iter()
            .map(|entries| {
                if entries.is_empty() {
                    return None;
                }
                let mut graph = Graph::new();
                for (node, list) in entries {
                    graph.put(node.clone(), list.clone());
                }
                medoid_of_graph(&graph)
            })
            .collect();

        let mut refreshed = 0usize;
        for (p, medoid) in recomputed.into_iter().enumerate() {
            // An empty partition keeps its previous medoid.
            if let Some(medoid) = medoid {
                self.medoids[p] = medoid;
                refreshed += 1;
            }
        }

        debug!(iteration, refreshed, "partitioner refinement pass done");
        next
    }

    /// Assign a single node online, against the current medoids and the
    /// current global partition sizes, and stamp its `partition` attribute.
    ///
    /// The capacity here is the global `imbalance * total / partitions`
    /// rather than a per-shard constraint.
    pub fn assign(&mut self, node: &mut Node<T>, partition_sizes: &[u64]) -> u32 {
        let total: u64 = partition_sizes.iter().sum();
        let capacity = self.imbalance * total as f64 / self.partitions as f64;

        let values: Vec<f64> = self
            .medoids
            .iter()
            .enumerate()
            .map(|(p, medoid)| {
                let sim = self.similarity.similarity(&medoid.value, &node.value);
                if capacity > 0.0 {
                    sim * (1.0 - partition_sizes[p] as f64 / capacity)
                } else {
                    sim
                }
            })
            .collect();

        let p = argmax(&values, &mut self.rng) as u32;
        node.partition = Some(p);
        p
    }

    /// Recompute every medoid from the current subgraphs. Empty shards keep
    /// their previous medoid.
    pub fn compute_new_medoids(&mut self, graph: &DistributedGraph<T>) {
        let recomputed: Vec<Option<Node<T>>> = graph
            .shards()
            .par_iter()
            .map(|shard| medoid_of_graph(shard))
            .collect();

        for (p, medoid) in recomputed.into_iter().enumerate() {
            if p >= self.medoids.len() {
                break;
            }
            if let Some(medoid) = medoid {
                self.medoids[p] = medoid;
            }
        }
        debug!("medoids recomputed");
    }

    /// Approximately uniform sample of initial medoids: a 10·P-sized sample
    /// of the edge table, first P distinct nodes. Tiny graphs resample with
    /// replacement.
    fn sample_initial_medoids(&mut self, entries: &EdgeTable<T>) -> Vec<Node<T>> {
        let n = entries.len();
        let sample_size = (10 * self.partitions).clamp(1, n);
        let picked = rand::seq::index::sample(&mut self.rng, n, sample_size);

        let mut medoids: Vec<Node<T>> = picked
            .iter()
            .take(self.partitions)
            .map(|i| entries[i].0.clone())
            .collect();
        while medoids.len() < self.partitions {
            let i = self.rng.random_range(0..n);
            medoids.push(entries[i].0.clone());
        }
        medoids
    }
}

/// Stream one shard's tuples in arrival order, scoring each against every
/// medoid with the running capacity penalty `sim * (1 - used / C)` where
/// `C = ceil(imbalance * n / partitions)`. Scores can go negative once a
/// bucket is at capacity; the argmax then picks the least-negative bucket.
fn assign_shard<T>(
    tuples: EdgeTable<T>,
    medoids: &[Node<T>],
    similarity: &dyn Similarity<T>,
    imbalance: f64,
    partitions: usize,
    rng: &mut StdRng,
) -> Vec<(u32, Node<T>, NeighborList)> {
    let n = tuples.len();
    if n == 0 {
        return Vec::new();
    }
    let capacity = (imbalance * n as f64 / partitions as f64).ceil();
    let mut used = vec![0u64; partitions];

    tuples
        .into_iter()
        .map(|(node, list)| {
            let values: Vec<f64> = medoids
                .iter()
                .enumerate()
                .map(|(p, medoid)| {
                    let sim = similarity.similarity(&medoid.value, &node.value);
                    sim * (1.0 - used[p] as f64 / capacity)
                })
                .collect();
            let p = argmax(&values, rng);
            used[p] += 1;
            (p as u32, node, list)
        })
        .collect()
}

/// Index of the maximum value; exact ties are broken uniformly at random.
fn argmax(values: &[f64], rng: &mut StdRng) -> usize {
    let mut best = f64::NEG_INFINITY;
    let mut ties: Vec<usize> = Vec::new();
    for (i, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            ties.clear();
            ties.push(i);
        } else if v == best {
            ties.push(i);
        }
    }
    match ties.len() {
        0 => 0,
        1 => ties[0],
        len => ties[rng.random_range(0..len)],
    }
}

/// The medoid of one partition: on the largest strongly connected component
/// (ties: smallest minimum node id), the node with the smallest positive
/// eccentricity. Nodes with eccentricity 0 are isolated and skipped; if the
/// component has no intra-component edges at all, the smallest node id wins.
fn medoid_of_graph<T: Clone>(graph: &Graph<T>) -> Option<Node<T>> {
    if graph.is_empty() {
        return None;
    }

    let components = graph.strongly_connected_components();
    let largest = components.into_iter().max_by(|a, b| {
        a.len()
            .cmp(&b.len())
            .then_with(|| min_id(b).cmp(&min_id(a)))
    })?;

    let mut member_ids: Vec<NodeId> = largest.nodes().map(|n| n.id).collect();
    member_ids.sort_unstable();

    let mut best: Option<(u32, NodeId)> = None;
    for &id in &member_ids {
        let ecc = largest.eccentricity(id);
        if ecc == 0 {
            continue;
        }
        if best.is_none_or(|(b, _)| ecc < b) {
            best = Some((ecc, id));
        }
    }

    let medoid_id = best.map(|(_, id)| id).unwrap_or(member_ids[0]);
    graph.node(medoid_id).cloned()
}

fn min_id<T>(graph: &Graph<T>) -> NodeId {
    graph
        .nodes()
        .map(|n| n.id)
        .min()
        .unwrap_or(NodeId(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::Neighbor;
    use crate::similarity::L2Similarity;

    /// A line of 1-d points where each node links to its `k` successors.
    fn line_entries(n: u64, k: usize) -> EdgeTable<Vec<f64>> {
        (0..n)
            .map(|i| {
                let mut list = NeighborList::new(k);
                for step in 1..=k as u64 {
                    if i + step < n {
                        list.add(Neighbor::new(NodeId(i + step), 1.0 / step as f64));
                    }
                }
                (Node::new(NodeId(i), vec![i as f64]), list)
            })
            .collect()
    }

    fn partitions_of(graph: &DistributedGraph<Vec<f64>>) -> Vec<(u64, u32)> {
        let mut out: Vec<(u64, u32)> = graph
            .shards()
            .iter()
            .flat_map(|g| g.nodes().map(|n| (n.id.0, n.partition.unwrap())))
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn rejects_invalid_parameters() {
        let sim = Arc::new(L2Similarity);
        assert!(BalancedKMedoids::<Vec<f64>>::new(0, sim.clone()).is_err());
        assert!(
            BalancedKMedoids::new(2, sim.clone())
                .unwrap()
                .with_imbalance(0.9)
                .is_err()
        );
        assert!(
            BalancedKMedoids::new(2, sim)
                .unwrap()
                .with_iterations(0)
                .is_err()
        );
    }

    #[test]
    fn every_node_gets_a_partition_in_range() {
        let mut partitioner = BalancedKMedoids::new(4, Arc::new(L2Similarity))
            .unwrap()
            .with_seed(11);
        let graph = partitioner.partition(line_entries(200, 5));

        assert_eq!(graph.count(), 200);
        for (p, shard) in graph.shards().iter().enumerate() {
            for node in shard.nodes() {
                let partition = node.partition.expect("partition stamped");
                assert_eq!(partition as usize, p);
                assert!((partition as usize) < 4);
            }
        }
    }

    #[test]
    fn assignment_respects_per_shard_capacity() {
        let entries = line_entries(100, 3);
        let medoids: Vec<Node<Vec<f64>>> = [10u64, 40, 70, 95]
            .iter()
            .map(|&i| Node::new(NodeId(i), vec![i as f64]))
            .collect();

        let assigned = assign_shard(
            entries,
            &medoids,
            &L2Similarity,
            1.05,
            4,
            &mut StdRng::seed_from_u64(3),
        );

        let mut counts = [0u64; 4];
        for (p, _, _) in &assigned {
            counts[*p as usize] += 1;
        }
        let bound = (1.05f64 * 100.0 / 4.0).ceil() as u64;
        for &count in &counts {
            assert!(count <= bound, "count {count} exceeds bound {bound}");
        }
    }

    #[test]
    fn identical_payloads_stay_balanced() {
        let entries: EdgeTable<Vec<f64>> = (0u64..80)
            .map(|i| (Node::new(NodeId(i), vec![1.0, 1.0]), NeighborList::new(2)))
            .collect();
        let medoids: Vec<Node<Vec<f64>>> = (0..4)
            .map(|i| Node::new(NodeId(i), vec![1.0, 1.0]))
            .collect();

        let assigned = assign_shard(
            entries,
            &medoids,
            &L2Similarity,
            1.05,
            4,
            &mut StdRng::seed_from_u64(5),
        );

        let mut counts = [0u64; 4];
        for (p, _, _) in &assigned {
            counts[*p as usize] += 1;
        }
        let bound = (1.05f64 * 80.0 / 4.0).ceil() as u64;
        for &count in &counts {
            assert!(count <= bound);
        }
    }

    #[test]
    fn same_seed_same_assignments() {
        let run = || {
            let mut partitioner = BalancedKMedoids::new(3, Arc::new(L2Similarity))
                .unwrap()
                .with_seed(42);
            partitions_of(&partitioner.partition(line_entries(120, 4)))
        };
        assert_eq!(run(), run());
    }

    /// A bidirectional ring: strongly connected, every node has the same
    /// eccentricity.
    fn ring_entries(n: u64) -> EdgeTable<Vec<f64>> {
        (0..n)
            .map(|i| {
                let mut list = NeighborList::new(2);
                list.add(Neighbor::new(NodeId((i + 1) % n), 0.9));
                list.add(Neighbor::new(NodeId((i + n - 1) % n), 0.8));
                (Node::new(NodeId(i), vec![i as f64]), list)
            })
            .collect()
    }

    #[test]
    fn single_partition_takes_graph_center() {
        let mut partitioner = BalancedKMedoids::new(1, Arc::new(L2Similarity))
            .unwrap()
            .with_seed(1);
        let graph = partitioner.partition(ring_entries(30));

        assert_eq!(graph.num_shards(), 1);
        assert_eq!(graph.shard(0).unwrap().len(), 30);

        // The medoid is the minimum-eccentricity node of the whole graph.
        let shard = graph.shard(0).unwrap();
        let medoid = partitioner.medoids()[0].id;
        let medoid_ecc = shard.eccentricity(medoid);
        assert!(medoid_ecc > 0);
        for node in shard.nodes() {
            let ecc = shard.eccentricity(node.id);
            if ecc > 0 {
                assert!(medoid_ecc <= ecc);
            }
        }
    }

    #[test]
    fn empty_input_yields_empty_shards() {
        let mut partitioner = BalancedKMedoids::new(3, Arc::new(L2Similarity)).unwrap();
        let graph = partitioner.partition(Vec::new());
        assert_eq!(graph.count(), 0);
        assert_eq!(graph.num_shards(), 3);
    }
}
