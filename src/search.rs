//! Distributed approximate search.
//!
//! Construction partitions the input graph with [`BalancedKMedoids`] and
//! caches the partitioned collection. A query is then answered by running
//! the bounded greedy walk of [`Graph::search`](crate::graph::Graph::search)
//! independently in every shard with a per-partition share of the similarity
//! budget, and merging the per-shard top-k lists on the driver.
//!
//! The contract is boundedness, not accuracy: the result is the merge of
//! each shard's top-k findings under its budget.

use crate::distributed::{DistributedGraph, EdgeTable};
use crate::error::Result;
use crate::neighbors::NeighborList;
use crate::node::Node;
use crate::partitioner::BalancedKMedoids;
use crate::similarity::Similarity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;

/// Default maximum number of hops per greedy walk.
pub const DEFAULT_GNSS_DEPTH: usize = 100;

/// Default start-set expansion factor.
pub const DEFAULT_GNSS_EXPANSION: f64 = 1.01;

/// Greedy search over a partitioned k-NN graph.
pub struct ApproximateSearch<T> {
    graph: Arc<DistributedGraph<T>>,
    partitioner: BalancedKMedoids<T>,
    similarity: Arc<dyn Similarity<T>>,
    seed: Option<u64>,
}

impl<T: Clone + Send + Sync> ApproximateSearch<T> {
    /// Partition `entries` into `partitions` shards (`iterations` k-medoids
    /// passes) and cache the result for searching.
    pub fn new(
        entries: EdgeTable<T>,
        iterations: usize,
        partitions: usize,
        similarity: Arc<dyn Similarity<T>>,
    ) -> Result<Self> {
        let partitioner = BalancedKMedoids::new(partitions, Arc::clone(&similarity))?
            .with_iterations(iterations)?;
        Ok(Self::build(partitioner, entries, similarity, None))
    }

    /// Like [`ApproximateSearch::new`] with a fixed RNG seed, for
    /// reproducible partitioning and start sampling.
    pub fn seeded(
        entries: EdgeTable<T>,
        iterations: usize,
        partitions: usize,
        similarity: Arc<dyn Similarity<T>>,
        seed: u64,
    ) -> Result<Self> {
        let partitioner = BalancedKMedoids::new(partitions, Arc::clone(&similarity))?
            .with_iterations(iterations)?
            .with_seed(seed);
        Ok(Self::build(partitioner, entries, similarity, Some(seed)))
    }

    fn build(
        mut partitioner: BalancedKMedoids<T>,
        entries: EdgeTable<T>,
        similarity: Arc<dyn Similarity<T>>,
        seed: Option<u64>,
    ) -> Self {
        let graph = Arc::new(partitioner.partition(entries));
        Self {
            graph,
            partitioner,
            similarity,
            seed,
        }
    }

    /// Search with default depth and expansion.
    pub fn search(&self, query: &T, k: usize, max_similarities: usize) -> NeighborList {
        self.search_with(
            query,
            k,
            max_similarities,
            DEFAULT_GNSS_DEPTH,
            DEFAULT_GNSS_EXPANSION,
        )
    }

    /// Search every shard with a budget of `max_similarities / partitions`
    /// similarity computations each, and merge the per-shard results into a
    /// single size-k list.
    pub fn search_with(
        &self,
        query: &T,
        k: usize,
        max_similarities: usize,
        depth: usize,
        expansion: f64,
    ) -> NeighborList {
        let partitions = self.partitioner.partitions();
        let budget_per_partition = max_similarities / partitions;

        let seeds: Vec<u64> = match self.seed {
            Some(seed) => (0..self.graph.num_shards() as u64)
                .map(|i| seed.wrapping_add(i.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
                .collect(),
            None => {
                let mut rng = rand::rng();
                (0..self.graph.num_shards()).map(|_| rng.random()).collect()
            }
        };

        let similarity = Arc::clone(&self.similarity);
        let candidates: Vec<NeighborList> = self
            .graph
            .shards()
            .par_iter()
            .zip(seeds)
            .map(|(shard, seed)| {
                shard.search_with_rng(
                    query,
                    k,
                    similarity.as_ref(),
                    budget_per_partition,
                    depth,
                    expansion,
                    &mut StdRng::seed_from_u64(seed),
                )
            })
            .collect();

        let mut merged = NeighborList::new(k);
        for list in candidates {
            merged.add_all(&list);
        }
        merged
    }

    /// Assign a node to a partition online (most similar medoid under the
    /// global capacity constraint) and stamp its `partition` attribute.
    pub fn assign(&mut self, node: &mut Node<T>, partition_sizes: &[u64]) -> u32 {
        self.partitioner.assign(node, partition_sizes)
    }

    /// The cached partitioned graph.
    pub fn graph(&self) -> &Arc<DistributedGraph<T>> {
        &self.graph
    }

    /// Replace the cached graph with a new version (functional update).
    pub(crate) fn set_graph(&mut self, graph: Arc<DistributedGraph<T>>) {
        self.graph = graph;
    }

    pub(crate) fn partitioner_mut(&mut self) -> &mut BalancedKMedoids<T> {
        &mut self.partitioner
    }

    pub fn partitions(&self) -> usize {
        self.partitioner.partitions()
    }
}
