//! The distributed graph representation.
//!
//! A [`DistributedGraph`] holds one [`Graph`] per partition; the shard index
//! is the partition id. Two equivalent views are supported and
//! interconvertible: the *edge-table* view (a flat list of
//! `(Node, NeighborList)` tuples) and the *subgraph* view (one graph per
//! shard). Conversions are inverses up to partition order.
//!
//! Per-shard stages (map, flat-map) run on the rayon pool; the caller is the
//! single-threaded driver, and every stage boundary is a barrier. This is
//! the in-process backend of the partitioned-collection capability set —
//! map per shard, flat-map, collect, checkpoint, release — so a distributed
//! substrate could replace it without touching the layers above.

use crate::error::Result;
use crate::graph::Graph;
use crate::neighbors::NeighborList;
use crate::node::{Node, NodeId};
use rayon::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A flat list of (node, neighbor list) tuples: the edge-table view.
pub type EdgeTable<T> = Vec<(Node<T>, NeighborList)>;

/// A graph sharded by partition: shard `p` holds the nodes whose
/// `partition` attribute is `p`.
#[derive(Debug, Clone, Default)]
pub struct DistributedGraph<T> {
    shards: Vec<Graph<T>>,
}

impl<T> DistributedGraph<T> {
    pub fn new(shards: Vec<Graph<T>>) -> Self {
        Self { shards }
    }

    /// A graph with `partitions` empty shards.
    pub fn empty(partitions: usize) -> Self {
        Self {
            shards: (0..partitions).map(|_| Graph::new()).collect(),
        }
    }

    pub fn shards(&self) -> &[Graph<T>] {
        &self.shards
    }

    pub fn shard(&self, partition: usize) -> Option<&Graph<T>> {
        self.shards.get(partition)
    }

    pub(crate) fn shard_mut(&mut self, partition: usize) -> Option<&mut Graph<T>> {
        self.shards.get_mut(partition)
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Total number of nodes across all shards.
    pub fn count(&self) -> usize {
        self.shards.iter().map(Graph::len).sum()
    }

    /// Number of nodes per shard.
    pub fn partition_sizes(&self) -> Vec<u64> {
        self.shards.iter().map(|g| g.len() as u64).collect()
    }

    /// The shard currently holding `id`, if any.
    pub fn partition_of(&self, id: NodeId) -> Option<usize> {
        self.shards.iter().position(|g| g.contains(id))
    }

    /// Release spare storage in every shard, the in-process equivalent of
    /// materializing the collection.
    pub(crate) fn checkpoint(&mut self) {
        for shard in &mut self.shards {
            shard.compact();
        }
    }
}

impl<T: Clone + Send + Sync> DistributedGraph<T> {
    /// Group an edge table into the subgraph view.
    ///
    /// Each node lands in the shard named by its `partition` attribute
    /// (stamped by the partitioner); nodes without one fall back to
    /// `id % partitions`.
    pub fn from_edge_table(entries: EdgeTable<T>, partitions: usize) -> Self {
        let mut shards: Vec<Graph<T>> = (0..partitions.max(1)).map(|_| Graph::new()).collect();
        let n = shards.len();
        for (node, list) in entries {
            let p = match node.partition {
                Some(p) => p as usize % n,
                None => (node.id.0 as usize) % n,
            };
            shards[p].put(node, list);
        }
        Self { shards }
    }

    /// Flatten the subgraph view back into an edge table.
    pub fn edge_table(&self) -> EdgeTable<T> {
        self.shards
            .par_iter()
            .map(|shard| {
                shard
                    .entries()
                    .map(|(node, list)| (node.clone(), list.clone()))
                    .collect::<Vec<_>>()
            })
            .flatten()
            .collect()
    }

    /// Apply a pure function to every shard in parallel, producing the next
    /// version of the graph. The receiver is unchanged (functional update).
    pub fn map_shards<F>(&self, f: F) -> Self
    where
        F: Fn(Graph<T>) -> Graph<T> + Sync,
    {
        Self {
            shards: self.shards.par_iter().map(|g| f(g.clone())).collect(),
        }
    }

    /// Run a pure function over every shard in parallel and collect the
    /// concatenated results on the driver.
    pub fn flat_map_shards<F, R>(&self, f: F) -> Vec<R>
    where
        F: Fn(&Graph<T>) -> Vec<R> + Sync,
        R: Send,
    {
        self.shards.par_iter().map(|g| f(g)).flatten().collect()
    }
}

/// Persist an edge table as JSON.
pub fn save_edge_table<T, P>(path: P, entries: &EdgeTable<T>) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, entries)?;
    Ok(())
}

/// Load an edge table previously written by [`save_edge_table`].
pub fn load_edge_table<T, P>(path: P) -> Result<EdgeTable<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
