//! Exact brute-force graph construction.
//!
//! The O(N²) baseline builder: every pair of nodes is compared once per
//! direction, rows run in parallel. Useful as ground truth and as the bulk
//! builder feeding [`ApproximateSearch`](crate::search::ApproximateSearch)
//! and [`OnlineGraph`](crate::online::OnlineGraph).

use crate::distributed::EdgeTable;
use crate::error::{GraphError, Result};
use crate::neighbors::{Neighbor, NeighborList};
use crate::node::{Node, NodeId};
use crate::similarity::Similarity;
use rayon::prelude::*;
use std::sync::Arc;

const DEFAULT_K: usize = 10;

/// Exact k-NN graph builder.
pub struct Brute<T> {
    k: usize,
    similarity: Option<Arc<dyn Similarity<T>>>,
}

impl<T> Default for Brute<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Brute<T> {
    pub fn new() -> Self {
        Self {
            k: DEFAULT_K,
            similarity: None,
        }
    }

    /// Number of edges per node (default 10).
    pub fn set_k(&mut self, k: usize) -> Result<()> {
        if k == 0 {
            return Err(GraphError::InvalidParameter("k must be positive".into()));
        }
        self.k = k;
        Ok(())
    }

    /// Similarity used for computing edges. Any measure works, metric or
    /// not.
    pub fn set_similarity(&mut self, similarity: Arc<dyn Similarity<T>>) {
        self.similarity = Some(similarity);
    }
}

impl<T: Clone + Send + Sync> Brute<T> {
    /// Compute the exact graph over raw values; node ids are assigned
    /// sequentially from 0.
    pub fn compute_graph(&self, values: Vec<T>) -> Result<EdgeTable<T>> {
        let nodes = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Node::new(NodeId(i as u64), value))
            .collect();
        self.compute_graph_from_nodes(nodes)
    }

    /// Compute the exact graph over pre-identified nodes.
    pub fn compute_graph_from_nodes(&self, nodes: Vec<Node<T>>) -> Result<EdgeTable<T>> {
        let similarity = self
            .similarity
            .as_ref()
            .ok_or(GraphError::SimilarityUndefined)?;

        Ok(nodes
            .par_iter()
            .map(|node| {
                let mut list = NeighborList::new(self.k);
                for other in &nodes {
                    if other.id == node.id {
                        continue;
                    }
                    let sim = similarity.similarity(&node.value, &other.value);
                    list.add(Neighbor::new(other.id, sim));
                }
                (node.clone(), list)
            })
            .collect())
    }
}
