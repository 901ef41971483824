//! vicinage: partitioned approximate k-NN graphs.
//!
//! Builds, partitions, searches and incrementally maintains an approximate
//! k-nearest-neighbor graph over a collection of value-bearing nodes, under
//! any caller-supplied similarity (higher = more similar; neither symmetry
//! nor metric properties required).
//!
//! # Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`node`] / [`neighbors`] | Identity, payloads, bounded top-k neighbor lists |
//! | [`graph`] | Local subgraph: greedy search, SCCs, eccentricity, BFS expansion |
//! | [`distributed`] | One subgraph per partition; edge-table ↔ subgraph views |
//! | [`partitioner`] | Balanced k-medoids with a soft capacity constraint |
//! | [`search`] | Per-partition greedy search fused into a collect-and-merge |
//! | [`online`] | Insertion and removal with bounded local work |
//! | [`builder`] | Exact O(N²) baseline builder |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vicinage::builder::Brute;
//! use vicinage::online::OnlineGraph;
//! use vicinage::similarity::L2Similarity;
//! use vicinage::{Node, NodeId};
//!
//! # fn main() -> vicinage::Result<()> {
//! let points: Vec<Vec<f64>> = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
//!
//! let mut brute = Brute::new();
//! brute.set_k(2)?;
//! brute.set_similarity(Arc::new(L2Similarity));
//! let graph = brute.compute_graph(points)?;
//!
//! let mut online = OnlineGraph::new(2, Arc::new(L2Similarity), graph, 2)?;
//! online.add_node(Node::new(NodeId(1000), vec![0.5, 0.5]));
//! assert_eq!(online.size(), 4);
//! # Ok(())
//! # }
//! ```
//!
//! # Accuracy
//!
//! Results are approximate by design. The partitioned search merges each
//! shard's findings under a bounded similarity budget; online removal
//! repairs affected neighbor lists from a local candidate pool rather than
//! a global search. The only guarantee is boundedness of the work and of
//! the result size.

pub mod builder;
pub mod dataset;
pub mod distributed;
pub mod error;
pub mod graph;
pub mod neighbors;
pub mod node;
pub mod online;
pub mod partitioner;
pub mod search;
pub mod similarity;

pub use error::{GraphError, Result};
pub use neighbors::{Neighbor, NeighborList};
pub use node::{Node, NodeId};
pub use similarity::Similarity;
