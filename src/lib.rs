//! Netpack stores directed transportation networks in a GeoPackage file and
//! answers shortest-path and proximity queries without loading the graph
//! into memory.
//!
//! The layers, bottom up:
//!
//! * [`storage`]: the spatial container and its feature tables, with a
//!   synchronized bounding-box index.
//! * [`graph`]: the node/edge tables, mapping-style adjacency views, batched
//!   ingestion and the Dijkstra path engine.
//! * [`geom`]: the geometry model and its binary codecs.

#![warn(missing_docs)]

pub mod error;
pub mod geom;
pub mod graph;
pub mod storage;

pub use error::{GraphError, Result};
pub use graph::{
    costs, AdjacencyRead, Dijkstra, Dir, EdgeAttributes, EdgeHit, EdgeRecord, GraphStore, IngestOptions,
    IngestSummary, InnerAdjacency, IntoEdge, NodeHit, NodeStore, OuterAdjacency, ShortestPaths,
};
pub use storage::{AttrValue, Attrs, StoreOptions};
