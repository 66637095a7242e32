//! Error type shared by the storage, graph and path layers.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by the container, the graph layer and the path engine.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Point lookup of a node key that is not stored.
    #[error("node {key:?} not found")]
    NodeNotFound {
        /// Key that was looked up.
        key: String,
    },
    /// Point lookup of an ordered node pair that has no edge.
    #[error("edge ({u:?}, {v:?}) not found")]
    EdgeNotFound {
        /// Source key.
        u: String,
        /// Target key.
        v: String,
    },
    /// A feature table with this name is already registered.
    #[error("table {table:?} already exists")]
    AlreadyExists {
        /// Conflicting table name.
        table: String,
    },
    /// Mutation attempted through a read-only graph.
    #[error("graph is read-only")]
    ImmutableGraph,
    /// Attribute mutation on an edge object with no (u, v) identity.
    #[error("edge has no (u, v) identity and cannot be written")]
    UninitializedEdge,
    /// The value cannot be mapped onto an INTEGER, REAL or TEXT column.
    #[error("attribute {key:?} has unsupported type {found}")]
    UnsupportedAttributeType {
        /// Attribute name.
        key: String,
        /// Description of the offending value.
        found: String,
    },
    /// Malformed edge tuple handed to the ingestion pipeline.
    #[error("invalid edge shape: {0}")]
    InvalidEdgeShape(String),
    /// Spatial query on a table that has no synchronized bounding-box index.
    #[error("table {table:?} has no spatial index")]
    MissingSpatialIndex {
        /// Table that was queried.
        table: String,
    },
    /// Relaxation found a shorter path to a finalized node.
    #[error("contradictory paths found at node {node:?}: negative weights?")]
    ContradictoryPath {
        /// Node whose finalized distance was undercut.
        node: String,
    },
    /// The target was never reached from any source.
    #[error("no path to {target:?}")]
    NoPath {
        /// Unreachable target.
        target: String,
    },
    /// Geometry blob or WKB payload could not be decoded.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// Caller supplied an argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Container metadata disagrees with the stored tables.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Storage engine failure, propagated unchanged.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GraphError {
    pub(crate) fn node_not_found(key: impl Into<String>) -> Self {
        GraphError::NodeNotFound { key: key.into() }
    }

    pub(crate) fn edge_not_found(u: impl Into<String>, v: impl Into<String>) -> Self {
        GraphError::EdgeNotFound {
            u: u.into(),
            v: v.into(),
        }
    }

    /// Returns true for the typed point-lookup misses.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GraphError::NodeNotFound { .. } | GraphError::EdgeNotFound { .. }
        )
    }
}
