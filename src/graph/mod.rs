//! Directed transportation graph stored as two feature tables.
//!
//! [`GraphStore`] owns the container and keeps the `nodes` and `edges`
//! tables: nodes are keyed by `_n`, edges by the ordered pair (`_u`, `_v`).
//! Everything else on a row is an open, evolving set of attribute columns.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::geom::Coord;
use crate::storage::schema::{self, quote_ident};
use crate::storage::{
    AttrValue, Attrs, ColumnType, Conflict, Container, Feature, FeatureTable, Scan, StoreOptions, TableDef,
    GEOM_COLUMN, PRIMARY_KEY,
};

pub mod costs;
mod dijkstra;
mod edge_attrs;
mod ingest;
mod views;

pub use dijkstra::{Dijkstra, ShortestPaths};
pub use edge_attrs::EdgeAttributes;
pub use ingest::{EdgeRecord, IngestOptions, IngestSummary, IntoEdge};
pub use views::{AdjacencyRead, Dir, InnerAdjacency, NodeStore, OuterAdjacency};

/// Name of the node table.
pub const NODES: &str = "nodes";
/// Name of the edge table.
pub const EDGES: &str = "edges";
/// Node key column.
pub const NODE_KEY: &str = "_n";
/// Edge source key column.
pub const SOURCE_KEY: &str = "_u";
/// Edge target key column.
pub const TARGET_KEY: &str = "_v";
/// Source-layer tag carried as an ordinary edge attribute.
pub const LAYER_KEY: &str = "_layer";
/// Derived edge length in metres.
pub const LENGTH_KEY: &str = "_length";

const NEIGHBOR_ALIAS: &str = "_k";
const EDGES_COVERING: &str = "edges_covering";
const NODES_COVERING: &str = "nodes_covering";

/// Lazy scan over every edge as `(u, v, attrs)`.
pub type EdgeScan<'g> = Scan<'g, (String, String, Attrs)>;
/// Lazy scan over every node as `(key, attrs)`.
pub type NodeScan<'g> = Scan<'g, (String, Attrs)>;
/// Lazy scan over node keys.
pub type KeyScan<'g> = Scan<'g, String>;
/// Lazy scan over the neighbors of one node as `(neighbor, edge attrs)`.
pub type NeighborScan<'g> = Scan<'g, (String, Attrs)>;

/// One hit of a proximity query over the edge table.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeHit {
    /// Source key.
    pub u: String,
    /// Target key.
    pub v: String,
    /// Edge attributes.
    pub attrs: Attrs,
    /// Distance from the query point (metres for WGS 84).
    pub distance: f64,
}

/// One hit of a proximity query over the node table.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeHit {
    /// Node key.
    pub key: String,
    /// Node attributes.
    pub attrs: Attrs,
    /// Distance from the query point (metres for WGS 84).
    pub distance: f64,
}

/// Graph container: owns the connection and both graph tables.
#[derive(Debug)]
pub struct GraphStore {
    container: Container,
    nodes: TableDef,
    edges: TableDef,
}

impl GraphStore {
    /// Opens `path`, creating the container and graph tables when missing.
    pub fn create(path: impl AsRef<Path>, opts: StoreOptions) -> Result<Self> {
        let container = Container::open(path, opts)?;
        Self::initialize(container)
    }

    /// Opens an existing graph container. Fails with `Corruption` when the
    /// graph tables are not registered.
    pub fn open(path: impl AsRef<Path>, opts: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GraphError::InvalidArgument(format!("{} does not exist", path.display())));
        }
        let container = Container::open(path, opts)?;
        Self::attach(container)
    }

    /// Fresh graph in private memory.
    pub fn open_in_memory(opts: StoreOptions) -> Result<Self> {
        let container = Container::open_in_memory(opts)?;
        Self::initialize(container)
    }

    fn attach(container: Container) -> Result<Self> {
        let missing = |name: &str| GraphError::Corruption(format!("graph table {name:?} is not registered"));
        let nodes = container.table_def(NODES)?.ok_or_else(|| missing(NODES))?;
        let edges = container.table_def(EDGES)?.ok_or_else(|| missing(EDGES))?;
        for def in [&nodes, &edges] {
            if schema::table_columns(container.connection(), &def.name)?.is_empty() {
                return Err(GraphError::Corruption(format!(
                    "graph table {:?} is registered but missing",
                    def.name
                )));
            }
        }
        Ok(Self { container, nodes, edges })
    }

    fn initialize(container: Container) -> Result<Self> {
        if container.is_read_only() {
            return Self::attach(container);
        }
        let srid = container.options().srid;
        let spatial_index = container.options().spatial_index;
        container.write_txn(|conn| {
            let nodes = match container.table_def(NODES)? {
                Some(def) => FeatureTable::new(&container, def),
                None => container.create_feature_table(NODES, "POINT", srid)?,
            };
            let edges = match container.table_def(EDGES)? {
                Some(def) => FeatureTable::new(&container, def),
                None => container.create_feature_table(EDGES, "LINESTRING", srid)?,
            };
            schema::add_columns(conn, NODES, &[(NODE_KEY.to_string(), ColumnType::Text)])?;
            schema::add_columns(
                conn,
                EDGES,
                &[
                    (SOURCE_KEY.to_string(), ColumnType::Text),
                    (TARGET_KEY.to_string(), ColumnType::Text),
                ],
            )?;
            create_key_indexes(conn)?;
            if spatial_index {
                nodes.add_spatial_index()?;
                edges.add_spatial_index()?;
            }
            Ok(())
        })?;
        debug!(path = ?container.path(), srid, spatial_index, "graph.initialized");
        Self::attach(container)
    }

    /// Independent in-memory duplicate of the whole container, indexes
    /// included.
    pub fn to_in_memory_copy(&self) -> Result<GraphStore> {
        Self::attach(self.container.to_in_memory_copy()?)
    }

    /// The underlying container.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        self.container.options()
    }

    /// Whether every mutation is rejected.
    pub fn is_read_only(&self) -> bool {
        self.container.is_read_only()
    }

    /// Feature table holding the nodes.
    pub fn nodes_table(&self) -> FeatureTable<'_> {
        FeatureTable::new(&self.container, self.nodes.clone())
    }

    /// Feature table holding the edges.
    pub fn edges_table(&self) -> FeatureTable<'_> {
        FeatureTable::new(&self.container, self.edges.clone())
    }

    fn conn(&self) -> &Connection {
        self.container.connection()
    }

    // ---- nodes ----

    /// Whether a node with this key is stored.
    pub fn has_node(&self, key: &str) -> Result<bool> {
        let found = self
            .conn()
            .prepare_cached("SELECT 1 FROM nodes WHERE _n = ?1")?
            .query_row([key], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Attributes of one node.
    pub fn get_node(&self, key: &str) -> Result<Attrs> {
        let mut scan = self.nodes_table().select(
            "*",
            "WHERE _n = ?1",
            vec![SqlValue::Text(key.to_string())],
            node_pair,
        )?;
        let found = scan.iter()?.next().transpose()?;
        found.map(|(_, attrs)| attrs).ok_or_else(|| GraphError::node_not_found(key))
    }

    /// Number of nodes.
    pub fn node_count(&self) -> Result<usize> {
        self.nodes_table().len()
    }

    /// Lazy scan over all nodes in row order.
    pub fn iter_nodes(&self) -> Result<NodeScan<'_>> {
        self.nodes_table().select("*", "ORDER BY fid", Vec::new(), node_pair)
    }

    /// Lazy scan over all node keys in row order.
    pub fn node_keys(&self) -> Result<KeyScan<'_>> {
        self.nodes_table()
            .select("_n AS _k", "ORDER BY fid", Vec::new(), neighbor_key)
    }

    /// Adds a node, or merges `attrs` into an existing one.
    pub fn add_node(&self, key: &str, attrs: &Attrs) -> Result<()> {
        self.container.write_txn(|conn| {
            let nodes = self.nodes_table();
            let row = node_row(key, attrs.clone());
            let stats = nodes.insert_rows(conn, std::slice::from_ref(&row), Conflict::Ignore)?;
            if stats.inserted == 0 {
                nodes.update_where(conn, &[NODE_KEY], &[AttrValue::from(key)], attrs)?;
            } else {
                nodes.refresh_feature_count(conn)?;
            }
            Ok(())
        })
    }

    /// Sets the attributes present in `partial` on node `key`. Returns the
    /// number of rows changed (0 when the node does not exist).
    pub fn update_node(&self, key: &str, partial: &Attrs) -> Result<usize> {
        self.container.write_txn(|conn| {
            self.nodes_table()
                .update_where(conn, &[NODE_KEY], &[AttrValue::from(key)], partial)
        })
    }

    /// Deletes nodes together with their incident edges. Returns how many
    /// nodes existed.
    pub fn delete_nodes<I, K>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.container.write_txn(|conn| {
            let nodes = self.nodes_table();
            let edges = self.edges_table();
            let mut removed = 0;
            for key in keys {
                let key = AttrValue::from(key.as_ref());
                edges.delete_where(conn, &[SOURCE_KEY], std::slice::from_ref(&key))?;
                edges.delete_where(conn, &[TARGET_KEY], std::slice::from_ref(&key))?;
                removed += nodes.delete_where(conn, &[NODE_KEY], &[key])?;
            }
            nodes.refresh_feature_count(conn)?;
            edges.refresh_feature_count(conn)?;
            Ok(removed)
        })
    }

    // ---- edges ----

    /// Whether the edge `(u, v)` is stored.
    pub fn has_edge(&self, u: &str, v: &str) -> Result<bool> {
        let found = self
            .conn()
            .prepare_cached("SELECT 1 FROM edges WHERE _u = ?1 AND _v = ?2")?
            .query_row([u, v], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Attributes of the edge `(u, v)`.
    pub fn get_edge(&self, u: &str, v: &str) -> Result<Attrs> {
        let mut scan = self.edges_table().select(
            "*",
            "WHERE _u = ?1 AND _v = ?2",
            vec![SqlValue::Text(u.to_string()), SqlValue::Text(v.to_string())],
            edge_triple,
        )?;
        let found = scan.iter()?.next().transpose()?;
        found
            .map(|(_, _, attrs)| attrs)
            .ok_or_else(|| GraphError::edge_not_found(u, v))
    }

    /// Number of edges.
    pub fn size(&self) -> Result<usize> {
        self.edges_table().len()
    }

    /// Lazy full-table scan yielding `(u, v, attrs)` in row order.
    pub fn iter_edges(&self) -> Result<EdgeScan<'_>> {
        self.edges_table().select("*", "ORDER BY fid", Vec::new(), edge_triple)
    }

    /// Distinct successor keys of `u`, or with `None` every node that is the
    /// target of at least one edge.
    pub fn successor_keys(&self, u: Option<&str>) -> Result<KeyScan<'_>> {
        match u {
            Some(u) => self.edges_table().select(
                "DISTINCT _v AS _k",
                "WHERE _u = ?1",
                vec![SqlValue::Text(u.to_string())],
                neighbor_key,
            ),
            None => self
                .edges_table()
                .select("DISTINCT _v AS _k", "", Vec::new(), neighbor_key),
        }
    }

    /// Distinct predecessor keys of `v`, or with `None` every node that is
    /// the source of at least one edge.
    pub fn predecessor_keys(&self, v: Option<&str>) -> Result<KeyScan<'_>> {
        match v {
            Some(v) => self.edges_table().select(
                "DISTINCT _u AS _k",
                "WHERE _v = ?1",
                vec![SqlValue::Text(v.to_string())],
                neighbor_key,
            ),
            None => self
                .edges_table()
                .select("DISTINCT _u AS _k", "", Vec::new(), neighbor_key),
        }
    }

    /// Outgoing edges of `u` as `(v, attrs)`.
    pub fn successors(&self, u: &str) -> Result<NeighborScan<'_>> {
        self.edges_table().select(
            "*",
            "WHERE _u = ?1 ORDER BY fid",
            vec![SqlValue::Text(u.to_string())],
            successor_pair,
        )
    }

    /// Incoming edges of `v` as `(u, attrs)`.
    pub fn predecessors(&self, v: &str) -> Result<NeighborScan<'_>> {
        self.edges_table().select(
            "*",
            "WHERE _v = ?1 ORDER BY fid",
            vec![SqlValue::Text(v.to_string())],
            predecessor_pair,
        )
    }

    /// Number of distinct successors of `u`, or with `None` of nodes that
    /// are the target of some edge.
    pub fn unique_successor_count(&self, u: Option<&str>) -> Result<usize> {
        self.count_distinct(TARGET_KEY, SOURCE_KEY, u)
    }

    /// Number of distinct predecessors of `v`, or with `None` of nodes that
    /// are the source of some edge.
    pub fn unique_predecessor_count(&self, v: Option<&str>) -> Result<usize> {
        self.count_distinct(SOURCE_KEY, TARGET_KEY, v)
    }

    fn count_distinct(&self, neighbor: &str, anchor: &str, key: Option<&str>) -> Result<usize> {
        let count: i64 = match key {
            Some(key) => self
                .conn()
                .prepare_cached(&format!("SELECT COUNT(DISTINCT {neighbor}) FROM edges WHERE {anchor} = ?1"))?
                .query_row([key], |r| r.get(0))?,
            None => self
                .conn()
                .prepare_cached(&format!("SELECT COUNT(DISTINCT {neighbor}) FROM edges"))?
                .query_row([], |r| r.get(0))?,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Inserts the edge, replacing an existing `(u, v)` row wholesale, and
    /// makes sure both endpoint nodes exist.
    pub fn insert_or_replace_edge(&self, u: &str, v: &str, attrs: &Attrs) -> Result<()> {
        self.container.write_txn(|conn| {
            self.write_edges_in(conn, &[edge_row(u, v, attrs.clone())], Conflict::Replace)?;
            Ok(())
        })
    }

    /// Partial update of one edge. Returns the number of rows changed.
    pub fn update_edge(&self, u: &str, v: &str, partial: &Attrs) -> Result<usize> {
        self.container
            .write_txn(|conn| self.update_edge_in(conn, u, v, partial))
    }

    /// Partial updates of many edges in one transaction. Only the attributes
    /// named in each partial set are touched; missing edges are skipped.
    pub fn update_edges<I, K>(&self, updates: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, K, Attrs)>,
        K: AsRef<str>,
    {
        self.container.write_txn(|conn| {
            let mut changed = 0;
            for (u, v, partial) in updates {
                changed += self.update_edge_in(conn, u.as_ref(), v.as_ref(), &partial)?;
            }
            Ok(changed)
        })
    }

    fn update_edge_in(&self, conn: &Connection, u: &str, v: &str, partial: &Attrs) -> Result<usize> {
        self.edges_table().update_where(
            conn,
            &[SOURCE_KEY, TARGET_KEY],
            &[AttrValue::from(u), AttrValue::from(v)],
            partial,
        )
    }

    /// Deletes edges by `(u, v)`; returns how many existed.
    pub fn delete_edges<I, K>(&self, pairs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, K)>,
        K: AsRef<str>,
    {
        self.container.write_txn(|conn| {
            let edges = self.edges_table();
            let mut removed = 0;
            for (u, v) in pairs {
                removed += edges.delete_where(
                    conn,
                    &[SOURCE_KEY, TARGET_KEY],
                    &[AttrValue::from(u.as_ref()), AttrValue::from(v.as_ref())],
                )?;
            }
            edges.refresh_feature_count(conn)?;
            Ok(removed)
        })
    }

    /// Removes every outgoing edge of `u`.
    pub fn delete_successors(&self, u: &str) -> Result<usize> {
        self.delete_incident(SOURCE_KEY, u)
    }

    /// Removes every incoming edge of `v`.
    pub fn delete_predecessors(&self, v: &str) -> Result<usize> {
        self.delete_incident(TARGET_KEY, v)
    }

    fn delete_incident(&self, column: &str, key: &str) -> Result<usize> {
        self.container.write_txn(|conn| {
            let edges = self.edges_table();
            let removed = edges.delete_where(conn, &[column], &[AttrValue::from(key)])?;
            edges.refresh_feature_count(conn)?;
            Ok(removed)
        })
    }

    /// Replaces all outgoing edges of `u` with `neighbors`.
    pub fn replace_successors<I, K>(&self, u: &str, neighbors: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, Attrs)>,
        K: AsRef<str>,
    {
        self.container.write_txn(|conn| {
            self.edges_table()
                .delete_where(conn, &[SOURCE_KEY], &[AttrValue::from(u)])?;
            let rows: Vec<Attrs> = neighbors
                .into_iter()
                .map(|(v, attrs)| edge_row(u, v.as_ref(), attrs))
                .collect();
            self.write_edges_in(conn, &rows, Conflict::Replace)
        })
    }

    /// Replaces all incoming edges of `v` with `neighbors`.
    pub fn replace_predecessors<I, K>(&self, v: &str, neighbors: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, Attrs)>,
        K: AsRef<str>,
    {
        self.container.write_txn(|conn| {
            self.edges_table()
                .delete_where(conn, &[TARGET_KEY], &[AttrValue::from(v)])?;
            let rows: Vec<Attrs> = neighbors
                .into_iter()
                .map(|(u, attrs)| edge_row(u.as_ref(), v, attrs))
                .collect();
            self.write_edges_in(conn, &rows, Conflict::Replace)
        })
    }

    /// Writes prepared edge rows and their endpoint nodes inside the caller's
    /// transaction. Returns the number of edges inserted.
    pub(crate) fn write_edges_in(&self, conn: &Connection, rows: &[Attrs], conflict: Conflict) -> Result<usize> {
        let edges = self.edges_table();
        let nodes = self.nodes_table();
        let stats = edges.insert_rows(conn, rows, conflict)?;
        let endpoints = ingest::endpoint_nodes(rows);
        nodes.insert_rows(conn, &endpoints, Conflict::Ignore)?;
        edges.refresh_feature_count(conn)?;
        nodes.refresh_feature_count(conn)?;
        Ok(stats.inserted)
    }

    // ---- spatial ----

    /// Edges whose geometry lies within `distance` of (`lon`, `lat`).
    pub fn edges_within_distance(&self, lon: f64, lat: f64, distance: f64, sorted: bool) -> Result<Vec<EdgeHit>> {
        let hits = self
            .edges_table()
            .within_distance(Coord::new(lon, lat), distance, sorted)?;
        hits.into_iter()
            .map(|(feature, distance)| {
                let (u, v, attrs) = edge_triple(feature)?;
                Ok(EdgeHit { u, v, attrs, distance })
            })
            .collect()
    }

    /// Nodes whose geometry lies within `distance` of (`lon`, `lat`).
    pub fn nodes_within_distance(&self, lon: f64, lat: f64, distance: f64, sorted: bool) -> Result<Vec<NodeHit>> {
        let hits = self
            .nodes_table()
            .within_distance(Coord::new(lon, lat), distance, sorted)?;
        hits.into_iter()
            .map(|(feature, distance)| {
                let (key, attrs) = node_pair(feature)?;
                Ok(NodeHit { key, attrs, distance })
            })
            .collect()
    }

    // ---- maintenance ----

    /// Drops the non-unique lookup indexes and the covering indexes ahead of
    /// a bulk load. Uniqueness indexes stay since deduplication relies on
    /// them.
    pub fn drop_query_indexes(&self) -> Result<()> {
        self.container.write_txn(|conn| {
            for index in ["edges_u_index", "edges_v_index", EDGES_COVERING, NODES_COVERING] {
                conn.execute(&format!("DROP INDEX IF EXISTS {index}"), [])?;
            }
            Ok(())
        })?;
        debug!("graph.query_indexes_dropped");
        Ok(())
    }

    /// Rebuilds the key indexes, a covering index over every current
    /// attribute column of each table, and both spatial indexes.
    pub fn reindex(&self) -> Result<()> {
        self.container.write_txn(|conn| {
            create_key_indexes(conn)?;
            for (table, index) in [(EDGES, EDGES_COVERING), (NODES, NODES_COVERING)] {
                conn.execute(&format!("DROP INDEX IF EXISTS {index}"), [])?;
                let columns: Vec<String> = schema::table_columns(conn, table)?
                    .into_iter()
                    .filter(|c| {
                        !c.name.eq_ignore_ascii_case(PRIMARY_KEY) && !c.name.eq_ignore_ascii_case(GEOM_COLUMN)
                    })
                    .map(|c| quote_ident(&c.name))
                    .collect();
                if !columns.is_empty() {
                    conn.execute(&format!("CREATE INDEX {index} ON {table} ({})", columns.join(", ")), [])?;
                }
                debug!(table, columns = columns.len(), "graph.covering_index_rebuilt");
            }
            self.nodes_table().add_spatial_index()?;
            self.edges_table().add_spatial_index()?;
            conn.execute_batch("ANALYZE")?;
            Ok(())
        })
    }
}

fn create_key_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS nodes_n_index ON nodes (_n);
         CREATE INDEX IF NOT EXISTS edges_u_index ON edges (_u);
         CREATE INDEX IF NOT EXISTS edges_v_index ON edges (_v);
         CREATE UNIQUE INDEX IF NOT EXISTS edges_uv_index ON edges (_u, _v);",
    )?;
    Ok(())
}

/// Edge row with the key columns set; keys override same-named attributes.
pub(crate) fn edge_row(u: &str, v: &str, mut attrs: Attrs) -> Attrs {
    attrs.insert(SOURCE_KEY, u);
    attrs.insert(TARGET_KEY, v);
    attrs
}

pub(crate) fn node_row(key: &str, mut attrs: Attrs) -> Attrs {
    attrs.insert(NODE_KEY, key);
    attrs
}

fn take_key(attrs: &mut Attrs, column: &str) -> Result<String> {
    match attrs.remove(column) {
        Some(AttrValue::Text(key)) => Ok(key),
        Some(other) => Ok(other.to_string()),
        None => Err(GraphError::Corruption(format!("row without {column} key"))),
    }
}

fn edge_triple(feature: Feature) -> Result<(String, String, Attrs)> {
    let mut attrs = feature.attrs;
    let u = take_key(&mut attrs, SOURCE_KEY)?;
    let v = take_key(&mut attrs, TARGET_KEY)?;
    Ok((u, v, attrs))
}

fn successor_pair(feature: Feature) -> Result<(String, Attrs)> {
    let (_, v, attrs) = edge_triple(feature)?;
    Ok((v, attrs))
}

fn predecessor_pair(feature: Feature) -> Result<(String, Attrs)> {
    let (u, _, attrs) = edge_triple(feature)?;
    Ok((u, attrs))
}

fn node_pair(feature: Feature) -> Result<(String, Attrs)> {
    let mut attrs = feature.attrs;
    let key = take_key(&mut attrs, NODE_KEY)?;
    Ok((key, attrs))
}

fn neighbor_key(feature: Feature) -> Result<String> {
    let mut attrs = feature.attrs;
    take_key(&mut attrs, NEIGHBOR_ALIAS)
}
