//! Batched edge ingestion.

use rustc_hash::FxHashSet;
use serde_json::Value;
use tracing::info;

use super::{edge_row, node_row, GraphStore, LENGTH_KEY, SOURCE_KEY, TARGET_KEY};
use crate::error::{GraphError, Result};
use crate::geom::Geometry;
use crate::storage::{Attrs, Conflict, StoreOptions, DEFAULT_BATCH_SIZE};

/// A normalized edge: ordered endpoint keys plus attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeRecord {
    /// Source key.
    pub u: String,
    /// Target key.
    pub v: String,
    /// Edge attributes.
    pub attrs: Attrs,
}

impl EdgeRecord {
    /// Builds a record.
    pub fn new(u: impl Into<String>, v: impl Into<String>, attrs: Attrs) -> Self {
        Self {
            u: u.into(),
            v: v.into(),
            attrs,
        }
    }
}

/// Items accepted by the ingestion pipeline.
pub trait IntoEdge {
    /// Normalizes the item, rejecting malformed shapes.
    fn into_edge(self) -> Result<EdgeRecord>;
}

impl IntoEdge for EdgeRecord {
    fn into_edge(self) -> Result<EdgeRecord> {
        Ok(self)
    }
}

impl<K: Into<String>> IntoEdge for (K, K) {
    fn into_edge(self) -> Result<EdgeRecord> {
        Ok(EdgeRecord::new(self.0, self.1, Attrs::new()))
    }
}

impl<K: Into<String>> IntoEdge for (K, K, Attrs) {
    fn into_edge(self) -> Result<EdgeRecord> {
        Ok(EdgeRecord::new(self.0, self.1, self.2))
    }
}

/// A JSON array `[u, v]` or `[u, v, {attrs}]`. Keys may be strings or
/// integers; attribute objects follow [`Attrs::from_json`].
impl IntoEdge for Value {
    fn into_edge(self) -> Result<EdgeRecord> {
        let Value::Array(items) = self else {
            return Err(GraphError::InvalidEdgeShape(format!(
                "expected a JSON array, found {}",
                json_kind(&self)
            )));
        };
        if !(2..=3).contains(&items.len()) {
            return Err(GraphError::InvalidEdgeShape(format!(
                "expected 2 or 3 elements, found {}",
                items.len()
            )));
        }
        let u = json_key(&items[0])?;
        let v = json_key(&items[1])?;
        let attrs = match items.get(2) {
            None | Some(Value::Null) => Attrs::new(),
            Some(Value::Object(map)) => Attrs::from_json(map)?,
            Some(other) => {
                return Err(GraphError::InvalidEdgeShape(format!(
                    "edge data must be an object, found {}",
                    json_kind(other)
                )))
            }
        };
        Ok(EdgeRecord::new(u, v, attrs))
    }
}

fn json_key(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(GraphError::InvalidEdgeShape(format!(
            "node key must be a string or integer, found {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Settings for one ingestion run.
#[derive(Clone, Debug, PartialEq)]
pub struct IngestOptions {
    /// Edges per committed batch.
    pub batch_size: usize,
    /// Attributes merged into every edge; edge data wins on conflict.
    pub defaults: Attrs,
    /// Derive `_length` in metres from line geometries.
    pub compute_length: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            defaults: Attrs::new(),
            compute_length: false,
        }
    }
}

impl IngestOptions {
    /// Takes batch size and length derivation from the store options.
    pub fn from_store(opts: &StoreOptions) -> Self {
        Self {
            batch_size: opts.batch_size,
            compute_length: opts.compute_length,
            ..Self::default()
        }
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the default attributes.
    pub fn defaults(mut self, defaults: Attrs) -> Self {
        self.defaults = defaults;
        self
    }

    /// Enables or disables `_length` derivation.
    pub fn compute_length(mut self, enabled: bool) -> Self {
        self.compute_length = enabled;
        self
    }
}

/// Counters reported by an ingestion run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Edges read from the input.
    pub offered: usize,
    /// Edges actually inserted (existing pairs are ignored).
    pub inserted: usize,
    /// Nodes created for previously unknown endpoints.
    pub nodes_inserted: usize,
    /// Committed batches.
    pub batches: usize,
    /// Attribute columns created on either table.
    pub columns_added: usize,
}

impl GraphStore {
    /// Adds edges in committed batches of `batch_size`. Existing `(u, v)`
    /// pairs are left untouched. `progress` is called once per committed
    /// batch with its edge count.
    pub fn add_edges<I>(
        &self,
        edges: I,
        batch_size: usize,
        progress: Option<&mut dyn FnMut(usize)>,
    ) -> Result<IngestSummary>
    where
        I: IntoIterator,
        I::Item: IntoEdge,
    {
        let opts = IngestOptions::from_store(self.options()).batch_size(batch_size);
        self.ingest(edges, &opts, progress)
    }

    /// Adds edges with full control over the ingestion settings.
    pub fn ingest<I>(
        &self,
        edges: I,
        opts: &IngestOptions,
        mut progress: Option<&mut dyn FnMut(usize)>,
    ) -> Result<IngestSummary>
    where
        I: IntoIterator,
        I::Item: IntoEdge,
    {
        let batch_size = opts.batch_size.max(1);
        let mut summary = IngestSummary::default();
        let mut batch: Vec<Attrs> = Vec::with_capacity(batch_size.min(DEFAULT_BATCH_SIZE));
        for item in edges {
            let record = item.into_edge()?;
            batch.push(prepare_row(record, opts));
            summary.offered += 1;
            if batch.len() >= batch_size {
                self.commit_batch(&batch, &mut summary)?;
                if let Some(report) = progress.as_mut() {
                    report(batch.len());
                }
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.commit_batch(&batch, &mut summary)?;
            if let Some(report) = progress.as_mut() {
                report(batch.len());
            }
        }
        Ok(summary)
    }

    fn commit_batch(&self, rows: &[Attrs], summary: &mut IngestSummary) -> Result<()> {
        let (inserted, nodes_inserted, columns_added) = self.container().write_txn(|conn| {
            let edges = self.edges_table();
            let nodes = self.nodes_table();
            let edge_stats = edges.insert_rows(conn, rows, Conflict::Ignore)?;
            let node_stats = nodes.insert_rows(conn, &endpoint_nodes(rows), Conflict::Ignore)?;
            edges.refresh_feature_count(conn)?;
            nodes.refresh_feature_count(conn)?;
            Ok((
                edge_stats.inserted,
                node_stats.inserted,
                edge_stats.columns_added + node_stats.columns_added,
            ))
        })?;
        summary.inserted += inserted;
        summary.nodes_inserted += nodes_inserted;
        summary.columns_added += columns_added;
        summary.batches += 1;
        info!(
            batch = summary.batches,
            edges = rows.len(),
            inserted,
            nodes_inserted,
            "ingest.batch_committed"
        );
        Ok(())
    }
}

fn prepare_row(record: EdgeRecord, opts: &IngestOptions) -> Attrs {
    let EdgeRecord { u, v, mut attrs } = record;
    attrs.fill_defaults(&opts.defaults);
    if opts.compute_length && !attrs.contains_key(LENGTH_KEY) {
        if let Some(length) = attrs.geom().filter(|g| !g.is_empty()).map(Geometry::haversine_length) {
            attrs.insert(LENGTH_KEY, length);
        }
    }
    edge_row(&u, &v, attrs)
}

/// Endpoint node rows for a set of edge rows, one per key in first-seen
/// order. Line geometries contribute their first/last coordinate as the
/// node point.
pub(crate) fn endpoint_nodes(rows: &[Attrs]) -> Vec<Attrs> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut nodes = Vec::with_capacity(rows.len() * 2);
    for row in rows {
        let geom = row.geom();
        for (column, point) in [
            (SOURCE_KEY, geom.and_then(Geometry::first)),
            (TARGET_KEY, geom.and_then(Geometry::last)),
        ] {
            let Some(key) = row.get(column).map(ToString::to_string) else {
                continue;
            };
            if !seen.insert(key.clone()) {
                continue;
            }
            let mut node = node_row(&key, Attrs::new());
            if let Some(point) = point {
                node.set_geom(Some(Geometry::Point(point)));
            }
            nodes.push(node);
        }
    }
    nodes
}
