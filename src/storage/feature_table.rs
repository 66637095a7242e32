//! One table of typed attribute rows plus a geometry column.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, CachedStatement, Connection, Row, Rows};
use tracing::debug;

use super::container::{Container, TableDef};
use super::rtree;
use super::schema::{self, quote_ident, Column, GEOM_COLUMN, PRIMARY_KEY};
use super::types::{AttrValue, Attrs};
use crate::error::{GraphError, Result};
use crate::geom::distance::LocalFrame;
use crate::geom::{gpkg, BBox, Coord};

/// A stored row: primary key plus attributes (including any key columns).
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    /// Primary key.
    pub fid: i64,
    /// Scalars and geometry of the row.
    pub attrs: Attrs,
}

/// Conflict policy for inserts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conflict {
    /// Delete the conflicting row and insert the new one.
    Replace,
    /// Keep the existing row and drop the new one.
    Ignore,
}

impl Conflict {
    fn keyword(self) -> &'static str {
        match self {
            Conflict::Replace => "REPLACE",
            Conflict::Ignore => "IGNORE",
        }
    }
}

/// Outcome of one batch insert.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Rows actually inserted (ignored conflicts excluded).
    pub inserted: usize,
    /// Columns created by schema evolution.
    pub columns_added: usize,
}

/// Lazy query over a feature table. The prepared statement lives in the scan;
/// each call to [`Scan::iter`] re-runs it and holds the cursor while
/// iterating.
pub struct Scan<'c, T> {
    stmt: CachedStatement<'c>,
    params: Vec<SqlValue>,
    map: fn(Feature) -> Result<T>,
}

impl<'c, T> Scan<'c, T> {
    pub(crate) fn prepare(
        conn: &'c Connection,
        sql: &str,
        params: Vec<SqlValue>,
        map: fn(Feature) -> Result<T>,
    ) -> Result<Self> {
        let stmt = conn.prepare_cached(sql)?;
        Ok(Self { stmt, params, map })
    }

    /// Starts iterating.
    pub fn iter(&mut self) -> Result<ScanIter<'_, T>> {
        let Scan { stmt, params, map } = self;
        let rows = stmt.query(params_from_iter(params.iter()))?;
        Ok(ScanIter {
            rows,
            names: Vec::new(),
            map: *map,
        })
    }

    /// Runs the query to completion.
    pub fn collect_vec(mut self) -> Result<Vec<T>> {
        self.iter()?.collect()
    }
}

/// Cursor over the rows of a [`Scan`].
pub struct ScanIter<'s, T> {
    rows: Rows<'s>,
    names: Vec<String>,
    map: fn(Feature) -> Result<T>,
}

impl<T> Iterator for ScanIter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rows.next() {
            Ok(Some(row)) => {
                // A cached `SELECT *` is re-prepared by SQLite after the table
                // gains columns, so the names are only known once a row exists.
                if self.names.is_empty() {
                    let stmt: &rusqlite::Statement<'_> = row.as_ref();
                    self.names = stmt.column_names().into_iter().map(str::to_string).collect();
                }
                Some(decode_row(row, &self.names).and_then(self.map))
            }
            Ok(None) => None,
            Err(err) => Some(Err(err.into())),
        }
    }
}

/// Decodes a row selected with named columns into a [`Feature`]. A missing
/// `fid` column decodes as 0.
pub(crate) fn decode_row(row: &Row<'_>, names: &[String]) -> Result<Feature> {
    let mut fid = 0;
    let mut attrs = Attrs::new();
    for (idx, name) in names.iter().enumerate() {
        if name.eq_ignore_ascii_case(PRIMARY_KEY) {
            fid = row.get(idx)?;
        } else if name.eq_ignore_ascii_case(GEOM_COLUMN) {
            let cell: Option<Vec<u8>> = row.get(idx)?;
            if let Some(bytes) = cell {
                let (geom, _) = gpkg::decode(&bytes)?;
                attrs.set_geom(Some(geom));
            }
        } else if let Some(value) = AttrValue::from_sql(row.get_ref(idx)?) {
            attrs.insert(name.clone(), value);
        }
    }
    Ok(Feature { fid, attrs })
}

pub(crate) fn sql_value(value: &AttrValue) -> SqlValue {
    match value {
        AttrValue::Null => SqlValue::Null,
        AttrValue::Integer(v) => SqlValue::Integer(*v),
        AttrValue::Real(v) => SqlValue::Real(*v),
        AttrValue::Text(v) => SqlValue::Text(v.clone()),
    }
}

fn identity(feature: Feature) -> Result<Feature> {
    Ok(feature)
}

/// Handle on one registered feature table, borrowing the container.
#[derive(Clone, Debug)]
pub struct FeatureTable<'c> {
    container: &'c Container,
    def: TableDef,
}

impl<'c> FeatureTable<'c> {
    pub(crate) fn new(container: &'c Container, def: TableDef) -> Self {
        Self { container, def }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Registry entry.
    pub fn def(&self) -> &TableDef {
        &self.def
    }

    /// Spatial reference id of the geometry column.
    pub fn srid(&self) -> i32 {
        self.def.srid
    }

    fn conn(&self) -> &'c Connection {
        self.container.connection()
    }

    fn quoted(&self) -> String {
        quote_ident(&self.def.name)
    }

    /// Current columns in definition order.
    pub fn columns(&self) -> Result<Vec<Column>> {
        schema::table_columns(self.conn(), &self.def.name)
    }

    /// Number of rows.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.quoted()), [], |r| r.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Row by primary key.
    pub fn get(&self, fid: i64) -> Result<Option<Feature>> {
        let sql = format!("SELECT * FROM {} WHERE {PRIMARY_KEY} = ?1", self.quoted());
        let mut scan = Scan::prepare(self.conn(), &sql, vec![SqlValue::Integer(fid)], identity)?;
        let first = scan.iter()?.next().transpose()?;
        Ok(first)
    }

    /// Lazy scan of every row in primary-key order.
    pub fn scan(&self) -> Result<Scan<'c, Feature>> {
        let sql = format!("SELECT * FROM {} ORDER BY {PRIMARY_KEY}", self.quoted());
        Scan::prepare(self.conn(), &sql, Vec::new(), identity)
    }

    /// Lazy query with a caller-built `WHERE` tail (may be empty) and a row
    /// mapper.
    pub(crate) fn select<T>(
        &self,
        columns: &str,
        tail: &str,
        params: Vec<SqlValue>,
        map: fn(Feature) -> Result<T>,
    ) -> Result<Scan<'c, T>> {
        let sql = format!("SELECT {columns} FROM {} {tail}", self.quoted());
        Scan::prepare(self.conn(), &sql, params, map)
    }

    /// Upserts `rows` (replace on primary-key conflict) in transactions of
    /// `batch_size` rows, adding columns for unseen attribute names first.
    /// A scalar `fid` attribute addresses the row to replace. Returns the
    /// number of rows written.
    pub fn write<I>(&self, rows: I, batch_size: usize) -> Result<usize>
    where
        I: IntoIterator<Item = Attrs>,
    {
        let batch_size = batch_size.max(1);
        let mut written = 0;
        let mut batch = Vec::new();
        for row in rows {
            batch.push(row);
            if batch.len() >= batch_size {
                written += self.write_batch(&batch)?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            written += self.write_batch(&batch)?;
        }
        Ok(written)
    }

    fn write_batch(&self, rows: &[Attrs]) -> Result<usize> {
        self.container.write_txn(|conn| {
            let stats = self.insert_rows(conn, rows, Conflict::Replace)?;
            self.refresh_feature_count(conn)?;
            Ok(stats.inserted)
        })
    }

    /// Inserts one batch inside the caller's transaction: evolves the schema
    /// once for the whole batch, then runs one prepared insert per row.
    pub(crate) fn insert_rows(&self, conn: &Connection, rows: &[Attrs], conflict: Conflict) -> Result<WriteStats> {
        if rows.is_empty() {
            return Ok(WriteStats::default());
        }
        let existing = schema::column_set(&schema::table_columns(conn, &self.def.name)?);
        let planned = schema::plan_new_columns(&existing, rows);
        let columns_added = schema::add_columns(conn, &self.def.name, &planned)?;
        let known = if columns_added > 0 {
            schema::column_set(&schema::table_columns(conn, &self.def.name)?)
        } else {
            existing
        };

        // Union of writable keys across the batch, first spelling wins.
        let mut with_fid = false;
        let mut keys: Vec<&str> = Vec::new();
        let mut lowered: Vec<String> = Vec::new();
        for attrs in rows {
            schema::warn_reserved(&self.def.name, attrs);
            for key in attrs.keys() {
                if key.eq_ignore_ascii_case(PRIMARY_KEY) {
                    with_fid = true;
                    continue;
                }
                if schema::is_reserved(key) {
                    continue;
                }
                let low = key.to_ascii_lowercase();
                if known.contains(&low) && !lowered.contains(&low) {
                    lowered.push(low);
                    keys.push(key);
                }
            }
        }

        let mut names: Vec<String> = Vec::with_capacity(keys.len() + 2);
        if with_fid {
            names.push(PRIMARY_KEY.to_string());
        }
        names.push(GEOM_COLUMN.to_string());
        names.extend(keys.iter().map(|k| quote_ident(k)));
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT OR {} INTO {} ({}) VALUES ({placeholders})",
            conflict.keyword(),
            self.quoted(),
            names.join(", ")
        );

        let mut stmt = conn.prepare_cached(&sql)?;
        let mut inserted = 0;
        let mut values: Vec<SqlValue> = Vec::with_capacity(names.len());
        for attrs in rows {
            values.clear();
            if with_fid {
                values.push(
                    attrs
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(PRIMARY_KEY))
                        .map_or(SqlValue::Null, |(_, v)| sql_value(v)),
                );
            }
            values.push(self.geom_value(attrs));
            for key in &keys {
                values.push(lookup(attrs, key).map_or(SqlValue::Null, sql_value));
            }
            inserted += stmt.execute(params_from_iter(values.iter()))?;
        }
        Ok(WriteStats {
            inserted,
            columns_added,
        })
    }

    fn geom_value(&self, attrs: &Attrs) -> SqlValue {
        attrs
            .geom()
            .map_or(SqlValue::Null, |g| SqlValue::Blob(gpkg::encode(g, self.def.srid)))
    }

    /// Sets the columns present in `partial` on row `fid`. Missing rows are a
    /// no-op; returns the number of rows changed.
    pub fn update(&self, fid: i64, partial: &Attrs) -> Result<usize> {
        self.container.write_txn(|conn| {
            self.update_where(conn, &[PRIMARY_KEY], &[AttrValue::Integer(fid)], partial)
        })
    }

    /// Applies several partial updates in one transaction.
    pub fn update_batch<I>(&self, updates: I) -> Result<usize>
    where
        I: IntoIterator<Item = (i64, Attrs)>,
    {
        self.container.write_txn(|conn| {
            let mut changed = 0;
            for (fid, partial) in updates {
                changed += self.update_where(conn, &[PRIMARY_KEY], &[AttrValue::Integer(fid)], &partial)?;
            }
            Ok(changed)
        })
    }

    /// Partial update of the rows matching `key_columns = key_values`, inside
    /// the caller's transaction. Only columns named in `partial` are touched.
    pub(crate) fn update_where(
        &self,
        conn: &Connection,
        key_columns: &[&str],
        key_values: &[AttrValue],
        partial: &Attrs,
    ) -> Result<usize> {
        let existing = schema::column_set(&schema::table_columns(conn, &self.def.name)?);
        let planned = schema::plan_new_columns(&existing, std::iter::once(partial));
        let known = if schema::add_columns(conn, &self.def.name, &planned)? > 0 {
            schema::column_set(&schema::table_columns(conn, &self.def.name)?)
        } else {
            existing
        };
        schema::warn_reserved(&self.def.name, partial);

        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if partial.geom().is_some() {
            sets.push(format!("{GEOM_COLUMN} = ?"));
            values.push(self.geom_value(partial));
        }
        for (key, value) in partial {
            if schema::is_reserved(key) || key_columns.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                continue;
            }
            if !known.contains(&key.to_ascii_lowercase()) {
                continue;
            }
            sets.push(format!("{} = ?", quote_ident(key)));
            values.push(sql_value(value));
        }
        if sets.is_empty() {
            return Ok(0);
        }
        let filter = key_filter(key_columns);
        values.extend(key_values.iter().map(sql_value));
        let sql = format!("UPDATE {} SET {} WHERE {filter}", self.quoted(), sets.join(", "));
        let changed = conn.prepare_cached(&sql)?.execute(params_from_iter(values.iter()))?;
        Ok(changed)
    }

    /// Deletes rows by primary key; returns how many existed.
    pub fn delete<I>(&self, fids: I) -> Result<usize>
    where
        I: IntoIterator<Item = i64>,
    {
        self.container.write_txn(|conn| {
            let mut removed = 0;
            for fid in fids {
                removed += self.delete_where(conn, &[PRIMARY_KEY], &[AttrValue::Integer(fid)])?;
            }
            self.refresh_feature_count(conn)?;
            Ok(removed)
        })
    }

    /// Deletes the rows matching `key_columns = key_values` inside the
    /// caller's transaction.
    pub(crate) fn delete_where(&self, conn: &Connection, key_columns: &[&str], key_values: &[AttrValue]) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE {}", self.quoted(), key_filter(key_columns));
        let removed = conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(key_values.iter().map(sql_value)))?;
        Ok(removed)
    }

    /// Stores the current row count in `gpkg_ogr_contents`.
    pub(crate) fn refresh_feature_count(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            &format!(
                "UPDATE gpkg_ogr_contents SET feature_count = (SELECT COUNT(*) FROM {})
                 WHERE table_name = ?1",
                self.quoted()
            ),
            [&self.def.name],
        )?;
        Ok(())
    }

    /// Whether the synchronized bounding-box index exists.
    pub fn has_spatial_index(&self) -> Result<bool> {
        rtree::exists(self.conn(), &self.def.name)
    }

    /// Builds (or repairs) the synchronized bounding-box index.
    pub fn add_spatial_index(&self) -> Result<()> {
        self.container.write_txn(|conn| rtree::create(conn, &self.def.name))
    }

    /// Removes the bounding-box index and its triggers.
    pub fn drop_spatial_index(&self) -> Result<()> {
        self.container.write_txn(|conn| rtree::drop(conn, &self.def.name))
    }

    /// Rows whose bounding box overlaps `bbox`, answered from the index.
    pub fn intersects(&self, bbox: &BBox) -> Result<Vec<Feature>> {
        self.intersects_as(bbox, identity)
    }

    pub(crate) fn intersects_as<T>(&self, bbox: &BBox, map: fn(Feature) -> Result<T>) -> Result<Vec<T>> {
        if !self.has_spatial_index()? {
            return Err(GraphError::MissingSpatialIndex {
                table: self.def.name.clone(),
            });
        }
        let sql = format!(
            "SELECT t.* FROM {} AS t
               JOIN {} AS r ON t.{PRIMARY_KEY} = r.id
              WHERE r.maxx >= ?1 AND r.minx <= ?2 AND r.maxy >= ?3 AND r.miny <= ?4",
            self.quoted(),
            quote_ident(&rtree::index_table(&self.def.name))
        );
        let params = vec![
            SqlValue::Real(bbox.min_x),
            SqlValue::Real(bbox.max_x),
            SqlValue::Real(bbox.min_y),
            SqlValue::Real(bbox.max_y),
        ];
        Scan::prepare(self.conn(), &sql, params, map)?.collect_vec()
    }

    /// Rows whose geometry lies within `distance` of `center`. Distances are
    /// metres for WGS 84 tables and native units otherwise. Candidates come
    /// from the index; `sorted` orders them by ascending distance.
    pub fn within_distance(&self, center: Coord, distance: f64, sorted: bool) -> Result<Vec<(Feature, f64)>> {
        let frame = LocalFrame::for_srid(center, self.def.srid);
        let candidates = self.intersects(&frame.bbox_around(distance))?;
        let mut hits: Vec<(Feature, f64)> = candidates
            .into_iter()
            .filter_map(|feature| {
                let d = feature.attrs.geom().map(|g| frame.distance_to(g))?;
                (d <= distance).then_some((feature, d))
            })
            .collect();
        if sorted {
            hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        }
        debug!(table = %self.def.name, distance, found = hits.len(), "feature_table.within_distance");
        Ok(hits)
    }

    /// Drops the table, its index and every registry row naming it.
    pub fn drop(self) -> Result<()> {
        let name = self.def.name.clone();
        self.container.write_txn(|conn| {
            rtree::drop(conn, &name)?;
            conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&name)), [])?;
            for registry in ["gpkg_extensions", "gpkg_geometry_columns", "gpkg_ogr_contents", "gpkg_contents"] {
                conn.execute(&format!("DELETE FROM {registry} WHERE table_name = ?1"), [&name])?;
            }
            Ok(())
        })?;
        debug!(table = %name, "feature_table.dropped");
        Ok(())
    }
}

fn lookup<'a>(attrs: &'a Attrs, key: &str) -> Option<&'a AttrValue> {
    attrs
        .get(key)
        .or_else(|| attrs.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v))
}

fn key_filter(key_columns: &[&str]) -> String {
    key_columns
        .iter()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ")
}
