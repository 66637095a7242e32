//! Column discovery and on-demand schema evolution for feature tables.

use rustc_hash::FxHashSet;
use rusqlite::Connection;
use tracing::{debug, warn};

use super::types::{Attrs, ColumnType};
use crate::error::Result;

/// Primary key column of every feature table.
pub const PRIMARY_KEY: &str = "fid";
/// Geometry column of every feature table.
pub const GEOM_COLUMN: &str = "geom";

/// Quotes an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether an attribute name collides with a structural column.
pub(crate) fn is_reserved(name: &str) -> bool {
    name.eq_ignore_ascii_case(PRIMARY_KEY) || name.eq_ignore_ascii_case(GEOM_COLUMN)
}

/// One column as reported by `PRAGMA table_info`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared SQL type.
    pub declared: String,
    /// Storage class, when the declared type maps onto one.
    pub ty: Option<ColumnType>,
}

/// Columns of `table` in definition order.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<Column>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let rows = stmt.query_map([], |row| {
        let name: String = row.get("name")?;
        let declared: String = row.get("type")?;
        Ok((name, declared))
    })?;
    let mut columns = Vec::new();
    for row in rows {
        let (name, declared) = row?;
        let ty = ColumnType::from_declared(&declared);
        columns.push(Column { name, declared, ty });
    }
    Ok(columns)
}

/// Lower-cased names of the columns, for case-insensitive membership tests.
pub(crate) fn column_set(columns: &[Column]) -> FxHashSet<String> {
    columns.iter().map(|c| c.name.to_ascii_lowercase()).collect()
}

/// Attribute keys across `rows` that have no column yet, typed by the first
/// non-null value seen. Keys only ever seen with null values are skipped.
pub(crate) fn plan_new_columns<'a, I>(existing: &FxHashSet<String>, rows: I) -> Vec<(String, ColumnType)>
where
    I: IntoIterator<Item = &'a Attrs>,
{
    let mut planned: Vec<(String, ColumnType)> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    for attrs in rows {
        for (key, value) in attrs {
            let Some(ty) = value.column_type() else {
                continue;
            };
            if is_reserved(key) {
                continue;
            }
            let lowered = key.to_ascii_lowercase();
            if existing.contains(&lowered) || !seen.insert(lowered) {
                continue;
            }
            planned.push((key.clone(), ty));
        }
    }
    planned
}

/// Adds each planned column that does not already exist. Returns how many
/// columns were added.
pub(crate) fn add_columns(conn: &Connection, table: &str, planned: &[(String, ColumnType)]) -> Result<usize> {
    if planned.is_empty() {
        return Ok(0);
    }
    let existing = column_set(&table_columns(conn, table)?);
    let mut added = 0;
    for (name, ty) in planned {
        if existing.contains(&name.to_ascii_lowercase()) {
            continue;
        }
        conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_ident(table),
                quote_ident(name),
                ty.sql_name()
            ),
            [],
        )?;
        added += 1;
    }
    if added > 0 {
        debug!(table, added, "feature_table.columns_added");
    }
    Ok(added)
}

/// Logs scalar attributes named like the geometry column; they are never
/// written. A scalar `fid` is not reported since it addresses the row.
pub(crate) fn warn_reserved(table: &str, attrs: &Attrs) {
    for key in attrs.keys() {
        if key.eq_ignore_ascii_case(GEOM_COLUMN) {
            warn!(table, key, "feature_table.reserved_attribute_skipped");
        }
    }
}
