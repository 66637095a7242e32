//! Synchronized bounding-box index (GeoPackage RTree extension).

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use super::schema::{quote_ident, GEOM_COLUMN, PRIMARY_KEY};
use crate::error::Result;

const EXTENSION_NAME: &str = "gpkg_rtree_index";
const EXTENSION_DEFINITION: &str = "http://www.geopackage.org/spec120/#extension_rtree";

const TRIGGER_SUFFIXES: [&str; 6] = ["insert", "update1", "update2", "update3", "update4", "delete"];

/// Name of the index virtual table for `table`.
pub(crate) fn index_table(table: &str) -> String {
    format!("rtree_{table}_{GEOM_COLUMN}")
}

/// Whether the index virtual table exists.
pub(crate) fn exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [index_table(table)],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Creates the index, backfills it from existing rows and installs the
/// synchronization triggers. Calling it on an indexed table only repairs
/// missing pieces.
pub(crate) fn create(conn: &Connection, table: &str) -> Result<()> {
    let rtree = index_table(table);
    let q_rtree = quote_ident(&rtree);
    let q_table = quote_ident(table);
    let fid = PRIMARY_KEY;
    let geom = GEOM_COLUMN;

    conn.execute(
        "INSERT OR IGNORE INTO gpkg_extensions
                (table_name, column_name, extension_name, definition, scope)
         VALUES (?1, ?2, ?3, ?4, 'write-only')",
        [table, geom, EXTENSION_NAME, EXTENSION_DEFINITION],
    )?;

    let existed = exists(conn, table)?;
    conn.execute(
        &format!("CREATE VIRTUAL TABLE IF NOT EXISTS {q_rtree} USING rtree(id, minx, maxx, miny, maxy)"),
        [],
    )?;
    if !existed {
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {q_rtree}
                 SELECT {fid}, ST_MinX({geom}), ST_MaxX({geom}), ST_MinY({geom}), ST_MaxY({geom})
                   FROM {q_table}
                  WHERE {geom} NOT NULL AND NOT ST_IsEmpty({geom})"
            ),
            [],
        )?;
    }

    let insert_values = format!(
        "INSERT OR REPLACE INTO {q_rtree} VALUES (
             NEW.{fid},
             ST_MinX(NEW.{geom}), ST_MaxX(NEW.{geom}),
             ST_MinY(NEW.{geom}), ST_MaxY(NEW.{geom})
         );"
    );
    let triggers = [
        format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER INSERT ON {q_table}
               WHEN (NEW.{geom} NOT NULL AND NOT ST_IsEmpty(NEW.{geom}))
             BEGIN
               {insert_values}
             END",
            trigger_name(&rtree, "insert")
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER UPDATE OF {geom} ON {q_table}
               WHEN OLD.{fid} = NEW.{fid}
                AND (NEW.{geom} NOTNULL AND NOT ST_IsEmpty(NEW.{geom}))
             BEGIN
               {insert_values}
             END",
            trigger_name(&rtree, "update1")
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER UPDATE OF {geom} ON {q_table}
               WHEN OLD.{fid} = NEW.{fid}
                AND (NEW.{geom} ISNULL OR ST_IsEmpty(NEW.{geom}))
             BEGIN
               DELETE FROM {q_rtree} WHERE id = OLD.{fid};
             END",
            trigger_name(&rtree, "update2")
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER UPDATE ON {q_table}
               WHEN OLD.{fid} != NEW.{fid}
                AND (NEW.{geom} NOTNULL AND NOT ST_IsEmpty(NEW.{geom}))
             BEGIN
               DELETE FROM {q_rtree} WHERE id = OLD.{fid};
               {insert_values}
             END",
            trigger_name(&rtree, "update3")
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER UPDATE ON {q_table}
               WHEN OLD.{fid} != NEW.{fid}
                AND (NEW.{geom} ISNULL OR ST_IsEmpty(NEW.{geom}))
             BEGIN
               DELETE FROM {q_rtree} WHERE id IN (OLD.{fid}, NEW.{fid});
             END",
            trigger_name(&rtree, "update4")
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER DELETE ON {q_table}
               WHEN OLD.{geom} NOT NULL
             BEGIN
               DELETE FROM {q_rtree} WHERE id = OLD.{fid};
             END",
            trigger_name(&rtree, "delete")
        ),
    ];
    for sql in &triggers {
        conn.execute(sql, [])?;
    }
    debug!(table, backfilled = !existed, "rtree.created");
    Ok(())
}

/// Removes the index, its shadow tables and triggers. A no-op when absent.
pub(crate) fn drop(conn: &Connection, table: &str) -> Result<()> {
    let rtree = index_table(table);
    for suffix in TRIGGER_SUFFIXES {
        conn.execute(&format!("DROP TRIGGER IF EXISTS {}", trigger_name(&rtree, suffix)), [])?;
    }
    conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&rtree)), [])?;
    conn.execute(
        "DELETE FROM gpkg_extensions WHERE table_name = ?1 AND extension_name = ?2",
        [table, EXTENSION_NAME],
    )?;
    debug!(table, "rtree.dropped");
    Ok(())
}

fn trigger_name(rtree: &str, suffix: &str) -> String {
    quote_ident(&format!("{rtree}_{suffix}"))
}
