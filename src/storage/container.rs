//! The spatial container: one SQLite connection plus GeoPackage metadata.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use super::feature_table::FeatureTable;
use super::functions;
use super::options::{JournalMode, StoreOptions};
use super::schema::{quote_ident, GEOM_COLUMN, PRIMARY_KEY};
use crate::error::{GraphError, Result};
use crate::geom::distance::SRID_WGS84;

/// `PRAGMA application_id` of a GeoPackage ("GPKG").
pub const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;
/// `PRAGMA user_version` for GeoPackage 1.2.
pub const GPKG_USER_VERSION: i32 = 10200;

const WGS84_DEFINITION: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]]";

const METADATA_DDL: &str = "
CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE IF NOT EXISTS gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT uk_gc_table_name UNIQUE (table_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE IF NOT EXISTS gpkg_extensions (
    table_name TEXT,
    column_name TEXT,
    extension_name TEXT NOT NULL,
    definition TEXT NOT NULL,
    scope TEXT NOT NULL,
    CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
CREATE TABLE IF NOT EXISTS gpkg_ogr_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    feature_count INTEGER DEFAULT NULL
);
";

/// Registry entry of one feature table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// OGC geometry type name (`POINT`, `LINESTRING`, ...).
    pub geometry_type: String,
    /// Spatial reference id of the geometry column.
    pub srid: i32,
}

/// Owner of the single connection to a GeoPackage file.
///
/// All higher layers borrow the container; none of them opens a second
/// connection.
pub struct Container {
    conn: Connection,
    path: Option<PathBuf>,
    opts: StoreOptions,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("read_only", &self.opts.read_only)
            .finish()
    }
}

impl Container {
    /// Opens (creating if needed) a container file.
    pub fn open(path: impl AsRef<Path>, opts: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let flags = if opts.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let conn = Connection::open_with_flags(path, flags)?;
        Self::from_connection(conn, Some(path.to_path_buf()), opts)
    }

    /// Opens a private in-memory container.
    pub fn open_in_memory(opts: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let opts = StoreOptions {
            journal_mode: Some(JournalMode::Memory),
            read_only: false,
            ..opts
        };
        Self::from_connection(conn, None, opts)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>, opts: StoreOptions) -> Result<Self> {
        functions::register(&conn)?;
        conn.pragma_update(None, "recursive_triggers", "ON")?;
        if !opts.read_only {
            conn.pragma_update(None, "synchronous", opts.synchronous.as_str())?;
            if let Some(mode) = opts.journal_mode {
                conn.pragma_update(None, "journal_mode", mode.as_str())?;
            }
        }
        if let Some(kib) = opts.cache_size_kib {
            conn.pragma_update(None, "cache_size", -i64::from(kib))?;
        }
        let container = Self { conn, path, opts };
        if !container.opts.read_only && container.is_blank()? {
            container.initialize()?;
        }
        Ok(container)
    }

    fn is_blank(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |r| r.get(0))?;
        Ok(count == 0)
    }

    fn initialize(&self) -> Result<()> {
        self.write_txn(|conn| {
            conn.pragma_update(None, "application_id", GPKG_APPLICATION_ID)?;
            conn.pragma_update(None, "user_version", GPKG_USER_VERSION)?;
            conn.execute_batch(METADATA_DDL)?;
            let seeds: [(&str, i32, &str, i32, &str); 3] = [
                ("Undefined cartesian SRS", -1, "NONE", -1, "undefined"),
                ("Undefined geographic SRS", 0, "NONE", 0, "undefined"),
                ("WGS 84 geodetic", SRID_WGS84, "EPSG", SRID_WGS84, WGS84_DEFINITION),
            ];
            for (name, id, org, org_id, definition) in seeds {
                conn.execute(
                    "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
                            (srs_name, srs_id, organization, organization_coordsys_id, definition)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![name, id, org, org_id, definition],
                )?;
            }
            Ok(())
        })?;
        debug!(path = ?self.path, "container.initialized");
        Ok(())
    }

    /// Borrowed connection for read queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// File path, `None` for in-memory containers.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Options this container was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.opts
    }

    /// Whether mutations are rejected.
    pub fn is_read_only(&self) -> bool {
        self.opts.read_only
    }

    /// Runs `f` inside one transaction, committing on success and rolling
    /// back on error. Nested calls join the enclosing transaction.
    pub fn write_txn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.opts.read_only {
            return Err(GraphError::ImmutableGraph);
        }
        if !self.conn.is_autocommit() {
            return f(&self.conn);
        }
        let tx = self.conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Makes sure `srid` has a registry row; unknown ids get a placeholder.
    pub(crate) fn ensure_srs(&self, conn: &Connection, srid: i32) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
                    (srs_name, srs_id, organization, organization_coordsys_id, definition)
             VALUES (?1, ?2, 'EPSG', ?2, 'undefined')",
            rusqlite::params![format!("EPSG:{srid}"), srid],
        )?;
        Ok(())
    }

    /// Registry entry for `name`, if it is a feature table.
    pub fn table_def(&self, name: &str) -> Result<Option<TableDef>> {
        let def = self
            .conn
            .query_row(
                "SELECT c.table_name, g.geometry_type_name, g.srs_id
                   FROM gpkg_contents c
                   JOIN gpkg_geometry_columns g ON g.table_name = c.table_name
                  WHERE c.table_name = ?1 AND c.data_type = 'features'",
                [name],
                |r| {
                    Ok(TableDef {
                        name: r.get(0)?,
                        geometry_type: r.get(1)?,
                        srid: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(def)
    }

    /// All registered feature tables in name order.
    pub fn feature_tables(&self) -> Result<Vec<TableDef>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.table_name, g.geometry_type_name, g.srs_id
               FROM gpkg_contents c
               JOIN gpkg_geometry_columns g ON g.table_name = c.table_name
              WHERE c.data_type = 'features'
              ORDER BY c.table_name",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(TableDef {
                name: r.get(0)?,
                geometry_type: r.get(1)?,
                srid: r.get(2)?,
            })
        })?;
        let mut defs = Vec::new();
        for def in rows {
            defs.push(def?);
        }
        Ok(defs)
    }

    /// Handle on an existing feature table.
    pub fn feature_table(&self, name: &str) -> Result<FeatureTable<'_>> {
        let def = self
            .table_def(name)?
            .ok_or_else(|| GraphError::InvalidArgument(format!("{name:?} is not a feature table")))?;
        Ok(FeatureTable::new(self, def))
    }

    /// Registers and creates a feature table with the fixed `fid`/`geom`
    /// columns. Fails with `AlreadyExists` if the name is taken.
    pub fn create_feature_table(&self, name: &str, geometry_type: &str, srid: i32) -> Result<FeatureTable<'_>> {
        let def = TableDef {
            name: name.to_string(),
            geometry_type: geometry_type.to_ascii_uppercase(),
            srid,
        };
        self.write_txn(|conn| {
            let taken: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE name = ?1
                     UNION ALL
                     SELECT 1 FROM gpkg_contents WHERE table_name = ?1",
                    [name],
                    |r| r.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Err(GraphError::AlreadyExists {
                    table: name.to_string(),
                });
            }
            self.ensure_srs(conn, srid)?;
            conn.execute(
                "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id)
                 VALUES (?1, 'features', ?1, ?2)",
                rusqlite::params![name, srid],
            )?;
            conn.execute(
                "INSERT INTO gpkg_ogr_contents (table_name, feature_count) VALUES (?1, 0)",
                [name],
            )?;
            conn.execute(
                "INSERT INTO gpkg_geometry_columns
                        (table_name, column_name, geometry_type_name, srs_id, z, m)
                 VALUES (?1, ?2, ?3, ?4, 0, 0)",
                rusqlite::params![name, GEOM_COLUMN, def.geometry_type, srid],
            )?;
            conn.execute(
                &format!(
                    "CREATE TABLE {} ({PRIMARY_KEY} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, {GEOM_COLUMN} BLOB)",
                    quote_ident(name)
                ),
                [],
            )?;
            Ok(())
        })?;
        debug!(table = name, geometry_type, srid, "feature_table.created");
        Ok(FeatureTable::new(self, def))
    }

    /// Duplicates the whole container into an independent in-memory
    /// instance using the online backup API. Indexes and triggers come along.
    pub fn to_in_memory_copy(&self) -> Result<Container> {
        let mut dst = Connection::open_in_memory()?;
        {
            let backup = Backup::new(&self.conn, &mut dst)?;
            backup.run_to_completion(4096, Duration::ZERO, None)?;
        }
        let opts = StoreOptions {
            journal_mode: Some(JournalMode::Memory),
            ..self.opts.clone()
        };
        debug!(source = ?self.path, "container.copied_to_memory");
        Self::from_connection(dst, None, opts)
    }
}
