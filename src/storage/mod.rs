//! Spatial container storage.
//!
//! A [`Container`] owns the single SQLite connection and the GeoPackage
//! registry tables. [`FeatureTable`] handles borrow it to write rows of
//! sparse typed attributes plus a geometry column, keep the bounding-box
//! index in sync and answer spatial queries.

/// Container lifecycle and registry tables.
pub mod container;

/// Feature table handle: writes, partial updates and spatial queries.
pub mod feature_table;

mod functions;
mod options;
mod rtree;
pub(crate) mod schema;
mod types;

pub use container::{Container, TableDef, GPKG_APPLICATION_ID, GPKG_USER_VERSION};
pub use feature_table::{Conflict, Feature, FeatureTable, Scan, ScanIter, WriteStats};
pub use options::{JournalMode, StoreOptions, Synchronous, DEFAULT_BATCH_SIZE};
pub use schema::{Column, GEOM_COLUMN, PRIMARY_KEY};
pub use types::{AttrValue, Attrs, ColumnType, GEOM_KEY};
