use serde::{Deserialize, Serialize};

use crate::geom::distance::SRID_WGS84;

/// Default number of edges per ingestion batch.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// Durability mode applied through `PRAGMA synchronous`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
    /// Sync on every commit (most durable).
    Full,
    /// Sync at critical moments only.
    #[default]
    Normal,
    /// No explicit syncs (fastest but least durable).
    Off,
}

impl Synchronous {
    /// Returns the pragma value.
    pub fn as_str(self) -> &'static str {
        match self {
            Synchronous::Full => "FULL",
            Synchronous::Normal => "NORMAL",
            Synchronous::Off => "OFF",
        }
    }
}

/// Rollback journal strategy applied through `PRAGMA journal_mode`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Classic rollback journal.
    Delete,
    /// Write-ahead log (single writer, concurrent readers).
    Wal,
    /// Journal kept in memory.
    Memory,
}

impl JournalMode {
    /// Returns the pragma value.
    pub fn as_str(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Wal => "WAL",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Configuration supplied when creating or opening a graph container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Number of edges committed per ingestion transaction.
    pub batch_size: usize,
    /// Spatial reference id of stored geometries.
    pub srid: i32,
    /// `PRAGMA synchronous` mode.
    pub synchronous: Synchronous,
    /// `PRAGMA journal_mode`; `None` keeps the engine default.
    pub journal_mode: Option<JournalMode>,
    /// Page cache size in KiB; `None` keeps the engine default.
    pub cache_size_kib: Option<u32>,
    /// Whether new graph tables get a synchronized bounding-box index.
    pub spatial_index: bool,
    /// Whether ingestion derives `_length` (metres) from line geometries.
    pub compute_length: bool,
    /// Open without write access.
    pub read_only: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            srid: SRID_WGS84,
            synchronous: Synchronous::Normal,
            journal_mode: Some(JournalMode::Wal),
            cache_size_kib: None,
            spatial_index: true,
            compute_length: false,
            read_only: false,
        }
    }
}

impl StoreOptions {
    /// Options tuned for one-shot bulk imports: no fsyncs, large batches and
    /// the spatial index deferred until `reindex`.
    pub fn bulk_load() -> Self {
        Self {
            batch_size: 20_000,
            synchronous: Synchronous::Off,
            journal_mode: Some(JournalMode::Memory),
            cache_size_kib: Some(256 * 1024),
            spatial_index: false,
            ..Self::default()
        }
    }

    /// Options for read-only access to an existing container.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            journal_mode: None,
            ..Self::default()
        }
    }

    /// Sets the ingestion batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the spatial reference id.
    pub fn srid(mut self, srid: i32) -> Self {
        self.srid = srid;
        self
    }

    /// Sets the synchronous mode.
    pub fn synchronous(mut self, mode: Synchronous) -> Self {
        self.synchronous = mode;
        self
    }

    /// Sets the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = Some(mode);
        self
    }

    /// Sets the page cache size.
    pub fn cache_size_kib(mut self, kib: u32) -> Self {
        self.cache_size_kib = Some(kib);
        self
    }

    /// Enables or disables the spatial index on new graph tables.
    pub fn spatial_index(mut self, enabled: bool) -> Self {
        self.spatial_index = enabled;
        self
    }

    /// Enables or disables `_length` derivation during ingestion.
    pub fn compute_length(mut self, enabled: bool) -> Self {
        self.compute_length = enabled;
        self
    }

    /// Sets read-only access.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}
