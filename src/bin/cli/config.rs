use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use netpack::storage::{JournalMode, StoreOptions, Synchronous};

use super::OutputFormat;

/// Settings read from `cli.toml`. Every field is optional; flags given on
/// the command line win over the file.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let must_exist = explicit.is_some();
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            Some(config_path) if must_exist => {
                return Err(ConfigError::Missing {
                    path: config_path.clone(),
                })
            }
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn format(&self) -> Option<OutputFormat> {
        self.data.format
    }

    /// Applies the `[store]` overrides on top of `base`.
    pub fn store_options(&self, base: StoreOptions) -> StoreOptions {
        self.data.store.apply(base)
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    format: Option<OutputFormat>,
    #[serde(default)]
    store: RawStore,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStore {
    batch_size: Option<usize>,
    srid: Option<i32>,
    synchronous: Option<Synchronous>,
    journal_mode: Option<JournalMode>,
    cache_size_kib: Option<u32>,
    spatial_index: Option<bool>,
    compute_length: Option<bool>,
}

impl RawStore {
    fn apply(&self, mut opts: StoreOptions) -> StoreOptions {
        if let Some(batch_size) = self.batch_size {
            opts = opts.batch_size(batch_size);
        }
        if let Some(srid) = self.srid {
            opts = opts.srid(srid);
        }
        if let Some(mode) = self.synchronous {
            opts = opts.synchronous(mode);
        }
        if let Some(mode) = self.journal_mode {
            opts = opts.journal_mode(mode);
        }
        if let Some(kib) = self.cache_size_kib {
            opts = opts.cache_size_kib(kib);
        }
        if let Some(enabled) = self.spatial_index {
            opts = opts.spatial_index(enabled);
        }
        if let Some(enabled) = self.compute_length {
            opts = opts.compute_length(enabled);
        }
        opts
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("CLI config {path} does not exist")]
    Missing { path: PathBuf },
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("netpack").join("cli.toml"))
}
