//! Configuration for runstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// Main configuration for a runstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all tables
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {table}/
    ///           ├── metadata        (table descriptor)
    ///           ├── insert_buffer   (row-major write buffer)
    ///           ├── c0/             (runs of column 0, named by size)
    ///           └── c1/ ...
    pub data_dir: PathBuf,

    /// fsync the metadata descriptor every time it is stored
    pub sync_metadata: bool,

    // -------------------------------------------------------------------------
    // Write Buffer Configuration
    // -------------------------------------------------------------------------
    /// Number of buffered rows that triggers a flush into the columns.
    /// Only used for new tables; loaded tables keep their persisted value.
    pub flush_threshold: usize,

    // -------------------------------------------------------------------------
    // Scan Configuration
    // -------------------------------------------------------------------------
    /// Max batches queued between a column scan producer and its consumer
    pub scan_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./runstore_data"),
            sync_metadata: true,
            flush_threshold: 1024,
            scan_channel_capacity: 16,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding everything that belongs to one table
    pub fn table_dir(&self, table_name: &str) -> PathBuf {
        self.data_dir.join(table_name)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(StoreError::Config(
                "flush_threshold must be greater than zero".to_string(),
            ));
        }
        if self.scan_channel_capacity == 0 {
            return Err(StoreError::Config(
                "scan_channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all tables)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Enable or disable fsync of the metadata descriptor
    pub fn sync_metadata(mut self, sync: bool) -> Self {
        self.config.sync_metadata = sync;
        self
    }

    /// Set the write buffer flush threshold (in rows)
    pub fn flush_threshold(mut self, rows: usize) -> Self {
        self.config.flush_threshold = rows;
        self
    }

    /// Set the scan pipeline queue bound (in batches)
    pub fn scan_channel_capacity(mut self, batches: usize) -> Self {
        self.config.scan_channel_capacity = batches;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
