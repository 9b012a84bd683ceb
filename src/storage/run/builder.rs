//! Run Builder
//!
//! Streams values into a new run file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result, StoreError};
use crate::types::{Datum, DatumType};

use super::{Run, WRITE_BATCH_VALUES};

/// Builder for creating a new run from values in insertion order
pub struct RunBuilder {
    /// Output file path
    path: PathBuf,
    /// Output file, created exclusively
    file: File,
    /// Type every value must have
    datum_type: DatumType,
    /// Encoded values not yet written
    pending: Vec<u8>,
    /// Number of values accepted so far
    count: u64,
}

impl RunBuilder {
    /// Create the run file; fails if `path` already exists
    pub fn new(path: &Path, datum_type: DatumType) -> Result<Self> {
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .with_file("create", path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            datum_type,
            pending: Vec::with_capacity(WRITE_BATCH_VALUES * datum_type.width()),
            count: 0,
        })
    }

    /// Append one value
    pub fn add(&mut self, datum: Datum) -> Result<()> {
        if datum.datum_type() != self.datum_type {
            return Err(StoreError::SchemaMismatch(format!(
                "{} run cannot hold a {} value",
                self.datum_type,
                datum.datum_type()
            )));
        }

        datum.encode(&mut self.pending);
        self.count += 1;

        if self.pending.len() >= WRITE_BATCH_VALUES * self.datum_type.width() {
            self.write_pending()?;
        }
        Ok(())
    }

    /// Number of values added so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Write what is left, fsync, and hand back the run
    pub fn finish(mut self) -> Result<Run> {
        if let Err(e) = self.write_pending().and_then(|_| {
            self.file.sync_all().with_file("sync", &self.path)
        }) {
            self.abort();
            return Err(e);
        }

        tracing::trace!(path = %self.path.display(), count = self.count, "run created");

        Ok(Run {
            path: self.path,
            element_count: self.count,
            datum_type: self.datum_type,
        })
    }

    /// Drop the partially written file
    pub fn abort(self) {
        let RunBuilder { path, file, .. } = self;
        drop(file);
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove aborted run");
        }
    }

    fn write_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.file
            .write_all(&self.pending)
            .with_file("write", &self.path)?;
        self.pending.clear();
        Ok(())
    }
}
