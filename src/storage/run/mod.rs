//! Run Module
//!
//! A run is one immutable on-disk segment holding a fixed number of
//! fixed-width values of a single column, in insertion order.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Value 0: 8 bytes little-endian                          │
//! │ Value 1: 8 bytes little-endian                          │
//! │ ...                                                     │
//! │ Value N-1                                               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! No header and no footer: the element count lives in the file name
//! (assigned by the column) and in the in-memory handle, so the byte offset
//! of value `k` is `k * width`.

mod builder;
mod reader;

use std::fs;
use std::path::{Path, PathBuf};

pub use builder::RunBuilder;
pub use reader::RunReader;

use crate::error::{IoContext, Result, StoreError};
use crate::types::{Datum, DatumType};

// =============================================================================
// Shared Constants (used by builder and reader)
// =============================================================================

/// Values decoded per read syscall
pub(crate) const READ_BATCH_VALUES: usize = 4096;

/// Values encoded per write syscall
pub(crate) const WRITE_BATCH_VALUES: usize = 1024;

// =============================================================================
// Run Handle
// =============================================================================

/// Handle to an immutable run file.
///
/// Deliberately not `Clone`: [`Run::delete`] consumes the handle, so a
/// deleted run cannot be read or renamed afterwards.
#[derive(Debug)]
pub struct Run {
    path: PathBuf,
    element_count: u64,
    datum_type: DatumType,
}

impl Run {
    /// Write a new run at `path` from an ordered source of values.
    ///
    /// The whole source is consumed. Fails with `SizeMismatch` if it yields a
    /// different number of values than `declared_count`; the partially written
    /// file is removed on any failure.
    pub fn create<I>(
        path: &Path,
        datum_type: DatumType,
        source: I,
        declared_count: u64,
    ) -> Result<Run>
    where
        I: IntoIterator<Item = Result<Datum>>,
    {
        let mut builder = RunBuilder::new(path, datum_type)?;

        for datum in source {
            if let Err(e) = datum.and_then(|d| builder.add(d)) {
                builder.abort();
                return Err(e);
            }
        }

        if builder.count() != declared_count {
            let actual = builder.count();
            builder.abort();
            return Err(StoreError::SizeMismatch {
                expected: declared_count,
                actual,
            });
        }

        builder.finish()
    }

    /// Reattach to an existing run file, checking its length
    pub fn open(path: &Path, datum_type: DatumType, element_count: u64) -> Result<Run> {
        let expected = element_count
            .checked_mul(datum_type.width() as u64)
            .ok_or_else(|| {
                StoreError::Storage(format!(
                    "run {} claims {} values, more than a file can hold",
                    path.display(),
                    element_count
                ))
            })?;
        let len = fs::metadata(path).with_file("stat", path)?.len();
        if len != expected {
            return Err(StoreError::Storage(format!(
                "run {} is {} bytes, expected {} for {} values",
                path.display(),
                len,
                expected,
                element_count
            )));
        }

        Ok(Run {
            path: path.to_path_buf(),
            element_count,
            datum_type,
        })
    }

    /// Lazily read values `[i, j)`
    pub fn read_range(&self, i: u64, j: u64) -> Result<RunReader> {
        if j < i || j > self.element_count {
            return Err(StoreError::InvalidRange { start: i, end: j });
        }
        RunReader::open(&self.path, self.datum_type, i, j - i)
    }

    /// Read the single value at `i`
    pub fn read_one(&self, i: u64) -> Result<Datum> {
        if i >= self.element_count {
            return Err(StoreError::OutOfBounds {
                index: i,
                len: self.element_count,
            });
        }
        match self.read_range(i, i + 1)?.next() {
            Some(datum) => datum,
            None => Err(StoreError::Storage(format!(
                "run {} ended before index {}",
                self.path.display(),
                i
            ))),
        }
    }

    /// Lazily read every value of the run
    pub fn read_all(&self) -> Result<RunReader> {
        self.read_range(0, self.element_count)
    }

    /// Write `self`'s values followed by `other`'s to a new run at `new_path`.
    /// Neither input is modified.
    pub fn merge(&self, other: &Run, new_path: &Path) -> Result<Run> {
        if self.datum_type != other.datum_type {
            return Err(StoreError::SchemaMismatch(format!(
                "cannot merge {} run with {} run",
                self.datum_type, other.datum_type
            )));
        }

        let source = self.read_all()?.chain(other.read_all()?);
        Run::create(
            new_path,
            self.datum_type,
            source,
            self.element_count + other.element_count,
        )
    }

    /// Move the backing file; fails if `new_path` already exists
    pub fn rename(&mut self, new_path: &Path) -> Result<()> {
        if new_path.exists() {
            return Err(StoreError::Storage(format!(
                "cannot rename {} to {}: target exists",
                self.path.display(),
                new_path.display()
            )));
        }
        fs::rename(&self.path, new_path).with_file("rename", &self.path)?;
        tracing::trace!(from = %self.path.display(), to = %new_path.display(), "run renamed");
        self.path = new_path.to_path_buf();
        Ok(())
    }

    /// Remove the backing file, consuming the handle
    pub fn delete(self) -> Result<()> {
        fs::remove_file(&self.path).with_file("delete", &self.path)?;
        tracing::trace!(path = %self.path.display(), "run deleted");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    pub fn datum_type(&self) -> DatumType {
        self.datum_type
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
