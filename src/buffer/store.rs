//! Write Buffer
//!
//! Appends rows to the buffer file and hands out readers over it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{IoContext, Result, StoreError};
use crate::schema::Schema;
use crate::types::Datum;

use super::RowReader;

/// Row-major append-only buffer file
pub struct WriteBuffer {
    /// Owning table (for diagnostics)
    table_name: String,

    schema: Arc<Schema>,

    /// Buffer file path
    path: PathBuf,

    /// Append handle
    file: File,

    /// Rows present from offset 0
    row_count: u64,
}

impl WriteBuffer {
    /// Create an empty buffer, truncating any existing file
    pub fn create(path: &Path, table_name: &str, schema: Arc<Schema>) -> Result<Self> {
        let file = Self::open_append(path, true)?;
        file.set_len(0).with_file("truncate", path)?;

        Ok(Self {
            table_name: table_name.to_string(),
            schema,
            path: path.to_path_buf(),
            file,
            row_count: 0,
        })
    }

    /// Reopen a buffer known to hold `row_count` rows.
    ///
    /// Bytes past the last counted row belong to an insert whose metadata
    /// update never landed and are cut off.
    pub fn open(path: &Path, table_name: &str, schema: Arc<Schema>, row_count: u64) -> Result<Self> {
        let file = Self::open_append(path, false)?;
        let len = file.metadata().with_file("stat", path)?.len();
        let expected = row_count * schema.row_byte_width() as u64;

        if len < expected {
            return Err(StoreError::Storage(format!(
                "write buffer {} is {} bytes, expected {} for {} rows",
                path.display(),
                len,
                expected,
                row_count
            )));
        }
        if len > expected {
            tracing::warn!(
                table = table_name,
                path = %path.display(),
                len,
                expected,
                "truncating write buffer to persisted row count"
            );
            file.set_len(expected).with_file("truncate", path)?;
        }

        Ok(Self {
            table_name: table_name.to_string(),
            schema,
            path: path.to_path_buf(),
            file,
            row_count,
        })
    }

    /// Append one row; returns the new row count
    pub fn insert(&mut self, row: &[Datum]) -> Result<u64> {
        self.schema.check_row(row)?;

        let mut record = Vec::with_capacity(self.schema.row_byte_width());
        for datum in row {
            datum.encode(&mut record);
        }

        if let Err(e) = self.file.write_all(&record) {
            // Keep the file aligned to whole rows
            let committed = self.row_count * self.schema.row_byte_width() as u64;
            if let Err(trunc) = self.file.set_len(committed) {
                tracing::warn!(path = %self.path.display(), error = %trunc, "failed to drop partial row");
            }
            return Err(StoreError::file("append to", &self.path, e));
        }

        self.row_count += 1;
        Ok(self.row_count)
    }

    /// Lazily read rows `[i, j)`
    pub fn read_range(&self, i: u64, j: u64) -> Result<RowReader> {
        if j < i || j > self.row_count {
            return Err(StoreError::InvalidRange { start: i, end: j });
        }
        RowReader::open(&self.path, Arc::clone(&self.schema), i, j - i)
    }

    /// Lazily read every buffered row
    pub fn read_all(&self) -> Result<RowReader> {
        self.read_range(0, self.row_count)
    }

    /// Drop every row
    pub fn clear(&mut self) -> Result<()> {
        self.truncate(0)?;
        tracing::trace!(table = %self.table_name, "write buffer cleared");
        Ok(())
    }

    /// Keep only the first `row_count` rows
    pub fn truncate(&mut self, row_count: u64) -> Result<()> {
        if row_count > self.row_count {
            return Err(StoreError::InvalidRange {
                start: row_count,
                end: self.row_count,
            });
        }
        let len = row_count * self.schema.row_byte_width() as u64;
        self.file.set_len(len).with_file("truncate", &self.path)?;
        self.row_count = row_count;
        Ok(())
    }

    /// Force buffered rows to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data().with_file("sync", &self.path)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn open_append(path: &Path, create: bool) -> Result<File> {
        OpenOptions::new()
            .create(create)
            .read(true)
            .append(true)
            .open(path)
            .with_file("open", path)
    }
}
