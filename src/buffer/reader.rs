//! Row Reader
//!
//! Sequential iteration over a slice of the write buffer.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{IoContext, Result};
use crate::schema::Schema;
use crate::types::{Datum, Row};

/// Rows decoded per read syscall
const READ_BATCH_ROWS: usize = 256;

/// Iterator over buffered rows in insertion order
pub struct RowReader {
    path: PathBuf,
    file: File,
    schema: Arc<Schema>,
    /// Rows still on disk
    remaining: u64,
    /// Raw bytes of the current batch
    batch: Vec<u8>,
    /// Read position inside `batch`
    cursor: usize,
}

impl RowReader {
    /// Position a reader at row `start`, yielding `count` rows
    pub(super) fn open(path: &Path, schema: Arc<Schema>, start: u64, count: u64) -> Result<Self> {
        let mut file = File::open(path).with_file("open", path)?;
        file.seek(SeekFrom::Start(start * schema.row_byte_width() as u64))
            .with_file("seek", path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            schema,
            remaining: count,
            batch: Vec::new(),
            cursor: 0,
        })
    }

    fn fill(&mut self) -> Result<()> {
        let rows = self.remaining.min(READ_BATCH_ROWS as u64) as usize;
        self.batch.resize(rows * self.schema.row_byte_width(), 0);
        self.cursor = 0;

        self.file
            .read_exact(&mut self.batch)
            .with_file("read", &self.path)?;
        self.remaining -= rows as u64;
        Ok(())
    }
}

impl Iterator for RowReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == self.batch.len() {
            if self.remaining == 0 {
                return None;
            }
            if let Err(e) = self.fill() {
                self.remaining = 0;
                self.batch.clear();
                self.cursor = 0;
                return Some(Err(e));
            }
        }

        let width = self.schema.row_byte_width();
        let mut bytes = &self.batch[self.cursor..self.cursor + width];
        self.cursor += width;

        let row = self
            .schema
            .fields()
            .iter()
            .map(|field| Datum::decode(field.datum_type, &mut bytes))
            .collect();
        Some(Ok(row))
    }
}
