//! Run Reader
//!
//! Sequential, batched iteration over a slice of a run.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};
use crate::types::{Datum, DatumType};

use super::READ_BATCH_VALUES;

/// Iterator over the values of a run, oldest first.
///
/// Owns its file handle, so dropping the reader early closes the file.
pub struct RunReader {
    path: PathBuf,
    file: File,
    datum_type: DatumType,
    /// Values still on disk
    remaining: u64,
    /// Raw bytes of the current batch
    batch: Vec<u8>,
    /// Read position inside `batch`
    cursor: usize,
}

impl RunReader {
    /// Position a reader at value `start`, yielding `count` values
    pub(super) fn open(path: &Path, datum_type: DatumType, start: u64, count: u64) -> Result<Self> {
        let mut file = File::open(path).with_file("open", path)?;
        file.seek(SeekFrom::Start(start * datum_type.width() as u64))
            .with_file("seek", path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            datum_type,
            remaining: count,
            batch: Vec::new(),
            cursor: 0,
        })
    }

    /// Values not yet yielded
    pub fn remaining(&self) -> u64 {
        self.remaining + ((self.batch.len() - self.cursor) / self.datum_type.width()) as u64
    }

    /// Pull the next batch of raw bytes from disk
    fn fill(&mut self) -> Result<()> {
        let values = self.remaining.min(READ_BATCH_VALUES as u64) as usize;
        self.batch.resize(values * self.datum_type.width(), 0);
        self.cursor = 0;

        self.file
            .read_exact(&mut self.batch)
            .with_file("read", &self.path)?;
        self.remaining -= values as u64;
        Ok(())
    }
}

impl Iterator for RunReader {
    type Item = Result<Datum>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == self.batch.len() {
            if self.remaining == 0 {
                return None;
            }
            if let Err(e) = self.fill() {
                // Fuse after the first error
                self.remaining = 0;
                self.batch.clear();
                self.cursor = 0;
                return Some(Err(e));
            }
        }

        let width = self.datum_type.width();
        let mut bytes = &self.batch[self.cursor..self.cursor + width];
        self.cursor += width;
        Some(Ok(Datum::decode(self.datum_type, &mut bytes)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining() as usize;
        (n, Some(n))
    }
}
