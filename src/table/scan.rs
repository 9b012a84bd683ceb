//! Table Scan
//!
//! Zips column scans into rows, then continues with the buffered tail.

use crate::buffer::RowReader;
use crate::error::{Result, StoreError};
use crate::storage::ColumnScan;
use crate::types::Row;

/// Row stream over a table, oldest row first.
///
/// Yields every merged row (from the columns) followed by every buffered
/// row, each projected onto the requested column ranks. Stops after the
/// first error.
pub struct TableScan {
    /// One scan per requested rank, in projection order
    columns: Vec<ColumnScan>,
    /// Rows still in the write buffer
    buffered: RowReader,
    /// Requested ranks, applied to buffered rows
    projection: Vec<usize>,
    columns_done: bool,
    failed: bool,
}

impl TableScan {
    pub(super) fn new(columns: Vec<ColumnScan>, buffered: RowReader, projection: Vec<usize>) -> Self {
        Self {
            columns,
            buffered,
            projection,
            columns_done: false,
            failed: false,
        }
    }

    /// Pull one value from every column; `None` once all are exhausted together
    fn next_merged(&mut self) -> Option<Result<Row>> {
        let mut row = Row::with_capacity(self.columns.len());
        let mut exhausted = 0;

        for scan in &mut self.columns {
            match scan.next() {
                Some(Ok(datum)) => row.push(datum),
                Some(Err(e)) => return Some(Err(e)),
                None => exhausted += 1,
            }
        }

        if exhausted == self.columns.len() {
            None
        } else if exhausted > 0 {
            Some(Err(StoreError::Storage(format!(
                "column scans out of step: {} of {} ended early",
                exhausted,
                self.columns.len()
            ))))
        } else {
            Some(Ok(row))
        }
    }
}

impl Iterator for TableScan {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if !self.columns_done {
            match self.next_merged() {
                Some(Ok(row)) => return Some(Ok(row)),
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => {
                    self.columns_done = true;
                    // Release the producer threads' channels
                    self.columns.clear();
                }
            }
        }

        match self.buffered.next()? {
            Ok(full) => Some(Ok(self.projection.iter().map(|&rank| full[rank]).collect())),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
