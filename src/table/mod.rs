//! Table Module
//!
//! Coordinates one write buffer and one column per schema field.
//!
//! ## Responsibilities
//! - Stage inserts in the row-major write buffer
//! - Flush the buffer into the columns once it reaches the threshold
//! - Route bulk loads straight into the columns, in parallel
//! - Present buffered and merged rows as one stream in insertion order
//! - Persist the table descriptor after every mutation
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/{table}/
//!   ├── metadata
//!   ├── insert_buffer
//!   ├── c0/
//!   └── c1/ ...
//! ```

mod metadata;
mod scan;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam::channel::{self, Sender};

pub use metadata::TableMetadata;
pub use scan::TableScan;

use crate::buffer::WriteBuffer;
use crate::config::Config;
use crate::error::{IoContext, Result, StoreError};
use crate::schema::Schema;
use crate::storage::{Column, StagedMerge};
use crate::types::{Datum, Row};

/// Values queued per column while a bulk load fans rows out
const BULK_CHANNEL_CAPACITY: usize = 4096;

/// A table: write buffer + columns
///
/// ## Concurrency Model: Single Writer
///
/// - **Writes** (`insert`/`bulk_insert`) take `&mut self`, so the borrow
///   checker rules out concurrent writers and reads during a flush.
/// - **Reads** (`scan`/`get_row`) take `&self` and may run side by side.
/// - `bulk_insert` merges every column on its own scoped thread; column
///   directories are disjoint, and the call returns only after all of them
///   have finished.
pub struct Table {
    name: String,

    /// Table directory under the storage root
    dir: PathBuf,

    schema: Arc<Schema>,

    /// One column per schema field, indexed by rank
    columns: Vec<Column>,

    /// Rows not yet merged into the columns
    buffer: WriteBuffer,

    /// Rows inserted so far, buffered or merged
    total_row_count: u64,

    /// Buffered row count that triggers a flush
    flush_threshold: u64,

    sync_metadata: bool,
}

impl Table {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const METADATA_FILENAME: &'static str = "metadata";
    const BUFFER_FILENAME: &'static str = "insert_buffer";

    /// Create a new, empty table under `config.data_dir`
    ///
    /// Fails if the table directory already holds anything.
    pub fn create(config: &Config, name: &str, schema: Schema) -> Result<Self> {
        config.validate()?;
        Self::validate_name(name)?;

        let dir = config.table_dir(name);
        if dir.exists() && fs::read_dir(&dir).with_file("list", &dir)?.next().is_some() {
            return Err(StoreError::Storage(format!(
                "table {:?} already exists at {}",
                name,
                dir.display()
            )));
        }
        fs::create_dir_all(&dir).with_file("create directory", &dir)?;

        let schema = Arc::new(schema);
        let buffer = WriteBuffer::create(&dir.join(Self::BUFFER_FILENAME), name, Arc::clone(&schema))?;

        let columns = (0..schema.field_count())
            .map(|rank| {
                Column::create(
                    &Self::column_dir(&dir, rank),
                    name,
                    Arc::clone(&schema),
                    rank,
                    config.scan_channel_capacity,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let table = Self {
            name: name.to_string(),
            dir,
            schema,
            columns,
            buffer,
            total_row_count: 0,
            flush_threshold: config.flush_threshold as u64,
            sync_metadata: config.sync_metadata,
        };
        table.store_metadata()?;

        tracing::info!(
            table = name,
            columns = table.schema.field_count(),
            flush_threshold = table.flush_threshold,
            "table created"
        );

        Ok(table)
    }

    /// Reopen an existing table
    ///
    /// On startup:
    /// 1. Read the metadata descriptor
    /// 2. Reopen every column from its run files
    /// 3. Check each column holds exactly the merged share of the rows
    /// 4. Reopen the write buffer with the remaining rows
    pub fn load(config: &Config, name: &str) -> Result<Self> {
        config.validate()?;
        Self::validate_name(name)?;

        let dir = config.table_dir(name);
        let meta = TableMetadata::load(&dir.join(Self::METADATA_FILENAME))?;
        if meta.name != name {
            return Err(StoreError::Storage(format!(
                "directory of table {:?} holds metadata for {:?}",
                name, meta.name
            )));
        }
        if meta.flush_threshold != config.flush_threshold as u64 {
            tracing::warn!(
                table = name,
                persisted = meta.flush_threshold,
                configured = config.flush_threshold,
                "using persisted flush threshold"
            );
        }

        let schema = Arc::new(meta.schema);
        let buffered = meta.total_row_count % meta.flush_threshold;
        let merged = meta.total_row_count - buffered;

        let mut columns = Vec::with_capacity(schema.field_count());
        for rank in 0..schema.field_count() {
            let column = Column::open(
                &Self::column_dir(&dir, rank),
                name,
                Arc::clone(&schema),
                rank,
                config.scan_channel_capacity,
            )?;
            if column.len() != merged {
                return Err(StoreError::Storage(format!(
                    "column {} of table {:?} holds {} values, expected {}",
                    rank,
                    name,
                    column.len(),
                    merged
                )));
            }
            columns.push(column);
        }

        // Everything is consistent, so leftover tmp runs are garbage
        for column in &mut columns {
            column.remove_stale_files()?;
        }

        let buffer = WriteBuffer::open(
            &dir.join(Self::BUFFER_FILENAME),
            name,
            Arc::clone(&schema),
            buffered,
        )?;

        tracing::info!(
            table = name,
            rows = meta.total_row_count,
            buffered,
            columns = schema.field_count(),
            "table loaded"
        );

        Ok(Self {
            name: name.to_string(),
            dir,
            schema,
            columns,
            buffer,
            total_row_count: meta.total_row_count,
            flush_threshold: meta.flush_threshold,
            sync_metadata: config.sync_metadata,
        })
    }

    /// Insert one row
    ///
    /// Steps:
    /// 1. Append to the write buffer
    /// 2. Flush the buffer into the columns if it is full
    /// 3. Persist the new row count
    ///
    /// If the flush cannot be staged the row is taken back out of the
    /// buffer, so the call can simply be retried.
    pub fn insert(&mut self, row: &[Datum]) -> Result<()> {
        let buffered = self.buffer.insert(row)?;

        if buffered >= self.flush_threshold {
            let staged = match self.stage_flush() {
                Ok(staged) => staged,
                Err(e) => {
                    if let Err(undo) = self.buffer.truncate(buffered - 1) {
                        tracing::warn!(table = %self.name, error = %undo, "failed to take back buffered row");
                    }
                    return Err(e);
                }
            };
            self.commit_staged(staged)?;
            self.buffer.clear()?;

            tracing::debug!(table = %self.name, rows = buffered, "write buffer flushed");
        }

        self.total_row_count += 1;
        self.persist()
    }

    /// Load `total_size` rows at once
    ///
    /// If the buffer is partly full, the first rows top it up so buffered
    /// rows stay ahead of the bulk. Buffered rows, top-up rows and the
    /// largest multiple of the threshold that follows are merged straight
    /// into every column in parallel; the remainder goes through [`insert`].
    ///
    /// The whole stream is read and checked before anything is committed:
    /// a short or long stream, or a row that does not fit the schema, leaves
    /// the table untouched.
    ///
    /// [`insert`]: Table::insert
    pub fn bulk_insert<I>(&mut self, rows: I, total_size: u64) -> Result<()>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut input = BulkRows {
            rows: rows.into_iter(),
            schema: Arc::clone(&self.schema),
            total_size,
            consumed: 0,
        };

        let buffered = self.buffer.row_count();
        let threshold = self.flush_threshold;

        // Too few rows to fill the buffer
        if buffered + total_size < threshold {
            let rows = input.pull_many(total_size)?;
            input.finish()?;
            return self.insert_rows(rows);
        }

        let lead = if buffered > 0 { threshold - buffered } else { 0 };
        let tail = (total_size - lead) % threshold;
        let merged = total_size - tail;

        tracing::debug!(table = %self.name, total_size, buffered, merged, tail, "bulk insert");

        let staged = self.stage_bulk(&mut input, merged)?;

        let checked = match input.pull_many(tail) {
            Ok(rows) => input.finish().map(|()| rows),
            Err(e) => Err(e),
        };
        let tail_rows = match checked {
            Ok(rows) => rows,
            Err(e) => {
                staged.into_iter().for_each(StagedMerge::discard);
                return Err(e);
            }
        };

        self.commit_staged(staged)?;
        self.buffer.clear()?;
        self.total_row_count += merged;
        self.persist()?;

        self.insert_rows(tail_rows)
    }

    /// Stream rows projected onto `ranks`, oldest first
    pub fn scan(&self, ranks: &[usize]) -> Result<TableScan> {
        if ranks.is_empty() {
            return Err(StoreError::SchemaMismatch(
                "scan needs at least one column".to_string(),
            ));
        }
        if let Some(&rank) = ranks.iter().find(|&&r| r >= self.schema.field_count()) {
            return Err(StoreError::SchemaMismatch(format!(
                "no column with rank {} in table {:?}",
                rank, self.name
            )));
        }

        let columns = ranks
            .iter()
            .map(|&rank| self.columns[rank].scan())
            .collect::<Result<Vec<_>>>()?;
        let buffered = self.buffer.read_all()?;

        Ok(TableScan::new(columns, buffered, ranks.to_vec()))
    }

    /// Stream every column, oldest row first
    pub fn scan_all(&self) -> Result<TableScan> {
        let ranks: Vec<usize> = (0..self.schema.field_count()).collect();
        self.scan(&ranks)
    }

    /// Read the full row at index `i`
    pub fn get_row(&self, i: u64) -> Result<Row> {
        if i >= self.total_row_count {
            return Err(StoreError::OutOfBounds {
                index: i,
                len: self.total_row_count,
            });
        }

        let merged = self.total_row_count - self.buffer.row_count();
        if i < merged {
            return self.columns.iter().map(|column| column.get(i)).collect();
        }

        let offset = i - merged;
        match self.buffer.read_range(offset, offset + 1)?.next() {
            Some(row) => row,
            None => Err(StoreError::Storage(format!(
                "write buffer of table {:?} ended before row {}",
                self.name, offset
            ))),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Rows inserted so far, buffered or merged
    pub fn row_count(&self) -> u64 {
        self.total_row_count
    }

    pub fn buffered_row_count(&self) -> u64 {
        self.buffer.row_count()
    }

    pub fn flush_threshold(&self) -> u64 {
        self.flush_threshold
    }

    /// Panics if `rank` is not a column of this table
    pub fn column(&self, rank: usize) -> &Column {
        &self.columns[rank]
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn column_dir(dir: &Path, rank: usize) -> PathBuf {
        dir.join(format!("c{}", rank))
    }

    /// Table names become directory names: `[a-z0-9_]+`
    fn validate_name(name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(StoreError::InvalidName(format!(
                "table name {:?} must be non-empty and use only [a-z0-9_]",
                name
            )));
        }
        Ok(())
    }

    /// Store the descriptor; with `sync_metadata`, buffered rows reach disk first
    fn persist(&self) -> Result<()> {
        if self.sync_metadata {
            self.buffer.sync()?;
        }
        self.store_metadata()
    }

    fn store_metadata(&self) -> Result<()> {
        TableMetadata {
            name: self.name.clone(),
            schema: (*self.schema).clone(),
            total_row_count: self.total_row_count,
            flush_threshold: self.flush_threshold,
        }
        .store(&self.dir.join(Self::METADATA_FILENAME), self.sync_metadata)
    }

    /// Transpose the full buffer and stage it into every column.
    ///
    /// Nothing becomes visible until [`commit_staged`](Table::commit_staged).
    fn stage_flush(&self) -> Result<Vec<StagedMerge>> {
        let count = self.buffer.row_count();
        if count != self.flush_threshold {
            return Err(StoreError::Storage(format!(
                "write buffer of table {:?} holds {} rows, a flush takes exactly {}",
                self.name, count, self.flush_threshold
            )));
        }

        let mut values: Vec<Vec<Datum>> = (0..self.schema.field_count())
            .map(|_| Vec::with_capacity(count as usize))
            .collect();
        for row in self.buffer.read_all()? {
            for (column, datum) in values.iter_mut().zip(row?) {
                column.push(datum);
            }
        }

        let mut staged = Vec::with_capacity(self.columns.len());
        for (column, column_values) in self.columns.iter().zip(values) {
            match column.stage(column_values, count) {
                Ok(merge) => staged.push(merge),
                Err(e) => {
                    staged.into_iter().for_each(StagedMerge::discard);
                    return Err(e);
                }
            }
        }
        Ok(staged)
    }

    /// Swap staged merges into their columns, in rank order
    fn commit_staged(&mut self, staged: Vec<StagedMerge>) -> Result<()> {
        let mut pending = staged.into_iter();
        for column in self.columns.iter_mut() {
            let merge = match pending.next() {
                Some(merge) => merge,
                None => break,
            };
            if let Err(e) = column.commit(merge) {
                pending.for_each(StagedMerge::discard);
                return Err(e);
            }
        }
        Ok(())
    }

    fn insert_rows(&mut self, rows: Vec<Row>) -> Result<()> {
        for row in rows {
            self.insert(&row)?;
        }
        Ok(())
    }

    /// Stage the buffered rows plus the next `from_input` input rows into
    /// every column, one thread per column
    fn stage_bulk<I>(&self, input: &mut BulkRows<I>, from_input: u64) -> Result<Vec<StagedMerge>>
    where
        I: Iterator<Item = Row>,
    {
        let buffered = self.buffer.read_all()?;
        let count = self.buffer.row_count() + from_input;
        let columns = &self.columns;

        let outcome = crossbeam::thread::scope(|s| {
            let mut senders = Vec::with_capacity(columns.len());
            let mut workers = Vec::with_capacity(columns.len());

            for column in columns {
                let (tx, rx) = channel::bounded::<Datum>(BULK_CHANNEL_CAPACITY);
                senders.push(tx);
                workers.push(s.spawn(move |_| column.stage(rx, count)));
            }

            let source = buffered.chain((0..from_input).map(|_| input.pull()));
            let fed = Self::distribute(source, &senders);
            drop(senders);

            let mut staged = Vec::with_capacity(workers.len());
            let mut failure = None;
            for worker in workers {
                let result = worker.join().unwrap_or_else(|_| {
                    Err(StoreError::Storage("column merge thread panicked".to_string()))
                });
                match result {
                    Ok(merge) => staged.push(merge),
                    Err(e) => {
                        failure.get_or_insert(e);
                    }
                }
            }

            let failure = match fed {
                // Bad input: the columns only saw a short stream
                Err(e) => Some(e),
                Ok(true) => failure,
                Ok(false) => failure.or_else(|| {
                    Some(StoreError::Storage(
                        "column merge stopped before the bulk was delivered".to_string(),
                    ))
                }),
            };

            match failure {
                Some(e) => {
                    staged.into_iter().for_each(StagedMerge::discard);
                    Err(e)
                }
                None => Ok(staged),
            }
        });

        outcome.unwrap_or_else(|_| Err(StoreError::Storage("bulk insert worker panicked".to_string())))
    }

    /// Fan rows out to the per-column channels.
    ///
    /// Returns `Ok(false)` if a column hung up early (it failed and will
    /// report why).
    fn distribute<S>(source: S, senders: &[Sender<Datum>]) -> Result<bool>
    where
        S: Iterator<Item = Result<Row>>,
    {
        for row in source {
            for (tx, datum) in senders.iter().zip(row?) {
                if tx.send(datum).is_err() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// The caller's bulk row stream, checked against the schema and the
/// declared size
struct BulkRows<I> {
    rows: I,
    schema: Arc<Schema>,
    total_size: u64,
    consumed: u64,
}

impl<I> BulkRows<I>
where
    I: Iterator<Item = Row>,
{
    /// Next row; `SizeMismatch` if the stream ended early
    fn pull(&mut self) -> Result<Row> {
        let row = self.rows.next().ok_or(StoreError::SizeMismatch {
            expected: self.total_size,
            actual: self.consumed,
        })?;
        self.consumed += 1;
        self.schema.check_row(&row)?;
        Ok(row)
    }

    fn pull_many(&mut self, count: u64) -> Result<Vec<Row>> {
        (0..count).map(|_| self.pull()).collect()
    }

    /// `SizeMismatch` if rows remain past the declared size
    fn finish(mut self) -> Result<()> {
        if self.rows.next().is_some() {
            return Err(StoreError::SizeMismatch {
                expected: self.total_size,
                actual: self.consumed + 1 + self.rows.count() as u64,
            });
        }
        Ok(())
    }
}
