//! Column
//!
//! Manages the runs of one table column and the size-doubling merge.
//!
//! ## Responsibilities
//! - Rediscover runs on startup, ordered oldest → newest
//! - Rewrite runs on every insert so their sizes are the set bits of the
//!   column's length
//! - Point lookups and pipelined full scans in insertion order
//! - Stage merges under temporary names so a table can make every
//!   column's merge visible together
//!
//! ## Run Layout Invariant
//! ```text
//! len = 3072 = 0b1100_0000_0000
//!
//!   runs:  [ 2048 ][ 1024 ]
//!           oldest   newest
//! ```
//! Run sizes are distinct powers of two in strictly descending order, and
//! reading them front to back replays insertion order. Because a larger run
//! always holds older rows, reload sorts files by descending size.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{IoContext, Result, StoreError};
use crate::schema::Schema;
use crate::types::{Datum, DatumType};

use super::run::{Run, RunReader};

/// Values shipped per message from a scan producer
const SCAN_BATCH_VALUES: usize = 1024;

/// Suffix of runs written by an insert that have not been committed yet
const TMP_SUFFIX: &str = "_tmp";

/// Split `total` into the powers of two of its set bits, largest first.
///
/// `3072` → `[2048, 1024]`, `0` → `[]`.
pub fn binary_decomposition(total: u64) -> Vec<u64> {
    (0..u64::BITS)
        .rev()
        .map(|bit| 1u64 << bit)
        .filter(|size| total & size != 0)
        .collect()
}

/// One column of a table, stored as a list of runs
pub struct Column {
    /// Owning table (for diagnostics)
    table_name: String,

    /// Position of this column in the schema
    rank: usize,

    schema: Arc<Schema>,

    /// Directory holding this column's run files
    base_dir: PathBuf,

    /// Runs ordered oldest → newest (largest → smallest)
    runs: Vec<Run>,

    /// Uncommitted run files found on open
    stale: Vec<PathBuf>,

    /// Bound of the scan pipeline queue, in batches
    channel_capacity: usize,
}

impl Column {
    /// Create an empty column in `base_dir`
    pub fn create(
        base_dir: &Path,
        table_name: &str,
        schema: Arc<Schema>,
        rank: usize,
        channel_capacity: usize,
    ) -> Result<Self> {
        Self::check_rank(&schema, rank)?;
        fs::create_dir_all(base_dir).with_file("create directory", base_dir)?;

        Ok(Self {
            table_name: table_name.to_string(),
            rank,
            schema,
            base_dir: base_dir.to_path_buf(),
            runs: Vec::new(),
            stale: Vec::new(),
            channel_capacity,
        })
    }

    /// Reopen a column from its run files
    ///
    /// On startup:
    /// 1. List the directory
    /// 2. Parse run sizes from file names, set aside `*_tmp` leftovers
    /// 3. Open a handle per run (checks file length)
    /// 4. Order by size descending (oldest first)
    pub fn open(
        base_dir: &Path,
        table_name: &str,
        schema: Arc<Schema>,
        rank: usize,
        channel_capacity: usize,
    ) -> Result<Self> {
        Self::check_rank(&schema, rank)?;
        let datum_type = schema.type_of(rank);

        let mut sizes: Vec<u64> = Vec::new();
        let mut stale = Vec::new();

        for entry in fs::read_dir(base_dir).with_file("list", base_dir)? {
            let entry = entry.with_file("list", base_dir)?;
            let file_path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name.ends_with(TMP_SUFFIX) {
                tracing::warn!(
                    table = table_name,
                    rank,
                    path = %file_path.display(),
                    "ignoring uncommitted run file"
                );
                stale.push(file_path);
                continue;
            }

            let size = Self::parse_run_size(&name).ok_or_else(|| {
                StoreError::Storage(format!(
                    "unexpected file {} in column directory",
                    file_path.display()
                ))
            })?;
            sizes.push(size);
        }

        // Largest run holds the oldest rows
        sizes.sort_unstable_by(|a, b| b.cmp(a));

        let runs = sizes
            .into_iter()
            .map(|size| Run::open(&Self::run_path_with_dir(base_dir, size), datum_type, size))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            table_name: table_name.to_string(),
            rank,
            schema,
            base_dir: base_dir.to_path_buf(),
            runs,
            stale,
            channel_capacity,
        })
    }

    /// Merge `new_count` incoming values into the column.
    ///
    /// Shorthand for [`stage`](Column::stage) followed by
    /// [`commit`](Column::commit).
    pub fn insert<I>(&mut self, values: I, new_count: u64) -> Result<()>
    where
        I: IntoIterator<Item = Datum>,
    {
        let staged = self.stage(values, new_count)?;
        self.commit(staged)
    }

    /// Write the runs that will replace the current ones, without touching
    /// the current ones.
    ///
    /// Steps:
    /// 1. Decompose `len() + new_count` into descending powers of two
    /// 2. Stream old runs (oldest first) followed by the new values
    /// 3. Cut that stream into one temporary run per block size
    ///
    /// On error every temporary run is removed and the column is unchanged.
    pub fn stage<I>(&self, values: I, new_count: u64) -> Result<StagedMerge>
    where
        I: IntoIterator<Item = Datum>,
    {
        let old_count = self.len();
        if new_count == 0 {
            return Ok(StagedMerge {
                runs: Vec::new(),
                old_count,
                new_count,
            });
        }

        let blocks = binary_decomposition(old_count + new_count);
        let mut source = self.scan()?.chain(values.into_iter().map(Ok));

        let mut runs: Vec<Run> = Vec::with_capacity(blocks.len());
        for &size in &blocks {
            let tmp_path = self.tmp_path(size);
            match Run::create(&tmp_path, self.datum_type(), source.by_ref().take(size as usize), size) {
                Ok(run) => runs.push(run),
                Err(e) => {
                    discard_runs(runs);
                    return Err(e);
                }
            }
        }

        // Anything left over means the caller under-declared the batch
        if let Some(extra) = source.next() {
            discard_runs(runs);
            extra?;
            return Err(StoreError::SizeMismatch {
                expected: new_count,
                actual: new_count + 1 + source.count() as u64,
            });
        }

        Ok(StagedMerge {
            runs,
            old_count,
            new_count,
        })
    }

    /// Swap staged runs in for the current ones.
    ///
    /// Steps:
    /// 1. Delete the superseded runs (the staged ones are already synced)
    /// 2. Rename each staged run to its size
    pub fn commit(&mut self, staged: StagedMerge) -> Result<()> {
        if staged.new_count == 0 {
            return Ok(());
        }
        if staged.old_count != self.len() {
            let old_count = staged.old_count;
            staged.discard();
            return Err(StoreError::Storage(format!(
                "merge staged against {} values but column {} now holds {}",
                old_count,
                self.rank,
                self.len()
            )));
        }

        for run in self.runs.drain(..) {
            run.delete()?;
        }

        let mut new_runs = staged.runs;
        for run in &mut new_runs {
            let path = Self::run_path_with_dir(&self.base_dir, run.element_count());
            run.rename(&path)?;
        }
        self.runs = new_runs;

        tracing::debug!(
            table = %self.table_name,
            rank = self.rank,
            old_count = staged.old_count,
            new_count = staged.new_count,
            runs = ?self.run_sizes(),
            "column merged"
        );

        Ok(())
    }

    /// Stream every value of the column, oldest first.
    ///
    /// A producer thread reads the runs and ships batches over a bounded
    /// channel; each call starts a fresh scan.
    pub fn scan(&self) -> Result<ColumnScan> {
        let readers = self
            .runs
            .iter()
            .map(Run::read_all)
            .collect::<Result<Vec<_>>>()?;
        Ok(ColumnScan::spawn(readers, self.channel_capacity))
    }

    /// Point lookup by row index
    pub fn get(&self, i: u64) -> Result<Datum> {
        let mut offset = i;
        for run in &self.runs {
            if offset < run.element_count() {
                return run.read_one(offset);
            }
            offset -= run.element_count();
        }

        Err(StoreError::OutOfBounds {
            index: i,
            len: self.len(),
        })
    }

    /// Remove the uncommitted run files found on open
    pub fn remove_stale_files(&mut self) -> Result<()> {
        for path in self.stale.drain(..) {
            fs::remove_file(&path).with_file("delete", &path)?;
            tracing::debug!(path = %path.display(), "removed uncommitted run file");
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Total number of values across all runs
    pub fn len(&self) -> u64 {
        self.runs.iter().map(Run::element_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Run sizes, oldest first
    pub fn run_sizes(&self) -> Vec<u64> {
        self.runs.iter().map(Run::element_count).collect()
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn datum_type(&self) -> DatumType {
        self.schema.type_of(self.rank)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_rank(schema: &Schema, rank: usize) -> Result<()> {
        if rank >= schema.field_count() {
            return Err(StoreError::SchemaMismatch(format!(
                "column rank {} out of range for {} fields",
                rank,
                schema.field_count()
            )));
        }
        Ok(())
    }

    fn tmp_path(&self, size: u64) -> PathBuf {
        self.base_dir.join(format!("{}{}", size, TMP_SUFFIX))
    }

    /// Committed run path: the decimal element count
    fn run_path_with_dir(dir: &Path, size: u64) -> PathBuf {
        dir.join(size.to_string())
    }

    /// "2048" → Some(2048); sizes that are not powers of two are rejected
    fn parse_run_size(name: &str) -> Option<u64> {
        let size: u64 = name.parse().ok()?;
        size.is_power_of_two().then_some(size)
    }
}

// =============================================================================
// Staged Merge
// =============================================================================

/// Runs written by [`Column::stage`] under temporary names, not yet visible.
///
/// Pass it to [`Column::commit`] or drop it with [`StagedMerge::discard`].
#[derive(Debug)]
pub struct StagedMerge {
    runs: Vec<Run>,
    /// Column length the runs were built from
    old_count: u64,
    new_count: u64,
}

impl StagedMerge {
    /// Values this merge adds
    pub fn new_count(&self) -> u64 {
        self.new_count
    }

    /// Remove the temporary runs
    pub fn discard(self) {
        discard_runs(self.runs);
    }
}

/// Best-effort removal of runs from a failed merge
fn discard_runs(runs: Vec<Run>) {
    for run in runs {
        let path = run.path().to_path_buf();
        if let Err(e) = run.delete() {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove temporary run");
        }
    }
}

// =============================================================================
// Column Scan Pipeline
// =============================================================================

/// Consumer end of a column scan; yields values in insertion order.
///
/// Dropping it disconnects the channel, which stops the producer and
/// closes its files.
pub struct ColumnScan {
    rx: Receiver<Result<Vec<Datum>>>,
    batch: std::vec::IntoIter<Datum>,
}

impl ColumnScan {
    fn spawn(readers: Vec<RunReader>, capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        if !readers.is_empty() {
            thread::spawn(move || Self::produce(readers, tx));
        }
        Self {
            rx,
            batch: Vec::new().into_iter(),
        }
    }

    fn produce(readers: Vec<RunReader>, tx: Sender<Result<Vec<Datum>>>) {
        for mut reader in readers {
            loop {
                let mut batch = Vec::with_capacity(SCAN_BATCH_VALUES);
                for datum in reader.by_ref().take(SCAN_BATCH_VALUES) {
                    match datum {
                        Ok(d) => batch.push(d),
                        Err(e) => {
                            let _ = tx.send(Err(e));
                            return;
                        }
                    }
                }
                if batch.is_empty() {
                    break;
                }
                if tx.send(Ok(batch)).is_err() {
                    // Consumer went away
                    return;
                }
            }
        }
    }
}

impl Iterator for ColumnScan {
    type Item = Result<Datum>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(datum) = self.batch.next() {
                return Some(Ok(datum));
            }
            match self.rx.recv() {
                Ok(Ok(batch)) => self.batch = batch.into_iter(),
                Ok(Err(e)) => return Some(Err(e)),
                Err(_) => return None,
            }
        }
    }
}
