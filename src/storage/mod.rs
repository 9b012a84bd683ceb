//! Storage Module
//!
//! Column-major persistent storage.
//!
//! ## Responsibilities
//! - Persist each column as immutable runs of fixed-width values
//! - Keep run sizes equal to the binary decomposition of the column length
//! - Point lookups and streaming scans in insertion order
//!
//! ## Directory Layout
//! ```text
//! {table}/c{rank}/
//!   ├── 2048        (oldest rows)
//!   ├── 1024
//!   └── 8           (newest rows)
//! ```
//! Run files are named by their element count. Sizes within a column are
//! always distinct, so names never collide.

mod column;
mod run;

pub use column::{binary_decomposition, Column, ColumnScan, StagedMerge};
pub use run::{Run, RunBuilder, RunReader};
