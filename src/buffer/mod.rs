//! Write Buffer Module
//!
//! Row-major staging area for inserts that are too small to amortize a
//! columnar merge.
//!
//! ## Responsibilities
//! - Append whole rows, one fixed-width record each
//! - Random-access reads by offset arithmetic
//! - Truncate to empty after the rows are flushed into the columns
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Row 0                                   │
//! │ ┌─────────┬─────────┬─────┬───────────┐ │
//! │ │Field 0  │Field 1  │ ... │ Field N-1 │ │
//! │ │ (8, LE) │ (8, LE) │     │  (8, LE)  │ │
//! │ └─────────┴─────────┴─────┴───────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Row 1 at offset 1 * row_width           │
//! │ ...                                     │
//! └─────────────────────────────────────────┘
//! ```
//! There is no header: the row count is owned by the table metadata and
//! handed to [`WriteBuffer::open`] on reload.

mod reader;
mod store;

pub use reader::RowReader;
pub use store::WriteBuffer;
