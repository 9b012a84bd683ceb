//! Query Module
//!
//! Streaming operators over the row stream a [`Table`](crate::Table) scan
//! produces. Both take any iterator of `Result<Row>` and are themselves
//! iterators of `Result<Row>`, so they compose:
//!
//! ```text
//! equi_join(table_a.scan(..)?, filter(table_b.scan(..)?, 0, pred), 0, 1)
//! ```
//!
//! Errors from upstream pass through unchanged.

mod filter;
mod join;

pub use filter::{filter, Filter};
pub use join::{equi_join, EquiJoin};

use crate::error::{Result, StoreError};
use crate::types::{Datum, Row};

/// Field `rank` of `row`, or `SchemaMismatch` if the row is too short
fn field(row: &Row, rank: usize) -> Result<&Datum> {
    row.get(rank).ok_or_else(|| {
        StoreError::SchemaMismatch(format!(
            "rank {} out of range for row of {} fields",
            rank,
            row.len()
        ))
    })
}
