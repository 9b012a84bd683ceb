//! # runstore
//!
//! A column-oriented storage engine with:
//! - Immutable fixed-width runs per column
//! - Size-doubling merges: run sizes always equal the set bits of the
//!   column length, so each value is rewritten O(log n) times
//! - A row-major write buffer that absorbs small inserts
//! - Streaming scans in insertion order across merged and buffered rows
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Query Operators                             │
//! │               (filter, equi_join)                            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ rows
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Table                                  │
//! │        (insert / bulk_insert / scan, metadata)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐  flush   ┌─────────────┐
//!   │Write Buffer │ ───────▶ │   Column    │  × field count
//!   │ (row-major) │          │ (run merge) │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │    Runs     │
//!                           │ (immutable) │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod types;
pub mod schema;

pub mod storage;
pub mod buffer;
pub mod table;
pub mod query;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::Config;
pub use schema::Schema;
pub use table::Table;
pub use types::{Datum, DatumType, Row};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of runstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
