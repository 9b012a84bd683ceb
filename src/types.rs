//! Datum types
//!
//! The closed set of scalar kinds a column can hold, and their fixed-width
//! little-endian encoding.

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// A row as produced by scans and consumed by the query operators
pub type Row = Vec<Datum>;

/// Type tag of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatumType {
    Int64,
    Float64,
}

impl DatumType {
    /// Encoded size of one value in bytes
    pub const fn width(self) -> usize {
        match self {
            DatumType::Int64 => 8,
            DatumType::Float64 => 8,
        }
    }
}

impl fmt::Display for DatumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatumType::Int64 => f.write_str("int64"),
            DatumType::Float64 => f.write_str("float64"),
        }
    }
}

/// A single value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Datum {
    Int64(i64),
    Float64(f64),
}

impl Datum {
    pub fn datum_type(&self) -> DatumType {
        match self {
            Datum::Int64(_) => DatumType::Int64,
            Datum::Float64(_) => DatumType::Float64,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Datum::Int64(v) => Some(v),
            Datum::Float64(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Datum::Float64(v) => Some(v),
            Datum::Int64(_) => None,
        }
    }

    /// Append the little-endian encoding of this value
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        match *self {
            Datum::Int64(v) => buf.put_i64_le(v),
            Datum::Float64(v) => buf.put_f64_le(v),
        }
    }

    /// Decode one value of type `ty` from the front of `buf`
    ///
    /// Panics if `buf` holds fewer than `ty.width()` bytes.
    pub fn decode<B: Buf>(ty: DatumType, buf: &mut B) -> Datum {
        match ty {
            DatumType::Int64 => Datum::Int64(buf.get_i64_le()),
            DatumType::Float64 => Datum::Float64(buf.get_f64_le()),
        }
    }

    /// Hashable identity used for equality joins.
    ///
    /// Floats compare by bit pattern with `-0.0` folded onto `0.0`.
    pub fn join_key(&self) -> DatumKey {
        match *self {
            Datum::Int64(v) => DatumKey::Int64(v),
            Datum::Float64(v) if v == 0.0 => DatumKey::Float64(0.0f64.to_bits()),
            Datum::Float64(v) => DatumKey::Float64(v.to_bits()),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int64(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Float64(v)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::Float64(v) => write!(f, "{}", v),
        }
    }
}

/// See [`Datum::join_key`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatumKey {
    Int64(i64),
    Float64(u64),
}
