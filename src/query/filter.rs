//! Filter
//!
//! Passes through the rows whose field at a given rank satisfies a predicate.

use crate::error::Result;
use crate::types::{Datum, Row};

use super::field;

/// Lazily keep the rows of `rows` where `predicate(row[rank])` holds
pub fn filter<I, P>(rows: I, rank: usize, predicate: P) -> Filter<I::IntoIter, P>
where
    I: IntoIterator<Item = Result<Row>>,
    P: FnMut(&Datum) -> bool,
{
    Filter {
        rows: rows.into_iter(),
        rank,
        predicate,
    }
}

/// Iterator returned by [`filter`]
pub struct Filter<I, P> {
    rows: I,
    rank: usize,
    predicate: P,
}

impl<I, P> Iterator for Filter<I, P>
where
    I: Iterator<Item = Result<Row>>,
    P: FnMut(&Datum) -> bool,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };

            let keep = match field(&row, self.rank) {
                Ok(datum) => (self.predicate)(datum),
                Err(e) => return Some(Err(e)),
            };
            if keep {
                return Some(Ok(row));
            }
        }
    }
}
