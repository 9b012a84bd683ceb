//! Equi-Join
//!
//! In-memory hash join: index the left input by its join column, then
//! stream the right input against the index. The left input must fit in
//! memory.

use std::collections::HashMap;

use crate::error::Result;
use crate::types::{DatumKey, Row};

use super::field;

/// Join `left` and `right` on `left[left_rank] == right[right_rank]`.
///
/// The left input is consumed eagerly to build the index; the first error
/// it yields is returned. Output rows are `left_row ++ right_row`, ordered by
/// right row, then by left row in left input order.
pub fn equi_join<L, R>(left: L, right: R, left_rank: usize, right_rank: usize) -> Result<EquiJoin<R::IntoIter>>
where
    L: IntoIterator<Item = Result<Row>>,
    R: IntoIterator<Item = Result<Row>>,
{
    let mut index: HashMap<DatumKey, Vec<Row>> = HashMap::new();
    for row in left {
        let row = row?;
        let key = field(&row, left_rank)?.join_key();
        index.entry(key).or_default().push(row);
    }

    Ok(EquiJoin {
        index,
        right: right.into_iter(),
        right_rank,
        pending: Vec::new().into_iter(),
    })
}

/// Iterator returned by [`equi_join`]
pub struct EquiJoin<R> {
    index: HashMap<DatumKey, Vec<Row>>,
    right: R,
    right_rank: usize,
    /// Joined rows for the current right row, not yet yielded
    pending: std::vec::IntoIter<Row>,
}

impl<R> EquiJoin<R> {
    /// Distinct join keys seen on the left
    pub fn key_count(&self) -> usize {
        self.index.len()
    }
}

impl<R> Iterator for EquiJoin<R>
where
    R: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.next() {
                return Some(Ok(row));
            }

            let right_row = match self.right.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            let key = match field(&right_row, self.right_rank) {
                Ok(datum) => datum.join_key(),
                Err(e) => return Some(Err(e)),
            };

            if let Some(matches) = self.index.get(&key) {
                let joined: Vec<Row> = matches
                    .iter()
                    .map(|left_row| {
                        let mut row = Row::with_capacity(left_row.len() + right_row.len());
                        row.extend_from_slice(left_row);
                        row.extend_from_slice(&right_row);
                        row
                    })
                    .collect();
                self.pending = joined.into_iter();
            }
        }
    }
}
