//! Correction normalization applied before a title's work list is fetched.

use crate::source::Correction;
use std::collections::HashSet;

/// Drops duplicate corrections, keeping the first occurrence of each
/// `(date, location)` pair and otherwise preserving the incoming order.
///
/// The upstream feed routinely repeats an amendment when it is filed under
/// several parts of the same title; only one word-count fetch per revision
/// is worth issuing.
pub fn dedup_corrections(corrections: Vec<Correction>) -> Vec<Correction> {
    let mut seen = HashSet::with_capacity(corrections.len());
    corrections
        .into_iter()
        .filter(|correction| seen.insert((correction.date, correction.location.clone())))
        .collect()
}
