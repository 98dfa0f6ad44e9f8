// src/bisect/exploration.rs

//! Choosing which changes to explore next inside a commit range.
//!
//! Changes are addressed by their index in the expanded range.

use std::collections::BTreeSet;

/// Middle change strictly between `lo` and `hi` that is not yet explored.
pub fn midpoint(lo: usize, hi: usize, explored: &BTreeSet<usize>) -> Option<usize> {
    let candidates: Vec<usize> = (lo + 1..hi).filter(|i| !explored.contains(i)).collect();
    candidates.get(candidates.len() / 2).copied()
}

/// Explore the midpoint of `(lo, hi)` and, recursively, the midpoints of
/// both halves down to `levels` deep.
///
/// Every returned index is also inserted into `explored`. Returns nothing
/// when no unexplored change lies between `lo` and `hi`.
pub fn speculate(lo: usize, hi: usize, explored: &mut BTreeSet<usize>, levels: usize) -> Vec<usize> {
    if levels == 0 {
        return Vec::new();
    }
    let Some(mid) = midpoint(lo, hi, explored) else {
        return Vec::new();
    };
    explored.insert(mid);

    let mut added = vec![mid];
    added.extend(speculate(lo, mid, explored, levels - 1));
    added.extend(speculate(mid, hi, explored, levels - 1));
    added
}
