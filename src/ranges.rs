//! Flattening of V8's nested per-function ranges into one disjoint,
//! ascending range list per script.
//!
//! V8 reports `ranges[0]` of each function as its whole span and every later
//! range nested inside an earlier one, overriding its count. Merging keeps
//! the innermost count for every offset: a new range is spliced into the
//! merged range that contains it, leaving the container's count on the
//! remainders to either side.

use crate::model::{V8CoverageRange, V8FunctionCoverage};

/// Merge `new` into an already disjoint, ascending list, returning the new list.
pub fn merge_range(existing: &[V8CoverageRange], new: V8CoverageRange) -> Vec<V8CoverageRange> {
    let mut merged = existing.to_vec();
    merge_into(&mut merged, new);
    merged
}

/// In-place form of [`merge_range`].
pub fn merge_into(merged: &mut Vec<V8CoverageRange>, new: V8CoverageRange) {
    if new.is_empty() {
        return;
    }
    if merged.is_empty() {
        merged.push(new);
        return;
    }

    // Ranges are disjoint, so the only candidate container is the last one
    // starting at or before `new`.
    let after = merged.partition_point(|r| r.start_offset <= new.start_offset);
    if after > 0 && merged[after - 1].contains(&new) {
        let idx = after - 1;
        let existing = merged[idx];
        let mut pieces = Vec::with_capacity(3);
        if new.start_offset > existing.start_offset {
            pieces.push(V8CoverageRange::new(
                existing.start_offset,
                new.start_offset,
                existing.count,
            ));
        }
        pieces.push(new);
        if new.end_offset < existing.end_offset {
            pieces.push(V8CoverageRange::new(
                new.end_offset,
                existing.end_offset,
                existing.count,
            ));
        }
        merged.splice(idx..=idx, pieces);
        return;
    }

    if let Some(overlap) = merged.iter().find(|r| overlaps(r, &new)) {
        log::warn!(
            "dropping range {}..{} that partially overlaps merged range {}..{}",
            new.start_offset,
            new.end_offset,
            overlap.start_offset,
            overlap.end_offset
        );
        return;
    }

    let at = merged
        .iter()
        .position(|r| r.start_offset >= new.end_offset)
        .unwrap_or(merged.len());
    merged.insert(at, new);
}

/// Merge every range of every function of a script.
///
/// Ranges are folded outermost-first (ascending start, then descending end),
/// so each insertion either nests inside a merged range or sits outside all
/// of them, whatever order V8 reported them in. Ranges with identical spans
/// keep their reported order, so the later one wins.
pub fn merge_script(functions: &[V8FunctionCoverage]) -> Vec<V8CoverageRange> {
    let mut all: Vec<V8CoverageRange> = functions
        .iter()
        .flat_map(|f| f.ranges.iter().copied())
        .collect();
    all.sort_by(|a, b| {
        a.start_offset
            .cmp(&b.start_offset)
            .then(b.end_offset.cmp(&a.end_offset))
    });

    let mut merged = Vec::with_capacity(all.len() * 2);
    for range in all {
        merge_into(&mut merged, range);
    }
    merged
}

/// True when `ranges` is sorted, non-empty element-wise and non-overlapping.
#[must_use]
pub fn is_disjoint_ascending(ranges: &[V8CoverageRange]) -> bool {
    ranges.iter().all(|r| !r.is_empty())
        && ranges.windows(2).all(|w| w[0].end_offset <= w[1].start_offset)
}

fn overlaps(a: &V8CoverageRange, b: &V8CoverageRange) -> bool {
    a.start_offset < b.end_offset && b.start_offset < a.end_offset
}
