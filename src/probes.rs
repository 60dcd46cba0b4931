//! Attribution of original-source ranges to AST method probes.
//!
//! A probe is covered unless its position falls inside a range with a zero
//! count. Probes are whole lines; a probe sits at the first column any range
//! reaches on its line, so an indented statement is judged by the range its
//! code starts in rather than by the indentation before it.

use crate::error::{ProbecovError, Result};
use crate::model::{AstEntity, AstMethod, OriginalPosition};
use crate::paths::normalize_path;

/// Whether `(line, column)` lies inside `range`, bounds inclusive.
#[must_use]
pub fn position_inside(line: u32, column: u32, range: &OriginalPosition) -> bool {
    if line < range.start_line || line > range.end_line {
        return false;
    }
    if range.start_line == range.end_line {
        return column >= range.rel_start_col && column <= range.rel_end_col;
    }
    if line == range.start_line {
        return column >= range.rel_start_col;
    }
    if line == range.end_line {
        return column <= range.rel_end_col;
    }
    true
}

/// Coverage of one method's probes, in probe order.
///
/// When no range touches the method's line span at all, every probe is
/// reported as not covered.
#[must_use]
pub fn map_method(method: &AstMethod, ranges: &[OriginalPosition]) -> Vec<bool> {
    let Some((first, last)) = method.line_span() else {
        return Vec::new();
    };
    let touching: Vec<&OriginalPosition> = ranges
        .iter()
        .filter(|r| r.start_line <= last && r.end_line >= first)
        .collect();
    if touching.is_empty() {
        return vec![false; method.probes.len()];
    }

    method
        .probes
        .iter()
        .map(|&line| {
            let column = probe_column(line, &touching);
            !touching
                .iter()
                .any(|r| !r.is_covered() && position_inside(line, column, r))
        })
        .collect()
}

/// First column on `line` reached by any of `ranges`, or 0 when none is.
/// A range that continues from an earlier line reaches column 0.
#[must_use]
pub fn probe_column(line: u32, ranges: &[&OriginalPosition]) -> u32 {
    ranges
        .iter()
        .filter(|r| r.start_line <= line && line <= r.end_line)
        .map(|r| {
            if r.start_line == line {
                r.rel_start_col
            } else {
                0
            }
        })
        .min()
        .unwrap_or(0)
}

/// Probe vector of an entity: its methods' vectors concatenated in order.
/// `ranges` must already be restricted to the entity's source file.
#[must_use]
pub fn map_entity(entity: &AstEntity, ranges: &[OriginalPosition]) -> Vec<bool> {
    let mut probes = Vec::with_capacity(entity.probe_count());
    for method in &entity.methods {
        probes.extend(map_method(method, ranges));
    }
    probes
}

/// Output class name: normalized file path plus `.suffix` when present.
#[must_use]
pub fn class_name(entity: &AstEntity, strip_prefixes: &[String]) -> String {
    let path = normalize_path(&entity.file_path, strip_prefixes);
    match entity.suffix.as_deref().filter(|s| !s.is_empty()) {
        Some(suffix) => format!("{path}.{suffix}"),
        None => path,
    }
}

/// OR `other` into `acc` position by position. Vectors of different length
/// describe different builds and are never aligned by guessing.
pub fn combine(class_name: &str, acc: &mut [bool], other: &[bool]) -> Result<()> {
    if acc.len() != other.len() {
        return Err(ProbecovError::ProbeVectorLengthMismatch {
            class_name: class_name.to_string(),
            expected: acc.len(),
            actual: other.len(),
        });
    }
    for (a, &b) in acc.iter_mut().zip(other) {
        *a |= b;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: (u32, u32), end: (u32, u32), count: u64) -> OriginalPosition {
        OriginalPosition {
            start_line: start.0,
            rel_start_col: start.1,
            end_line: end.0,
            rel_end_col: end.1,
            source: "src/a.js".to_string(),
            count,
        }
    }

    fn method(probes: &[u32]) -> AstMethod {
        AstMethod {
            name: "fn".to_string(),
            params: vec![],
            probes: probes.to_vec(),
        }
    }

    #[test]
    fn test_single_line_column_bounds_inclusive() {
        let r = range((5, 4), (5, 9), 0);
        assert!(position_inside(5, 4, &r));
        assert!(position_inside(5, 9, &r));
        assert!(position_inside(5, 6, &r));
        assert!(!position_inside(5, 3, &r));
        assert!(!position_inside(5, 10, &r));
        assert!(!position_inside(4, 6, &r));
    }

    #[test]
    fn test_multi_line_bounds() {
        let r = range((3, 8), (6, 2), 0);
        // Start line: only columns at or after the start column.
        assert!(!position_inside(3, 7, &r));
        assert!(position_inside(3, 8, &r));
        // Lines strictly between are always inside.
        assert!(position_inside(4, 0, &r));
        assert!(position_inside(5, 1000, &r));
        // End line: only columns up to the end column.
        assert!(position_inside(6, 2, &r));
        assert!(!position_inside(6, 3, &r));
        assert!(!position_inside(7, 0, &r));
    }

    #[test]
    fn test_uncovered_line_in_covered_method() {
        let ranges = vec![
            range((1, 0), (2, OriginalPosition::UNBOUNDED), 1),
            range((3, 0), (3, OriginalPosition::UNBOUNDED), 0),
            range((4, 0), (5, OriginalPosition::UNBOUNDED), 1),
        ];
        assert_eq!(map_method(&method(&[2, 3, 4]), &ranges), vec![true, false, true]);
    }

    #[test]
    fn test_range_starting_mid_line_leaves_line_covered() {
        // `if (a) {` on line 3, the untaken block starts at its brace.
        let ranges = vec![
            range((1, 0), (9, OriginalPosition::UNBOUNDED), 1),
            range((3, 9), (5, 0), 0),
        ];
        assert_eq!(
            map_method(&method(&[2, 3, 4, 5, 6]), &ranges),
            vec![true, true, false, false, true]
        );
    }

    #[test]
    fn test_never_run_indented_line_is_not_covered() {
        // `  bbbbbbb` on line 2 never ran; the covered piece that follows it
        // is the trailing newline and maps onto the same column.
        let ranges = vec![
            range((1, 0), (1, OriginalPosition::UNBOUNDED), 1),
            range((2, 2), (2, OriginalPosition::UNBOUNDED), 0),
            range((2, 2), (2, OriginalPosition::UNBOUNDED), 1),
        ];
        assert_eq!(map_method(&method(&[1, 2]), &ranges), vec![true, false]);
    }

    #[test]
    fn test_single_line_not_covered_range_after_column_zero() {
        let ranges = vec![
            range((1, 0), (3, OriginalPosition::UNBOUNDED), 1),
            range((4, 4), (4, 20), 0),
            range((4, 21), (6, OriginalPosition::UNBOUNDED), 1),
        ];
        assert_eq!(map_method(&method(&[3, 4, 5]), &ranges), vec![true, false, true]);

        // Covered code earlier on the same line keeps it covered.
        let ranges = vec![
            range((1, 0), (4, 3), 1),
            range((4, 4), (4, 20), 0),
        ];
        assert_eq!(map_method(&method(&[4]), &ranges), vec![true]);
    }

    #[test]
    fn test_probe_column() {
        let a = range((2, 6), (4, 1), 1);
        let b = range((4, 3), (4, 9), 0);
        let ranges = [&a, &b];
        assert_eq!(probe_column(2, &ranges), 6);
        assert_eq!(probe_column(3, &ranges), 0);
        assert_eq!(probe_column(4, &ranges), 0);
        assert_eq!(probe_column(9, &ranges), 0);
        assert_eq!(probe_column(4, &[&b]), 3);
    }

    #[test]
    fn test_method_without_ranges_defaults_to_not_covered() {
        let ranges = vec![range((40, 0), (50, 0), 1)];
        assert_eq!(map_method(&method(&[2, 3]), &ranges), vec![false, false]);
        assert_eq!(map_method(&method(&[2, 3]), &[]), vec![false, false]);
    }

    #[test]
    fn test_probe_order_is_preserved() {
        let ranges = vec![
            range((1, 0), (9, OriginalPosition::UNBOUNDED), 1),
            range((7, 0), (7, OriginalPosition::UNBOUNDED), 0),
        ];
        assert_eq!(map_method(&method(&[7, 2, 8]), &ranges), vec![false, true, true]);
    }

    #[test]
    fn test_map_entity_concatenates_methods() {
        let entity = AstEntity {
            file_path: "src/a.js".to_string(),
            suffix: None,
            methods: vec![method(&[1, 2]), method(&[]), method(&[20])],
        };
        let ranges = vec![range((1, 0), (2, OriginalPosition::UNBOUNDED), 1)];
        assert_eq!(map_entity(&entity, &ranges), vec![true, true, false]);
    }

    #[test]
    fn test_class_name() {
        let mut entity = AstEntity {
            file_path: "./src/a.js".to_string(),
            suffix: None,
            methods: vec![],
        };
        assert_eq!(class_name(&entity, &[]), "src/a.js");
        entity.suffix = Some("Widget".to_string());
        assert_eq!(class_name(&entity, &[]), "src/a.js.Widget");
    }

    #[test]
    fn test_combine_ors_and_rejects_length_mismatch() {
        let mut acc = vec![false, true, false];
        combine("a", &mut acc, &[true, false, false]).unwrap();
        assert_eq!(acc, vec![true, true, false]);

        let err = combine("a", &mut acc, &[true]).unwrap_err();
        assert!(matches!(
            err,
            ProbecovError::ProbeVectorLengthMismatch {
                expected: 3,
                actual: 1,
                ..
            }
        ));
    }
}
