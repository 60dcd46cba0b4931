//! Translation of merged generated-code ranges into original-source
//! positions.
//!
//! A range is `[start, end)` over generated offsets. The start resolves to
//! the mapping at or before it (falling back to the first mapping after it on
//! the same line). The end resolves from the last included offset, `end - 1`;
//! its inclusive original column is bounded by the next original mapping in
//! the same source and line, and unbounded when there is none. Without a
//! source map the end is the last non-whitespace offset of the range.

use std::collections::HashMap;

use crate::model::{OriginalPosition, V8CoverageRange};
use crate::source_index::SourceIndex;
use crate::sourcemap::{Bias, OriginalLocation, SourceMapConsumer};

/// Resolved original span of one range, independent of its count.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Span {
    source: String,
    start_line: u32,
    start_col: u32,
    end_line: u32,
    end_col: u32,
}

/// Maps the ranges of a single script. Holds a memo of already resolved
/// `(start, end)` pairs, so one mapper must not be reused across scripts.
pub struct PositionMapper<'a> {
    index: &'a SourceIndex,
    source_map: Option<&'a dyn SourceMapConsumer>,
    text: &'a str,
    identity_source: String,
    verify_exact: bool,
    cache: HashMap<(u32, u32), Option<Span>>,
    ambiguous: usize,
}

impl<'a> PositionMapper<'a> {
    pub fn new(index: &'a SourceIndex, source_map: &'a dyn SourceMapConsumer) -> Self {
        Self {
            index,
            source_map: Some(source_map),
            text: "",
            identity_source: String::new(),
            verify_exact: false,
            cache: HashMap::new(),
            ambiguous: 0,
        }
    }

    /// Mapper for unbundled scripts: generated lines are original lines and
    /// every range belongs to `source`. `text` is the script `index` was
    /// built from.
    pub fn identity(index: &'a SourceIndex, text: &'a str, source: impl Into<String>) -> Self {
        Self {
            index,
            source_map: None,
            text,
            identity_source: source.into(),
            verify_exact: false,
            cache: HashMap::new(),
            ambiguous: 0,
        }
    }

    /// Require range starts to sit exactly on a source-map mapping.
    #[must_use]
    pub fn with_verify_exact(mut self, verify_exact: bool) -> Self {
        self.verify_exact = verify_exact;
        self
    }

    /// Number of distinct ranges rejected because their mapping was ambiguous
    /// (spanning two original files, inverted, or failing exactness).
    pub fn ambiguous(&self) -> usize {
        self.ambiguous
    }

    /// Translate one range, or `None` when it cannot be attributed to a
    /// single original file.
    pub fn map_range(&mut self, range: &V8CoverageRange) -> Option<OriginalPosition> {
        if range.is_empty() {
            return None;
        }
        let key = (range.start_offset, range.end_offset);
        let span = match self.cache.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let span = self.resolve(range);
                self.cache.insert(key, span.clone());
                span
            }
        }?;
        Some(OriginalPosition {
            start_line: span.start_line,
            rel_start_col: span.start_col,
            end_line: span.end_line,
            rel_end_col: span.end_col,
            source: span.source,
            count: range.count,
        })
    }

    fn resolve(&mut self, range: &V8CoverageRange) -> Option<Span> {
        let (start_line, start_col) = self.index.locate(range.start_offset)?;
        self.index.find_line(i64::from(range.end_offset))?;

        let Some(map) = self.source_map else {
            // A range holding only whitespace says nothing about any line.
            let (last_line, last_col) = self.index.locate(last_code_offset(self.text, range)?)?;
            return Some(Span {
                source: self.identity_source.clone(),
                start_line: start_line.index as u32 + 1,
                start_col,
                end_line: last_line.index as u32 + 1,
                end_col: last_col,
            });
        };

        let (last_line, last_col) = self.index.locate(range.end_offset - 1)?;
        let generated_start_line = start_line.index as u32 + 1;
        let start = resolve_start(map, generated_start_line, start_col);
        let end = map.original_position_for(
            last_line.index as u32 + 1,
            last_col,
            Bias::GreatestLowerBound,
        );

        let (Some(source), Some(s_line), Some(s_col)) = (start.source, start.line, start.column)
        else {
            return None;
        };
        let (Some(end_source), Some(e_line), Some(e_col)) = (end.source, end.line, end.column)
        else {
            return None;
        };

        if source != end_source || (e_line, e_col) < (s_line, s_col) {
            self.ambiguous += 1;
            log::debug!(
                "range {}..{} maps across {}:{} .. {}:{}",
                range.start_offset,
                range.end_offset,
                source,
                s_line,
                end_source,
                e_line
            );
            return None;
        }

        if self.verify_exact
            && !is_exact(
                map,
                &source,
                s_line,
                s_col,
                generated_start_line,
                start_line.start_col,
                range.start_offset,
            )
        {
            self.ambiguous += 1;
            log::debug!(
                "range {}..{} start is not exactly mapped",
                range.start_offset,
                range.end_offset
            );
            return None;
        }

        let end_col = exclusive_end_column(map, &source, e_line, e_col);
        Some(Span {
            source,
            start_line: s_line,
            start_col: s_col,
            end_line: e_line,
            end_col,
        })
    }
}

fn last_code_offset(text: &str, range: &V8CoverageRange) -> Option<u32> {
    let bytes = text.as_bytes();
    (range.start_offset..range.end_offset)
        .rev()
        .find(|&o| bytes.get(o as usize).is_some_and(|b| !b.is_ascii_whitespace()))
}

fn resolve_start(map: &dyn SourceMapConsumer, line: u32, column: u32) -> OriginalLocation {
    let glb = map.original_position_for(line, column, Bias::GreatestLowerBound);
    if glb.source.is_some() {
        return glb;
    }
    map.original_position_for(line, column, Bias::LeastUpperBound)
}

/// Inclusive end column on `line` for a range whose last offset maps to
/// `(line, column)`: one before the next mapped original column on the same
/// line, or [`OriginalPosition::UNBOUNDED`] when nothing follows.
fn exclusive_end_column(
    map: &dyn SourceMapConsumer,
    source: &str,
    line: u32,
    column: u32,
) -> u32 {
    let next = map.generated_position_for(
        source,
        line,
        column.saturating_add(1),
        Bias::LeastUpperBound,
    );
    let Some(next) = next else {
        return OriginalPosition::UNBOUNDED;
    };
    let next = map.original_position_for(next.line, next.column, Bias::GreatestLowerBound);
    match (next.source.as_deref(), next.line, next.column) {
        (Some(s), Some(l), Some(c)) if s == source && l == line && c > column => c - 1,
        _ => OriginalPosition::UNBOUNDED,
    }
}

/// Whether mapping the original position forward again reproduces `offset`
/// on the generated line starting at `line_start`.
pub fn is_exact(
    map: &dyn SourceMapConsumer,
    source: &str,
    original_line: u32,
    original_column: u32,
    generated_line: u32,
    line_start: u32,
    offset: u32,
) -> bool {
    map.all_generated_positions_for(source, original_line, Some(original_column))
        .iter()
        .any(|g| g.line == generated_line && line_start.checked_add(g.column) == Some(offset))
}
