//! Line table over raw script text, used to turn absolute generated offsets
//! into (line, column) pairs for source-map lookups.

/// One line of a script. `start_col` and `end_col` are absolute byte offsets
/// of the line's first and last position; the terminating `\n` belongs to
/// the line it ends, so consecutive lines tile the file without gaps. The
/// last line ends at the text length, so an exclusive end offset at EOF still
/// resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub index: usize,
    pub start_col: u32,
    pub end_col: u32,
}

impl Line {
    /// Column of `offset` relative to the line start.
    #[must_use]
    pub fn column(&self, offset: u32) -> u32 {
        offset.saturating_sub(self.start_col)
    }
}

/// Ordered, non-overlapping line spans of a script.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    lines: Vec<Line>,
}

impl SourceIndex {
    pub fn new(text: &str) -> Self {
        let mut lines = Vec::new();
        let mut start = 0u32;
        for (pos, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                lines.push(Line {
                    index: lines.len(),
                    start_col: start,
                    end_col: pos as u32,
                });
                start = pos as u32 + 1;
            }
        }
        lines.push(Line {
            index: lines.len(),
            start_col: start,
            end_col: text.len() as u32,
        });
        Self { lines }
    }

    /// Build an index from precomputed lines. Lines must be ascending and
    /// non-overlapping.
    pub fn from_lines(lines: Vec<Line>) -> Self {
        debug_assert!(lines.windows(2).all(|w| w[0].end_col < w[1].start_col));
        Self { lines }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Find the line whose `[start_col, end_col]` contains `offset`.
    ///
    /// Both bounds are inclusive. Returns `None` for negative offsets and
    /// offsets past the end of the text.
    #[must_use]
    pub fn find_line(&self, offset: i64) -> Option<Line> {
        if offset < 0 {
            return None;
        }
        // First line that does not end before `offset`.
        let idx = self
            .lines
            .partition_point(|line| i64::from(line.end_col) < offset);
        let line = self.lines.get(idx)?;
        if i64::from(line.start_col) <= offset {
            Some(*line)
        } else {
            None
        }
    }

    /// Resolve `offset` to its line and the column within that line.
    #[must_use]
    pub fn locate(&self, offset: u32) -> Option<(Line, u32)> {
        let line = self.find_line(i64::from(offset))?;
        Some((line, line.column(offset)))
    }
}
