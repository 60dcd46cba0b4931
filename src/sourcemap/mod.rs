//! Source Map v3 consumer.
//!
//! Lines are 1-based and columns 0-based throughout the public API, matching
//! the usual consumer conventions. Lookups take a [`Bias`] deciding whether
//! the nearest mapping at-or-before (`GreatestLowerBound`) or at-or-after
//! (`LeastUpperBound`) the requested position is returned.

pub mod vlq;

use serde::Deserialize;

use crate::error::{ProbecovError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    GreatestLowerBound,
    LeastUpperBound,
}

/// One decoded mapping segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    /// Index into `sources`; `None` for segments without an original position.
    pub source: Option<u32>,
    pub original_line: u32,
    pub original_column: u32,
    pub name: Option<u32>,
}

impl Mapping {
    fn generated_key(&self) -> (u32, u32) {
        (self.generated_line, self.generated_column)
    }

    fn original_key(&self) -> (u32, u32, u32) {
        (
            self.source.unwrap_or(u32::MAX),
            self.original_line,
            self.original_column,
        )
    }
}

/// Result of a generated → original lookup. Every field is `None` when no
/// mapping qualifies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalLocation {
    pub source: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub name: Option<String>,
}

/// A generated position. `last_column` is the inclusive end of the mapped
/// segment, or `None` when it runs to the end of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedLocation {
    pub line: u32,
    pub column: u32,
    pub last_column: Option<u32>,
}

/// The lookups position mapping relies on.
pub trait SourceMapConsumer {
    fn original_position_for(&self, line: u32, column: u32, bias: Bias) -> OriginalLocation;

    fn generated_position_for(
        &self,
        source: &str,
        line: u32,
        column: u32,
        bias: Bias,
    ) -> Option<GeneratedLocation>;

    /// All generated positions for an original line, narrowed to one column
    /// when given. The column is matched through a `LeastUpperBound` search,
    /// so the closest mapped column at or after it is used.
    fn all_generated_positions_for(
        &self,
        source: &str,
        line: u32,
        column: Option<u32>,
    ) -> Vec<GeneratedLocation>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u32,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    source_root: Option<String>,
    #[serde(default)]
    sources: Vec<Option<String>>,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    mappings: String,
    #[serde(default)]
    sections: Option<serde_json::Value>,
}

/// A parsed Source Map v3 document with mappings indexed both by generated
/// and by original position.
#[derive(Debug, Clone)]
pub struct SourceMap {
    file: Option<String>,
    sources: Vec<String>,
    names: Vec<String>,
    by_generated: Vec<Mapping>,
    by_original: Vec<Mapping>,
}

impl SourceMap {
    pub fn from_slice(input: &[u8]) -> Result<SourceMap> {
        let raw: RawSourceMap = serde_json::from_slice(input)
            .map_err(|e| ProbecovError::SourceMap(format!("invalid source map JSON: {e}")))?;
        if raw.sections.is_some() {
            return Err(ProbecovError::SourceMap(
                "indexed source maps (\"sections\") are not supported".to_string(),
            ));
        }
        if raw.version != 3 {
            return Err(ProbecovError::SourceMap(format!(
                "unsupported source map version {}",
                raw.version
            )));
        }

        let root = raw.source_root.unwrap_or_default();
        let sources: Vec<String> = raw
            .sources
            .into_iter()
            .map(|s| join_source_root(&root, &s.unwrap_or_default()))
            .collect();
        let mappings = decode_mappings(&raw.mappings, sources.len(), raw.names.len())?;
        Ok(Self::from_parts(raw.file, sources, raw.names, mappings))
    }

    pub fn from_parts(
        file: Option<String>,
        sources: Vec<String>,
        names: Vec<String>,
        mappings: Vec<Mapping>,
    ) -> SourceMap {
        let mut by_generated = mappings;
        by_generated.sort_by_key(Mapping::generated_key);

        let mut by_original: Vec<Mapping> = by_generated
            .iter()
            .filter(|m| m.source.is_some())
            .copied()
            .collect();
        by_original.sort_by_key(|m| (m.original_key(), m.generated_key()));

        Self {
            file,
            sources,
            names,
            by_generated,
            by_original,
        }
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.by_generated
    }

    fn source_index(&self, source: &str) -> Option<u32> {
        self.sources
            .iter()
            .position(|s| s == source)
            .map(|i| i as u32)
    }

    /// Find the mapping nearest to a generated position on the same line.
    fn find_generated(&self, line: u32, column: u32, bias: Bias) -> Option<&Mapping> {
        let needle = (line, column);
        let found = match bias {
            Bias::GreatestLowerBound => {
                let idx = self
                    .by_generated
                    .partition_point(|m| m.generated_key() <= needle);
                let candidate = self.by_generated.get(idx.checked_sub(1)?)?;
                // Several segments can share one position; take the first.
                let first = self
                    .by_generated
                    .partition_point(|m| m.generated_key() < candidate.generated_key());
                &self.by_generated[first]
            }
            Bias::LeastUpperBound => {
                let idx = self
                    .by_generated
                    .partition_point(|m| m.generated_key() < needle);
                self.by_generated.get(idx)?
            }
        };
        (found.generated_line == line).then_some(found)
    }

    /// Find the mapping nearest to an original position within one source.
    fn find_original(&self, source: u32, line: u32, column: u32, bias: Bias) -> Option<usize> {
        let needle = (source, line, column);
        let idx = match bias {
            Bias::GreatestLowerBound => self
                .by_original
                .partition_point(|m| m.original_key() <= needle)
                .checked_sub(1)?,
            Bias::LeastUpperBound => self
                .by_original
                .partition_point(|m| m.original_key() < needle),
        };
        let found = self.by_original.get(idx)?;
        (found.source == Some(source)).then_some(idx)
    }

    fn generated_location(&self, mapping: &Mapping) -> GeneratedLocation {
        let next = self
            .by_generated
            .partition_point(|m| m.generated_key() <= mapping.generated_key());
        let last_column = self
            .by_generated
            .get(next)
            .filter(|m| m.generated_line == mapping.generated_line)
            .map(|m| m.generated_column.saturating_sub(1));
        GeneratedLocation {
            line: mapping.generated_line,
            column: mapping.generated_column,
            last_column,
        }
    }
}

impl SourceMapConsumer for SourceMap {
    fn original_position_for(&self, line: u32, column: u32, bias: Bias) -> OriginalLocation {
        let Some(mapping) = self.find_generated(line, column, bias) else {
            return OriginalLocation::default();
        };
        let Some(source) = mapping.source else {
            return OriginalLocation::default();
        };
        OriginalLocation {
            source: self.sources.get(source as usize).cloned(),
            line: Some(mapping.original_line),
            column: Some(mapping.original_column),
            name: mapping
                .name
                .and_then(|n| self.names.get(n as usize).cloned()),
        }
    }

    fn generated_position_for(
        &self,
        source: &str,
        line: u32,
        column: u32,
        bias: Bias,
    ) -> Option<GeneratedLocation> {
        let source = self.source_index(source)?;
        let idx = self.find_original(source, line, column, bias)?;
        Some(self.generated_location(&self.by_original[idx]))
    }

    fn all_generated_positions_for(
        &self,
        source: &str,
        line: u32,
        column: Option<u32>,
    ) -> Vec<GeneratedLocation> {
        let Some(source) = self.source_index(source) else {
            return Vec::new();
        };
        let Some(start) =
            self.find_original(source, line, column.unwrap_or(0), Bias::LeastUpperBound)
        else {
            return Vec::new();
        };

        let first = self.by_original[start];
        if first.original_line != line {
            return Vec::new();
        }
        self.by_original[start..]
            .iter()
            .take_while(|m| {
                m.source == Some(source)
                    && m.original_line == line
                    && (column.is_none() || m.original_column == first.original_column)
            })
            .map(|m| self.generated_location(m))
            .collect()
    }
}

fn join_source_root(root: &str, source: &str) -> String {
    if root.is_empty() || source.contains("://") || source.starts_with('/') {
        return source.to_string();
    }
    format!("{}/{}", root.trim_end_matches('/'), source)
}

fn field(value: i64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ProbecovError::SourceMap(format!("{what} out of range: {value}")))
}

/// Decode the `mappings` string into absolute mappings.
fn decode_mappings(mappings: &str, source_count: usize, name_count: usize) -> Result<Vec<Mapping>> {
    let mut out = Vec::new();
    // Everything but the generated column carries over between lines.
    let (mut source, mut original_line, mut original_column, mut name) = (0i64, 0i64, 0i64, 0i64);

    for (line_idx, line) in mappings.split(';').enumerate() {
        let mut generated_column = 0i64;
        for segment in line.split(',').filter(|s| !s.is_empty()) {
            let values = vlq::decode_segment(segment)?;
            generated_column = generated_column.saturating_add(values[0]);
            let mut mapping = Mapping {
                generated_line: line_idx as u32 + 1,
                generated_column: field(generated_column, "generated column")?,
                source: None,
                original_line: 0,
                original_column: 0,
                name: None,
            };
            match values.len() {
                1 => {}
                4 | 5 => {
                    source = source.saturating_add(values[1]);
                    original_line = original_line.saturating_add(values[2]);
                    original_column = original_column.saturating_add(values[3]);
                    let src = field(source, "source index")?;
                    if src as usize >= source_count {
                        return Err(ProbecovError::SourceMap(format!(
                            "source index {src} out of range ({source_count} sources)"
                        )));
                    }
                    mapping.source = Some(src);
                    mapping.original_line =
                        field(original_line.saturating_add(1), "original line")?;
                    mapping.original_column = field(original_column, "original column")?;
                    if values.len() == 5 {
                        name = name.saturating_add(values[4]);
                        let n = field(name, "name index")?;
                        if (n as usize) < name_count {
                            mapping.name = Some(n);
                        }
                    }
                }
                n => {
                    return Err(ProbecovError::SourceMap(format!(
                        "segment '{segment}' has {n} fields, expected 1, 4 or 5"
                    )));
                }
            }
            out.push(mapping);
        }
    }
    Ok(out)
}

/// Encode mappings back into a `mappings` string.
#[must_use]
pub fn encode_mappings(mappings: &[Mapping]) -> String {
    let mut sorted = mappings.to_vec();
    sorted.sort_by_key(Mapping::generated_key);

    let mut out = String::new();
    let mut line = 1u32;
    let (mut source, mut original_line, mut original_column, mut name) = (0i64, 0i64, 0i64, 0i64);
    let mut generated_column = 0i64;
    let mut first_in_line = true;

    for m in &sorted {
        while line < m.generated_line {
            out.push(';');
            line += 1;
            generated_column = 0;
            first_in_line = true;
        }
        if !first_in_line {
            out.push(',');
        }
        first_in_line = false;

        vlq::encode(i64::from(m.generated_column) - generated_column, &mut out);
        generated_column = i64::from(m.generated_column);
        if let Some(src) = m.source {
            vlq::encode(i64::from(src) - source, &mut out);
            source = i64::from(src);
            let orig_line = i64::from(m.original_line) - 1;
            vlq::encode(orig_line - original_line, &mut out);
            original_line = orig_line;
            vlq::encode(i64::from(m.original_column) - original_column, &mut out);
            original_column = i64::from(m.original_column);
            if let Some(n) = m.name {
                vlq::encode(i64::from(n) - name, &mut out);
                name = i64::from(n);
            }
        }
    }
    out
}
