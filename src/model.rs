//! Data model for one coverage submission: raw V8 coverage in, per-probe
//! class coverage out. Everything here is created fresh per submission and
//! never mutated by the pipeline stages, which always build new values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProbecovError, Result};

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// A `[start_offset, end_offset)` span of generated code with its execution count.
///
/// After merging, the same shape describes one element of a disjoint,
/// ascending range list for a whole script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V8CoverageRange {
    pub start_offset: u32,
    pub end_offset: u32,
    pub count: u64,
}

impl V8CoverageRange {
    pub fn new(start_offset: u32, end_offset: u32, count: u64) -> Self {
        Self {
            start_offset,
            end_offset,
            count,
        }
    }

    /// True when `other` lies entirely within this range.
    #[must_use]
    pub fn contains(&self, other: &V8CoverageRange) -> bool {
        self.start_offset <= other.start_offset && self.end_offset >= other.end_offset
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_offset >= self.end_offset
    }
}

/// Coverage for a single function. `ranges[0]` spans the whole function;
/// the rest are nested inside it and override its count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V8FunctionCoverage {
    #[serde(default)]
    pub function_name: String,
    pub ranges: Vec<V8CoverageRange>,
    #[serde(default)]
    pub is_block_coverage: bool,
}

/// Coverage reported for one script by one V8 isolate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V8ScriptCoverage {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Digest of `source` when the agent computed one. Matching a recorded
    /// bundle hash skips hashing the text again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    #[serde(default)]
    pub functions: Vec<V8FunctionCoverage>,
}

/// Raw script text as reported alongside the coverage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSource {
    pub source: String,
}

/// Map from script URL to its reported source text.
pub type ScriptSources = HashMap<String, ScriptSource>;

/// SHA-256 of a bundle's normalized source text, recorded at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleHash {
    pub file: String,
    pub hash: String,
}

/// A merged range translated into original-source coordinates, restricted
/// to a single original file. Lines are 1-based, columns 0-based and
/// inclusive; `rel_end_col == u32::MAX` means the range runs to the end of
/// `end_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub start_line: u32,
    pub rel_start_col: u32,
    pub end_line: u32,
    pub rel_end_col: u32,
    pub source: String,
    pub count: u64,
}

impl OriginalPosition {
    /// Column value standing in for "until the end of the line".
    pub const UNBOUNDED: u32 = u32::MAX;

    #[must_use]
    pub fn is_covered(&self) -> bool {
        self.count > 0
    }
}

/// A method of an original file or class, with its instrumentation points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AstMethod {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    /// Original source lines, in output order.
    pub probes: Vec<u32>,
}

impl AstMethod {
    /// Inclusive line span covered by this method's probes.
    #[must_use]
    pub fn line_span(&self) -> Option<(u32, u32)> {
        let first = *self.probes.iter().min()?;
        let last = *self.probes.iter().max()?;
        Some((first, last))
    }
}

/// One original file, or one class within it when `suffix` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstEntity {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default)]
    pub methods: Vec<AstMethod>,
}

impl AstEntity {
    /// Total number of probes across all methods.
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.methods.iter().map(|m| m.probes.len()).sum()
    }

    /// Parse and validate a JSON array of entities.
    pub fn list_from_slice(input: &[u8]) -> Result<Vec<AstEntity>> {
        let entities: Vec<AstEntity> = serde_json::from_slice(input)?;
        for entity in &entities {
            entity.validate()?;
        }
        Ok(entities)
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_path.trim().is_empty() {
            return Err(ProbecovError::InvalidInput(
                "AST entity with empty filePath".to_string(),
            ));
        }
        for method in &self.methods {
            if method.probes.contains(&0) {
                return Err(ProbecovError::InvalidInput(format!(
                    "method '{}' in '{}' has probe line 0; probe lines are 1-based",
                    method.name, self.file_path
                )));
            }
        }
        Ok(())
    }
}

/// The test a coverage submission belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInfo {
    #[serde(default)]
    pub name: String,
}

/// Everything the agent sends for one test execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub coverage: Vec<V8ScriptCoverage>,
    #[serde(default)]
    pub script_sources: ScriptSources,
    #[serde(default)]
    pub test: TestInfo,
}

impl Submission {
    /// Parse and validate a submission document.
    pub fn from_slice(input: &[u8]) -> Result<Submission> {
        let submission: Submission = serde_json::from_slice(input)?;
        submission.validate()?;
        Ok(submission)
    }

    /// Reject malformed ranges before they reach the merge math.
    pub fn validate(&self) -> Result<()> {
        for script in &self.coverage {
            for function in &script.functions {
                if function.ranges.is_empty() {
                    return Err(ProbecovError::InvalidInput(format!(
                        "function '{}' in '{}' reports no ranges",
                        function.function_name, script.url
                    )));
                }
                for range in &function.ranges {
                    if range.start_offset > range.end_offset {
                        return Err(ProbecovError::InvalidInput(format!(
                            "range {}..{} in '{}' ends before it starts",
                            range.start_offset, range.end_offset, script.url
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Source text for a script: the separately reported source wins over
    /// the copy embedded in the coverage entry.
    #[must_use]
    pub fn source_for<'a>(&'a self, script: &'a V8ScriptCoverage) -> Option<&'a str> {
        self.script_sources
            .get(&script.url)
            .map(|s| s.source.as_str())
            .or(script.source.as_deref())
    }
}

/// Per-class probe coverage for one test: the pipeline output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecClassData {
    pub class_name: String,
    pub probes: Vec<bool>,
    pub test_name: String,
}

impl ExecClassData {
    #[must_use]
    pub fn covered(&self) -> usize {
        self.probes.iter().filter(|&&p| p).count()
    }
}
