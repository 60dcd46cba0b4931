//! The conversion pipeline for one coverage submission:
//! filter scripts, merge their ranges, map them to original sources, match
//! them against AST probes and OR the per-isolate vectors together.
//!
//! Everything here is pure. Bundle metadata is loaded by the caller and
//! handed in, so no stage ever waits on storage.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use rayon::prelude::*;
use serde::Serialize;

use crate::bundle;
use crate::error::{ProbecovError, Result};
use crate::model::{
    AstEntity, BundleHash, ExecClassData, OriginalPosition, Submission, V8ScriptCoverage,
};
use crate::paths::normalize_path;
use crate::position::PositionMapper;
use crate::probes;
use crate::ranges::merge_script;
use crate::source_index::SourceIndex;
use crate::sourcemap::SourceMap;

/// Per-invocation switches for the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// A script whose source hash matches no recorded bundle hash rejects
    /// the whole submission. When off, the script is skipped instead.
    pub strict_bundle_check: bool,
    /// Compare script sources against recorded bundle hashes at all.
    pub verify_bundle_hash: bool,
    /// Drop ranges whose start does not sit exactly on a mapping.
    pub verify_exact: bool,
    /// Map through source maps. When off, scripts are their own sources.
    pub source_mapping: bool,
    /// Extra prefixes removed from original source paths and AST file paths.
    pub strip_prefixes: Vec<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            strict_bundle_check: true,
            verify_bundle_hash: true,
            verify_exact: false,
            source_mapping: true,
            strip_prefixes: Vec::new(),
        }
    }
}

impl ProcessorConfig {
    #[must_use]
    pub fn with_strict_bundle_check(mut self, strict: bool) -> Self {
        self.strict_bundle_check = strict;
        self
    }

    #[must_use]
    pub fn with_verify_bundle_hash(mut self, verify: bool) -> Self {
        self.verify_bundle_hash = verify;
        self
    }

    #[must_use]
    pub fn with_verify_exact(mut self, verify: bool) -> Self {
        self.verify_exact = verify;
        self
    }

    #[must_use]
    pub fn with_source_mapping(mut self, enabled: bool) -> Self {
        self.source_mapping = enabled;
        self
    }

    #[must_use]
    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefixes.push(prefix.into());
        self
    }
}

/// A source map together with the bundle script name it describes.
#[derive(Debug, Clone)]
pub struct NamedSourceMap {
    pub script_name: String,
    pub map: SourceMap,
}

/// Everything registered for one agent's build.
#[derive(Debug, Clone, Default)]
pub struct BundleMetadata {
    pub agent_id: String,
    pub script_names: Vec<String>,
    pub hashes: Vec<BundleHash>,
    pub source_maps: Vec<NamedSourceMap>,
}

impl BundleMetadata {
    /// The source map whose bundle name references `script_name`.
    #[must_use]
    pub fn source_map_for(&self, script_name: &str) -> Option<&SourceMap> {
        if script_name.is_empty() {
            return None;
        }
        self.source_maps
            .iter()
            .find(|m| m.script_name.contains(script_name))
            .map(|m| &m.map)
    }
}

/// Why a script contributed nothing to the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    EmptyUrl,
    UnknownScript,
    MissingSource,
    BundleMismatch,
    MissingSourceMap,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::EmptyUrl => "empty url",
            SkipReason::UnknownScript => "not a known bundle script",
            SkipReason::MissingSource => "no script source reported",
            SkipReason::BundleMismatch => "source hash does not match the registered bundle",
            SkipReason::MissingSourceMap => "no source map registered",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedScript {
    pub url: String,
    pub reason: SkipReason,
}

/// Result of converting one submission.
#[derive(Debug, Clone, Default)]
pub struct Conversion {
    pub classes: Vec<ExecClassData>,
    pub skipped: Vec<SkippedScript>,
    /// Ranges dropped because they spanned two original files or failed
    /// the exactness check.
    pub dropped_ranges: usize,
}

enum ScriptOutcome {
    Skipped(SkipReason),
    Mismatch,
    Mapped {
        /// Positions keyed by normalized original source path.
        by_source: HashMap<String, Vec<OriginalPosition>>,
        ambiguous: usize,
    },
}

/// Convert a submission into per-class probe coverage.
///
/// Scripts are processed in parallel; aggregation starts only once every
/// script has finished. Output classes follow the order of `ast`.
pub fn process(
    submission: &Submission,
    metadata: &BundleMetadata,
    ast: &[AstEntity],
    config: &ProcessorConfig,
) -> Result<Conversion> {
    if metadata.script_names.is_empty() {
        return Err(ProbecovError::NoBundleMetadata {
            agent_id: metadata.agent_id.clone(),
        });
    }

    let outcomes: Vec<ScriptOutcome> = submission
        .coverage
        .par_iter()
        .map(|script| process_script(script, submission, metadata, config))
        .collect();

    let mut conversion = Conversion::default();
    let mut mapped = Vec::new();
    for (script, outcome) in submission.coverage.iter().zip(outcomes) {
        match outcome {
            ScriptOutcome::Mismatch if config.strict_bundle_check => {
                return Err(ProbecovError::BundleMismatch {
                    url: script.url.clone(),
                });
            }
            ScriptOutcome::Mismatch => {
                log::warn!("skipping {}: bundle hash mismatch", script.url);
                conversion.skipped.push(SkippedScript {
                    url: script.url.clone(),
                    reason: SkipReason::BundleMismatch,
                });
            }
            ScriptOutcome::Skipped(reason) => {
                conversion.skipped.push(SkippedScript {
                    url: script.url.clone(),
                    reason,
                });
            }
            ScriptOutcome::Mapped {
                by_source,
                ambiguous,
            } => {
                if ambiguous > 0 {
                    log::debug!("{}: dropped {} ambiguous ranges", script.url, ambiguous);
                }
                conversion.dropped_ranges += ambiguous;
                mapped.push(by_source);
            }
        }
    }

    conversion.classes = aggregate(&mapped, ast, &submission.test.name, &config.strip_prefixes)?;
    log::info!(
        "converted {} scripts into {} classes ({} skipped, {} ranges dropped)",
        mapped.len(),
        conversion.classes.len(),
        conversion.skipped.len(),
        conversion.dropped_ranges
    );
    Ok(conversion)
}

fn process_script(
    script: &V8ScriptCoverage,
    submission: &Submission,
    metadata: &BundleMetadata,
    config: &ProcessorConfig,
) -> ScriptOutcome {
    if script.url.is_empty() {
        return ScriptOutcome::Skipped(SkipReason::EmptyUrl);
    }
    if !bundle::check_script_names(script, &metadata.script_names) {
        log::debug!("skipping {}: not a known bundle script", script.url);
        return ScriptOutcome::Skipped(SkipReason::UnknownScript);
    }
    let Some(source) = submission.source_for(script) else {
        log::warn!("skipping {}: no script source reported", script.url);
        return ScriptOutcome::Skipped(SkipReason::MissingSource);
    };

    if config.verify_bundle_hash {
        let same_bundle = if bundle::check_reported_hash(script, &metadata.hashes) {
            true
        } else if submission.script_sources.contains_key(&script.url) {
            bundle::check_same_bundle(&script.url, &submission.script_sources, &metadata.hashes)
        } else {
            bundle::check_source_hash(&script.url, source, &metadata.hashes)
        };
        if !same_bundle {
            return ScriptOutcome::Mismatch;
        }
    }

    let name = bundle::script_name(&script.url);
    let index = SourceIndex::new(source);
    let mut mapper = if config.source_mapping {
        let Some(map) = metadata.source_map_for(name) else {
            log::warn!("skipping {}: no source map registered for '{}'", script.url, name);
            return ScriptOutcome::Skipped(SkipReason::MissingSourceMap);
        };
        PositionMapper::new(&index, map).with_verify_exact(config.verify_exact)
    } else {
        PositionMapper::identity(&index, source, script.url.clone())
    };

    let merged = merge_script(&script.functions);
    let mut by_source: HashMap<String, Vec<OriginalPosition>> = HashMap::new();
    for range in &merged {
        if let Some(mut position) = mapper.map_range(range) {
            position.source = normalize_path(&position.source, &config.strip_prefixes);
            by_source
                .entry(position.source.clone())
                .or_default()
                .push(position);
        }
    }

    log::debug!(
        "{}: {} merged ranges mapped onto {} sources",
        script.url,
        merged.len(),
        by_source.len()
    );
    ScriptOutcome::Mapped {
        by_source,
        ambiguous: mapper.ambiguous(),
    }
}

/// OR every script's vector for each entity, keyed by class name. Entities
/// no script produced positions for are left out.
fn aggregate(
    scripts: &[HashMap<String, Vec<OriginalPosition>>],
    ast: &[AstEntity],
    test_name: &str,
    strip_prefixes: &[String],
) -> Result<Vec<ExecClassData>> {
    let mut order: Vec<String> = Vec::new();
    let mut vectors: HashMap<String, Vec<bool>> = HashMap::new();

    for entity in ast {
        let path = normalize_path(&entity.file_path, strip_prefixes);
        let class_name = probes::class_name(entity, strip_prefixes);
        for by_source in scripts {
            let Some(ranges) = by_source.get(&path) else {
                continue;
            };
            let vector = probes::map_entity(entity, ranges);
            match vectors.entry(class_name.clone()) {
                Entry::Occupied(mut acc) => probes::combine(&class_name, acc.get_mut(), &vector)?,
                Entry::Vacant(slot) => {
                    slot.insert(vector);
                    order.push(class_name.clone());
                }
            }
        }
    }

    let mut classes = Vec::with_capacity(order.len());
    for class_name in order {
        if let Some(probes) = vectors.remove(&class_name) {
            classes.push(ExecClassData {
                class_name,
                probes,
                test_name: test_name.to_string(),
            });
        }
    }
    Ok(classes)
}
