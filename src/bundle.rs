//! Bundle identity: decides whether a reported script is one of ours and
//! whether it is byte-for-byte the bundle the AST and source maps were
//! produced from.

use std::borrow::Cow;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::model::{BundleHash, ScriptSources, V8ScriptCoverage};
use crate::sourcemap::SourceMap;

/// Trailing path segment of a script URL, without query string or fragment.
#[must_use]
pub fn script_name(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = url[..end].trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path)
}

/// Whether the script's file name is part of a known bundle.
#[must_use]
pub fn check_script_names(script: &V8ScriptCoverage, known: &[String]) -> bool {
    let name = script_name(&script.url);
    !name.is_empty() && known.iter().any(|k| k.contains(name))
}

fn line_terminators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r\n|[\r\x{2028}\x{2029}]").expect("valid regex"))
}

/// Rewrite CRLF, lone CR, U+2028 and U+2029 to `\n`.
#[must_use]
pub fn normalize_line_endings(source: &str) -> Cow<'_, str> {
    line_terminators().replace_all(source, "\n")
}

/// Lowercase hex SHA-256 of the line-ending normalized source.
#[must_use]
pub fn hash_source(source: &str) -> String {
    let normalized = normalize_line_endings(source);
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Whether `source` hashes to a recorded bundle hash whose file names the
/// script at `url`.
#[must_use]
pub fn check_source_hash(url: &str, source: &str, hashes: &[BundleHash]) -> bool {
    let name = script_name(url);
    if name.is_empty() {
        return false;
    }
    is_recorded(name, &hash_source(source), hashes)
}

fn is_recorded(name: &str, digest: &str, hashes: &[BundleHash]) -> bool {
    hashes
        .iter()
        .any(|h| h.file.contains(name) && h.hash.eq_ignore_ascii_case(digest))
}

/// Whether the agent already reported a `sourceHash` for the script that
/// equals a recorded bundle hash. A missing or unrecognized hash is not a
/// mismatch; the source text is hashed instead.
#[must_use]
pub fn check_reported_hash(script: &V8ScriptCoverage, hashes: &[BundleHash]) -> bool {
    let name = script_name(&script.url);
    match script.source_hash.as_deref() {
        Some(reported) if !name.is_empty() => is_recorded(name, reported, hashes),
        _ => false,
    }
}

/// Look up the reported source for `url` and compare its hash against the
/// recorded bundle hashes. Unknown scripts are reported as not matching.
#[must_use]
pub fn check_same_bundle(url: &str, sources: &ScriptSources, hashes: &[BundleHash]) -> bool {
    match sources.get(url) {
        Some(script) => check_source_hash(url, &script.source, hashes),
        None => false,
    }
}

/// Name of the bundle a source map describes: its `file` field, or the map's
/// own file name with the `.map` suffix removed.
#[must_use]
pub fn bundle_script_name(map_file_name: &str, map: &SourceMap) -> String {
    if let Some(file) = map.file().filter(|f| !f.is_empty()) {
        return file.to_string();
    }
    let base = Path::new(map_file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(map_file_name);
    base.strip_suffix(".map").unwrap_or(base).to_string()
}
