#![allow(dead_code)]

use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

use probecov::model::{
    AstEntity, AstMethod, BundleHash, ScriptSource, Submission, TestInfo, V8CoverageRange,
    V8FunctionCoverage, V8ScriptCoverage,
};
use probecov::sourcemap::{encode_mappings, Mapping};

/// Create a fresh temporary database, returning the connection, dir handle, and db path.
/// The caller must hold onto `TempDir` to keep the temp directory alive.
pub fn setup_db() -> (Connection, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let conn = probecov::db::open(&db_path).unwrap();
    probecov::db::init_schema(&conn).unwrap();
    (conn, dir, db_path)
}

pub const BUNDLE_URL: &str = "http://localhost:8080/static/main.js";

/// Generated bundle of `lines` lines, 11 bytes each including the newline.
pub fn bundle_source(lines: u32) -> String {
    (1..=lines).map(|i| format!("line{i:05};\n")).collect()
}

/// Source map JSON for [`bundle_source`]: generated line N maps to line N of
/// `src/app.js`.
pub fn line_per_line_map(lines: u32) -> String {
    let segments: Vec<(u32, u32, u32, u32)> = (1..=lines).map(|l| (l, 0, l, 0)).collect();
    app_map(&segments)
}

/// Source map JSON for `main.js` with every segment pointing into
/// `src/app.js`. Segments are `(generated line, generated column, original
/// line, original column)`, lines 1-based.
pub fn app_map(segments: &[(u32, u32, u32, u32)]) -> String {
    let mappings: Vec<Mapping> = segments
        .iter()
        .map(|&(gl, gc, ol, oc)| Mapping {
            generated_line: gl,
            generated_column: gc,
            source: Some(0),
            original_line: ol,
            original_column: oc,
            name: None,
        })
        .collect();
    serde_json::json!({
        "version": 3,
        "file": "main.js",
        "sources": ["webpack:///./src/app.js"],
        "names": [],
        "mappings": encode_mappings(&mappings),
    })
    .to_string()
}

pub fn bundle_hash(source: &str) -> BundleHash {
    BundleHash {
        file: "static/main.js".to_string(),
        hash: probecov::bundle::hash_source(source),
    }
}

/// One script's coverage; each inner vec is one function's `(start, end, count)` ranges.
pub fn script(url: &str, functions: &[&[(u32, u32, u64)]]) -> V8ScriptCoverage {
    V8ScriptCoverage {
        url: url.to_string(),
        source: None,
        source_hash: None,
        functions: functions
            .iter()
            .map(|ranges| V8FunctionCoverage {
                function_name: String::new(),
                ranges: ranges
                    .iter()
                    .map(|&(s, e, c)| V8CoverageRange::new(s, e, c))
                    .collect(),
                is_block_coverage: true,
            })
            .collect(),
    }
}

/// Submission where every script reports `source` as its text.
pub fn submission(scripts: Vec<V8ScriptCoverage>, source: &str, test: &str) -> Submission {
    let script_sources = scripts
        .iter()
        .map(|s| {
            (
                s.url.clone(),
                ScriptSource {
                    source: source.to_string(),
                },
            )
        })
        .collect();
    Submission {
        coverage: scripts,
        script_sources,
        test: TestInfo {
            name: test.to_string(),
        },
    }
}

pub fn entity(file_path: &str, methods: &[(&str, &[u32])]) -> AstEntity {
    AstEntity {
        file_path: file_path.to_string(),
        suffix: None,
        methods: methods
            .iter()
            .map(|(name, probes)| AstMethod {
                name: name.to_string(),
                params: vec![],
                probes: probes.to_vec(),
            })
            .collect(),
    }
}
