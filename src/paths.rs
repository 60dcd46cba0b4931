//! Normalization of original-source paths so that source-map `sources`
//! entries and AST `filePath`s compare equal.

use std::sync::OnceLock;

use regex::Regex;

fn scheme_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `webpack:///./src/a.js`, `webpack://app/./src/a.js`, `http://host:8080/src/a.js`
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^/]*/").expect("valid regex"))
}

/// Normalize a source path:
///   1. `\` becomes `/`
///   2. a leading `scheme://authority/` and any `?query` are removed
///   3. leading `./` and `/` are removed
///   4. each of `strip_prefixes` is removed once, in order, if present,
///      followed again by step 3
#[must_use]
pub fn normalize_path(path: &str, strip_prefixes: &[String]) -> String {
    let slashed = path.replace('\\', "/");
    let without_query = slashed.split('?').next().unwrap_or_default();
    let without_scheme = scheme_prefix().replace(without_query, "");
    let mut rest = trim_leading(&without_scheme).to_string();

    for prefix in strip_prefixes {
        let prefix = prefix.replace('\\', "/");
        let prefix = trim_leading(&prefix);
        if prefix.is_empty() {
            continue;
        }
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = trim_leading(stripped).to_string();
        }
    }
    rest
}

fn trim_leading(mut path: &str) -> &str {
    loop {
        if let Some(r) = path.strip_prefix("./") {
            path = r;
        } else if let Some(r) = path.strip_prefix('/') {
            path = r;
        } else {
            return path;
        }
    }
}
