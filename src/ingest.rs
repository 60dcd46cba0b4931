use rusqlite::Connection;

use crate::bundle::bundle_script_name;
use crate::db::{self, NewSourceMap};
use crate::error::{ProbecovError, Result};
use crate::model::{AstEntity, BundleHash, Submission};
use crate::processor::{self, BundleMetadata, Conversion, NamedSourceMap, ProcessorConfig};
use crate::sourcemap::SourceMap;

/// Validate and store an agent's source maps and bundle hashes, deriving the
/// bundle script names from the maps. `maps` pairs each map's file name with
/// its JSON document. Returns the derived script names.
pub fn register(
    conn: &mut Connection,
    agent_id: &str,
    maps: &[(String, String)],
    hashes: &[BundleHash],
) -> Result<Vec<String>> {
    if agent_id.trim().is_empty() {
        return Err(ProbecovError::InvalidInput("agent id must not be empty".to_string()));
    }

    let mut parsed = Vec::with_capacity(maps.len());
    for (name, document) in maps {
        parsed.push(parse_source_map(name, document)?);
    }

    let mut names: Vec<String> = maps
        .iter()
        .zip(&parsed)
        .map(|((name, _), map)| bundle_script_name(name, map))
        .collect();
    names.sort();
    names.dedup();

    let records: Vec<NewSourceMap> = maps
        .iter()
        .zip(&parsed)
        .map(|((name, document), map)| NewSourceMap {
            name: name.as_str(),
            file: map.file(),
            document: document.as_str(),
        })
        .collect();

    db::save_registration(conn, agent_id, &records, &names, hashes)?;
    log::info!(
        "registered {} source maps ({} bundle scripts, {} hashes) for agent '{}'",
        maps.len(),
        names.len(),
        hashes.len(),
        agent_id
    );
    Ok(names)
}

fn parse_source_map(name: &str, document: &str) -> Result<SourceMap> {
    SourceMap::from_slice(document.as_bytes()).map_err(|e| match e {
        ProbecovError::SourceMap(msg) => ProbecovError::SourceMap(format!("{name}: {msg}")),
        other => other,
    })
}

/// Load everything registered for `agent_id`.
pub fn load_metadata(conn: &Connection, agent_id: &str) -> Result<BundleMetadata> {
    let script_names = db::get_bundle_scripts_names(conn, agent_id)?;
    let hashes = db::get_bundle_hashes(conn, agent_id)?;

    let mut source_maps = Vec::new();
    for stored in db::get_source_maps(conn, agent_id)? {
        let map = parse_source_map(&stored.name, &stored.document)?;
        source_maps.push(NamedSourceMap {
            script_name: bundle_script_name(&stored.name, &map),
            map,
        });
    }

    Ok(BundleMetadata {
        agent_id: agent_id.to_string(),
        script_names,
        hashes,
        source_maps,
    })
}

/// Convert one submission for `agent_id` against its registered metadata.
///
/// All storage reads happen before processing starts. An agent without
/// registered bundle scripts fails with `NoBundleMetadata`.
pub fn convert(
    conn: &Connection,
    agent_id: &str,
    submission: &Submission,
    ast: &[AstEntity],
    config: &ProcessorConfig,
) -> Result<Conversion> {
    let metadata = load_metadata(conn, agent_id)?;
    processor::process(submission, &metadata, ast, config)
}
