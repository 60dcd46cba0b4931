//! Command handler functions for the probecov CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout. File reading stays in `main`.

use std::fmt::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;
use rusqlite::Connection;

use crate::model::{AstEntity, BundleHash, Submission};
use crate::processor::ProcessorConfig;
use crate::report::{JsonFormatter, ReportFormatter, TextFormatter};
use crate::{db, ingest};

/// Output style for the `convert` command.
#[derive(Clone, ValueEnum)]
pub enum Style {
    Text,
    Json,
}

/// Register source maps, given as `(file name, JSON document)` pairs, and
/// an optional JSON array of bundle hashes.
pub fn cmd_register(
    conn: &mut Connection,
    agent_id: &str,
    maps: &[(String, String)],
    hashes: Option<&[u8]>,
) -> Result<String> {
    let hashes: Vec<BundleHash> = match hashes {
        Some(input) => serde_json::from_slice(input).context("Failed to parse bundle hashes")?,
        None => Vec::new(),
    };
    let names = ingest::register(conn, agent_id, maps, &hashes)?;

    let mut out = String::new();
    writeln!(
        out,
        "Registered {} source maps and {} bundle hashes for agent '{}'",
        maps.len(),
        hashes.len(),
        agent_id
    )
    .unwrap();
    writeln!(out, "Bundle scripts: {}", names.join(", ")).unwrap();
    Ok(out)
}

pub fn cmd_scripts(conn: &Connection, agent_id: &str) -> Result<String> {
    let names = db::get_bundle_scripts_names(conn, agent_id)?;
    if names.is_empty() {
        return Ok(format!("No bundle scripts registered for agent '{agent_id}'.\n"));
    }
    let mut out = String::new();
    for name in &names {
        writeln!(out, "{name}").unwrap();
    }
    Ok(out)
}

pub fn cmd_agents(conn: &Connection) -> Result<String> {
    let agents = db::list_agents(conn)?;
    if agents.is_empty() {
        return Ok("No agents in database.\n".to_string());
    }
    let mut out = String::new();
    writeln!(
        out,
        "{:<30} {:>6} {:>8} {:>7} REGISTERED",
        "AGENT", "MAPS", "SCRIPTS", "HASHES"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(88)).unwrap();
    for a in &agents {
        writeln!(
            out,
            "{:<30} {:>6} {:>8} {:>7} {}",
            a.agent_id, a.source_maps, a.bundle_scripts, a.bundle_hashes, a.registered_at
        )
        .unwrap();
    }
    Ok(out)
}

/// Convert a coverage submission against the agent's registered bundle.
/// `test_name` overrides the test named in the submission.
pub fn cmd_convert(
    conn: &Connection,
    agent_id: &str,
    coverage: &[u8],
    ast: &[u8],
    test_name: Option<&str>,
    config: &ProcessorConfig,
    style: &Style,
) -> Result<String> {
    let mut submission =
        Submission::from_slice(coverage).context("Failed to parse coverage submission")?;
    if let Some(name) = test_name {
        submission.test.name = name.to_string();
    }
    let entities = AstEntity::list_from_slice(ast).context("Failed to parse AST entities")?;

    let conversion = ingest::convert(conn, agent_id, &submission, &entities, config)?;

    let formatter: &dyn ReportFormatter = match style {
        Style::Text => &TextFormatter,
        Style::Json => &JsonFormatter,
    };
    Ok(conversion.format(formatter)?)
}
