use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use std::path::Path;

use crate::error::{ProbecovError, Result};
use crate::model::BundleHash;

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

/// Open (or create) the probecov database at the given path.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

/// Ensure the schema is initialized. Safe to call on an already-initialized DB.
/// A database written with any other schema version is refused.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: u32 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| {
        row.get(0)
    })?;
    if count == 0 {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    let version: u32 = conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })?;
    if version != SCHEMA_VERSION {
        return Err(ProbecovError::Other(format!(
            "Database schema version {} does not match the version this binary \
             supports ({}). Delete the database and register the source maps again.",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// A source map document as handed to storage.
#[derive(Debug, Clone, Copy)]
pub struct NewSourceMap<'a> {
    /// File name the map was registered under, e.g. `main.js.map`.
    pub name: &'a str,
    /// The map's own `file` field.
    pub file: Option<&'a str>,
    /// Raw Source Map v3 JSON.
    pub document: &'a str,
}

/// A source map as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSourceMap {
    pub name: String,
    pub file: Option<String>,
    pub document: String,
    pub created_at: String,
}

/// Agent with registered bundle metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSummary {
    pub agent_id: String,
    pub source_maps: u32,
    pub bundle_scripts: u32,
    pub bundle_hashes: u32,
    pub registered_at: String,
}

/// Replace the agent's source maps.
pub fn save_source_maps(
    conn: &mut Connection,
    agent_id: &str,
    maps: &[NewSourceMap],
) -> Result<()> {
    let tx = conn.transaction()?;
    save_source_maps_tx(&tx, agent_id, maps)?;
    tx.commit()?;
    Ok(())
}

fn save_source_maps_tx(tx: &Transaction, agent_id: &str, maps: &[NewSourceMap]) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    tx.execute("DELETE FROM source_map WHERE agent_id = ?1", params![agent_id])?;
    let mut stmt = tx.prepare_cached(
        "INSERT OR REPLACE INTO source_map (agent_id, name, file, document, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for map in maps {
        stmt.execute(params![agent_id, map.name, map.file, map.document, now])?;
    }
    log::debug!("stored {} source maps for agent '{}'", maps.len(), agent_id);
    Ok(())
}

pub fn get_source_maps(conn: &Connection, agent_id: &str) -> Result<Vec<StoredSourceMap>> {
    let mut stmt = conn.prepare(
        "SELECT name, file, document, created_at FROM source_map \
         WHERE agent_id = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![agent_id], |row| {
        Ok(StoredSourceMap {
            name: row.get(0)?,
            file: row.get(1)?,
            document: row.get(2)?,
            created_at: row.get(3)?,
        })
    })?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Replace the agent's known bundle script names.
pub fn save_bundle_scripts_names(
    conn: &mut Connection,
    agent_id: &str,
    names: &[String],
) -> Result<()> {
    let tx = conn.transaction()?;
    save_bundle_scripts_names_tx(&tx, agent_id, names)?;
    tx.commit()?;
    Ok(())
}

fn save_bundle_scripts_names_tx(tx: &Transaction, agent_id: &str, names: &[String]) -> Result<()> {
    tx.execute("DELETE FROM bundle_script WHERE agent_id = ?1", params![agent_id])?;
    let mut stmt =
        tx.prepare_cached("INSERT OR IGNORE INTO bundle_script (agent_id, name) VALUES (?1, ?2)")?;
    for name in names {
        stmt.execute(params![agent_id, name])?;
    }
    log::debug!("stored {} bundle script names for agent '{}'", names.len(), agent_id);
    Ok(())
}

pub fn get_bundle_scripts_names(conn: &Connection, agent_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM bundle_script WHERE agent_id = ?1 ORDER BY name")?;
    let rows = stmt.query_map(params![agent_id], |row| row.get::<_, String>(0))?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Replace the agent's recorded bundle hashes.
pub fn save_bundle_hashes(
    conn: &mut Connection,
    agent_id: &str,
    hashes: &[BundleHash],
) -> Result<()> {
    let tx = conn.transaction()?;
    save_bundle_hashes_tx(&tx, agent_id, hashes)?;
    tx.commit()?;
    Ok(())
}

fn save_bundle_hashes_tx(tx: &Transaction, agent_id: &str, hashes: &[BundleHash]) -> Result<()> {
    tx.execute("DELETE FROM bundle_hash WHERE agent_id = ?1", params![agent_id])?;
    let mut stmt = tx.prepare_cached(
        "INSERT OR REPLACE INTO bundle_hash (agent_id, file, hash) VALUES (?1, ?2, ?3)",
    )?;
    for h in hashes {
        stmt.execute(params![agent_id, h.file, h.hash])?;
    }
    log::debug!("stored {} bundle hashes for agent '{}'", hashes.len(), agent_id);
    Ok(())
}

pub fn get_bundle_hashes(conn: &Connection, agent_id: &str) -> Result<Vec<BundleHash>> {
    let mut stmt =
        conn.prepare("SELECT file, hash FROM bundle_hash WHERE agent_id = ?1 ORDER BY file")?;
    let rows = stmt.query_map(params![agent_id], |row| {
        Ok(BundleHash {
            file: row.get(0)?,
            hash: row.get(1)?,
        })
    })?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Replace all of an agent's bundle metadata in one transaction.
pub fn save_registration(
    conn: &mut Connection,
    agent_id: &str,
    maps: &[NewSourceMap],
    names: &[String],
    hashes: &[BundleHash],
) -> Result<()> {
    let tx = conn.transaction()?;
    save_source_maps_tx(&tx, agent_id, maps)?;
    save_bundle_scripts_names_tx(&tx, agent_id, names)?;
    save_bundle_hashes_tx(&tx, agent_id, hashes)?;
    tx.commit()?;
    Ok(())
}

/// List agents that have source maps registered.
pub fn list_agents(conn: &Connection) -> Result<Vec<AgentSummary>> {
    let mut stmt = conn.prepare(
        "SELECT s.agent_id, COUNT(*), MAX(s.created_at),
                (SELECT COUNT(*) FROM bundle_script b WHERE b.agent_id = s.agent_id),
                (SELECT COUNT(*) FROM bundle_hash h WHERE h.agent_id = s.agent_id)
         FROM source_map s
         GROUP BY s.agent_id
         ORDER BY s.agent_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(AgentSummary {
            agent_id: row.get(0)?,
            source_maps: row.get(1)?,
            registered_at: row.get(2)?,
            bundle_scripts: row.get(3)?,
            bundle_hashes: row.get(4)?,
        })
    })?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}
