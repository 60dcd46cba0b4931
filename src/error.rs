use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbecovError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Source map error: {0}")]
    SourceMap(String),

    #[error("Bundle mismatch for script '{url}': source hash does not match any recorded bundle hash")]
    BundleMismatch { url: String },

    #[error("No bundle metadata registered for agent '{agent_id}'. Register source maps before submitting coverage.")]
    NoBundleMetadata { agent_id: String },

    #[error("Probe vector length mismatch for '{class_name}': expected {expected}, got {actual}")]
    ProbeVectorLengthMismatch {
        class_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ProbecovError>;
