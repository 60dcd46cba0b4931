pub mod bundle;
pub mod cli;
pub mod db;
pub mod error;
pub mod ingest;
pub mod model;
pub mod paths;
pub mod position;
pub mod probes;
pub mod processor;
pub mod ranges;
pub mod report;
pub mod source_index;
pub mod sourcemap;
