use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use probecov::cli::{self, Style};
use probecov::db;
use probecov::processor::ProcessorConfig;

/// probecov: V8 coverage to per-probe class coverage through source maps.
#[derive(Parser)]
#[command(name = "probecov", version, about)]
struct Cli {
    /// Path to the SQLite database (default: ./.probecov.db)
    #[arg(long, global = true, default_value = ".probecov.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register an agent's source maps and bundle hashes.
    Register {
        /// Agent id the bundle belongs to.
        #[arg(long)]
        agent: String,

        /// JSON array of `{ file, hash }` bundle hashes.
        #[arg(long)]
        hashes: Option<PathBuf>,

        /// Source map files (`*.js.map`).
        #[arg(required = true)]
        maps: Vec<PathBuf>,
    },

    /// List the bundle script names registered for an agent.
    Scripts {
        #[arg(long)]
        agent: String,
    },

    /// List agents with registered bundle metadata.
    Agents,

    /// Convert a V8 coverage submission into per-probe class coverage.
    Convert {
        #[arg(long)]
        agent: String,

        /// Submission JSON: `{ coverage, scriptSources, test }`.
        #[arg(long)]
        coverage: PathBuf,

        /// JSON array of AST entities.
        #[arg(long)]
        ast: PathBuf,

        /// Test name (overrides the one in the submission).
        #[arg(long)]
        test: Option<String>,

        /// Skip scripts whose bundle hash mismatches instead of failing.
        #[arg(long)]
        lenient: bool,

        /// Do not compare script sources with the registered bundle hashes.
        #[arg(long)]
        no_hash_check: bool,

        /// Drop ranges whose start is not exactly mapped.
        #[arg(long)]
        verify_exact: bool,

        /// Treat scripts as unbundled: do not apply source maps.
        #[arg(long)]
        no_source_maps: bool,

        /// Prefix to strip from source paths before matching (repeatable).
        #[arg(long = "strip-prefix")]
        strip_prefixes: Vec<String>,

        /// Output style.
        #[arg(long, value_enum, default_value = "text")]
        style: Style,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut conn = db::open(&cli.db).context("Failed to open database")?;
    db::init_schema(&conn).context("Failed to initialize schema")?;

    let output = match cli.command {
        Commands::Register {
            agent,
            hashes,
            maps,
        } => {
            let mut documents = Vec::with_capacity(maps.len());
            for path in &maps {
                documents.push((file_name(path), read_text(path)?));
            }
            let hashes = hashes.as_deref().map(read_bytes).transpose()?;
            cli::cmd_register(&mut conn, &agent, &documents, hashes.as_deref())?
        }
        Commands::Scripts { agent } => cli::cmd_scripts(&conn, &agent)?,
        Commands::Agents => cli::cmd_agents(&conn)?,
        Commands::Convert {
            agent,
            coverage,
            ast,
            test,
            lenient,
            no_hash_check,
            verify_exact,
            no_source_maps,
            strip_prefixes,
            style,
        } => {
            let mut config = ProcessorConfig::default()
                .with_strict_bundle_check(!lenient)
                .with_verify_bundle_hash(!no_hash_check)
                .with_verify_exact(verify_exact)
                .with_source_mapping(!no_source_maps);
            config.strip_prefixes = strip_prefixes;
            cli::cmd_convert(
                &conn,
                &agent,
                &read_bytes(&coverage)?,
                &read_bytes(&ast)?,
                test.as_deref(),
                &config,
                &style,
            )?
        }
    };
    print!("{output}");
    Ok(())
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed.map")
        .to_string()
}
