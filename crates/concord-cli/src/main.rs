//! `concord`: command-line front end for a Concord discussion database.
//!
//! Reads `concord.toml` (or the path given with `--config`), opens the
//! SQLite store it names and runs one command, printing JSON to stdout.
//!
//! # Usage
//!
//! ```
//! concord statement add --discussion <ID> --author <ID> "Bike lanes belong downtown"
//! concord vote <STATEMENT> --participant <ID> agree
//! concord list <DISCUSSION> --sort best
//! concord analyze <DISCUSSION>
//! ```
//!
//! Any engine threshold can be overridden from the environment, e.g.
//! `CONCORD_ENGINE__CACHE__REFRESH_VOTE_DELTA=20`.

mod commands;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use concord_analysis::AnalysisCache;
use concord_core::config::EngineConfig;
use concord_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

#[derive(Parser)]
#[command(name = "concord", version, about = "Statements, votes and opinion-group analysis")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "concord.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

/// Shape of the configuration file.
#[derive(Debug, Clone, Deserialize)]
struct CliConfig {
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
  #[serde(default)]
  engine:     EngineConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("concord.db") }

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so stdout stays machine-readable.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("CONCORD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let cfg: CliConfig = settings
    .try_deserialize()
    .context("failed to deserialise configuration")?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_config(cfg.engine.store.clone(), cfg.engine.ranking.clone());

  let cache = AnalysisCache::new(Arc::new(store), cfg.engine);
  let output = commands::run(cli.command, &cache).await?;

  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
