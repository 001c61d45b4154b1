//! bias-tagger server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store and serves the tagging API over HTTP. The `ingest` and `reset`
//! subcommands manage the catalog offline.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tagger_core::rotation::{RetirementPolicy, RotationEngine};
use tagger_server::{ServerConfig, expand_tilde, ingest_file, seed_if_empty};
use tagger_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Bias tagger image rotation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (default).
  Serve,
  /// Add images from a JSON array of records.
  Ingest {
    /// Path to the JSON file.
    file: PathBuf,
  },
  /// Delete every image, session, view and tag.
  Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg =
    ServerConfig::load(&cli.config).context("failed to load configuration")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let engine = RotationEngine::new(Arc::new(store))
    .with_policy(RetirementPolicy::new(server_cfg.retirement_threshold));

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(engine, &server_cfg).await,
    Command::Ingest { file } => {
      let report = ingest_file(&engine, &file).await?;
      println!(
        "inserted {}, duplicates {}, rejected {}",
        report.inserted,
        report.duplicates,
        report.rejected.len()
      );
      for rejection in &report.rejected {
        println!("  #{}: {}", rejection.index, rejection.reason);
      }
      Ok(())
    }
    Command::Reset => {
      engine.store().clear().await.context("failed to clear store")?;
      println!("store at {store_path:?} cleared");
      Ok(())
    }
  }
}

async fn serve(
  engine: RotationEngine<SqliteStore>,
  server_cfg: &ServerConfig,
) -> anyhow::Result<()> {
  if let Some(seed) = &server_cfg.seed_path {
    let seed = expand_tilde(seed);
    if let Some(report) = seed_if_empty(&engine, &seed).await? {
      tracing::info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        rejected = report.rejected.len(),
        "seeded catalog"
      );
    }
  }

  let active = engine.count_active().await?;
  tracing::info!(active, "catalog ready");

  let app = tagger_server::router(engine, server_cfg);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
