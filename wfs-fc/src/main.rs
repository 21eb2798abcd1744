//! wfs-fc - Feature Computation job
//!
//! Batch job that derives standardized features, a 3-axis projection and a
//! regime label for every curated weather observation, and upserts them into
//! the feature table for the dashboard and export tooling to read.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use wfs_common::config;
use wfs_fc::{Orchestrator, PipelineConfig};

/// Command-line surface.
///
/// Options also resolve from the environment and the TOML config file;
/// command line wins, then environment, then file, then compiled default.
#[derive(Debug, Parser)]
#[command(name = "wfs-fc", version, about = "Weather feature computation pipeline")]
struct Cli {
    /// Root folder holding the SQLite database
    #[arg(long, env = "WFS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Database file path (overrides the root-folder default)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Cluster count for the regime clusterer
    #[arg(long, env = "WFS_KMEANS_K")]
    k: Option<usize>,

    /// Model version tag written with every feature row
    #[arg(long, env = "WFS_MODEL_VERSION")]
    model_version: Option<String>,

    /// Inclusive lower bound on observation timestamps (RFC 3339)
    #[arg(long)]
    from: Option<String>,

    /// Inclusive upper bound on observation timestamps (RFC 3339)
    #[arg(long)]
    until: Option<String>,

    /// Directory the external export tool reads from
    #[arg(long, env = "WFS_EXPORT_DIR")]
    export_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting wfs-fc (Feature Computation) v{}", env!("CARGO_PKG_VERSION"));

    let toml_config = config::load_toml_config()?;

    let root_folder = config::resolve_root_folder(cli.root_folder.as_deref(), &toml_config);
    config::ensure_root_folder(&root_folder)?;

    let db_path = cli
        .database
        .clone()
        .unwrap_or_else(|| config::database_path(&root_folder));
    info!("Database: {}", db_path.display());

    let pool = wfs_common::db::init_database(&db_path).await?;

    let pipeline_config = PipelineConfig::resolve(
        cli.k,
        cli.model_version.clone(),
        cli.from.as_deref(),
        cli.until.as_deref(),
        &toml_config,
    )?;
    info!(
        "Run configuration: k={}, model_version={}, {} feature column(s)",
        pipeline_config.k,
        pipeline_config.model_version,
        pipeline_config.features.len()
    );

    // The export directory is only consumed by external tooling; surface it
    // so operators can see which directory that tooling will read
    if let Some(dir) = cli
        .export_dir
        .or_else(|| toml_config.export_dir.as_ref().map(PathBuf::from))
    {
        info!("Export directory (read by external tooling): {}", dir.display());
    }

    let orchestrator = Orchestrator::new(pool, pipeline_config);
    if let Err(failure) = orchestrator.run().await {
        error!("{}", failure);
        return Err(failure.into());
    }

    Ok(())
}
