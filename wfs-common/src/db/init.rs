//! Database initialization
//!
//! Opens (creating if missing) the WFS SQLite database and bootstraps the
//! tables this system owns. The curated observation table is provisioned by
//! the external ingestion pipeline and is deliberately not created here.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create owned tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL keeps the dashboard readable while a run is writing
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_feature_schema_table(&pool).await?;

    Ok(pool)
}

/// Create the feature_schema registry table
///
/// Records every feature-column set the pipeline has applied to the feature
/// table as an integer schema version. The schema version is distinct from
/// the free-text model version tag written on each feature row: the former
/// names the column shape of the table, the latter names the feature-set /
/// algorithm configuration of one run.
pub async fn create_feature_schema_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feature_schema (
            schema_version INTEGER PRIMARY KEY,
            feature_columns TEXT NOT NULL,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
