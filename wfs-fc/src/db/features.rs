//! Feature store writer and consumer read
//!
//! The feature table is keyed by observation timestamp: one row per
//! timestamp, overwritten in place when a later run recomputes it. The
//! column shape of the table (one `f_<feature>` column per declared feature)
//! is registered in the `feature_schema` table as an integer schema version,
//! and changing the configured feature set is a checked, additive operation:
//! new features gain nullable columns, removed features keep their legacy
//! columns.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;
use wfs_common::time::{format_ts, parse_ts};

/// One derived feature row, keyed by the source observation timestamp.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub ts: DateTime<Utc>,
    /// Standardized value per declared feature, in declaration order
    pub standardized: Vec<f64>,
    /// Projection coordinates
    pub projection: [f64; 3],
    /// Regime cluster id in `[0, k)`
    pub cluster_label: i64,
    /// Free-text tag naming the feature-set / algorithm configuration
    pub model_version: String,
}

/// Feature row as read back by consumers, in ascending timestamp order.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub ts: DateTime<Utc>,
    /// Standardized values for the requested features; `None` for columns
    /// the producing run did not fill (legacy or later-added features)
    pub standardized: Vec<Option<f64>>,
    pub projection: [f64; 3],
    pub cluster_label: i64,
    pub model_version: String,
    pub computed_at: String,
}

fn feature_column(name: &str) -> String {
    format!("f_{}", name)
}

/// Register the configured feature set and synchronize the table columns.
///
/// Returns the active schema version. A first run creates the table and
/// registers version 1; a run with new features adds their columns as
/// nullable REALs and registers the next version. Runs whose feature set
/// matches the registered one leave the registry untouched.
pub async fn ensure_feature_schema(pool: &SqlitePool, features: &[String]) -> Result<i64> {
    wfs_common::db::create_feature_schema_table(pool).await?;

    let current: Option<(i64, String)> = sqlx::query_as(
        "SELECT schema_version, feature_columns FROM feature_schema ORDER BY schema_version DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    let Some((version, columns_json)) = current else {
        create_features_table(pool, features).await?;
        register_schema_version(pool, 1, features).await?;
        info!("Registered feature schema v1 ({} feature columns)", features.len());
        return Ok(1);
    };

    let known: Vec<String> = serde_json::from_str(&columns_json)
        .map_err(|e| wfs_common::Error::Internal(format!("corrupt feature_schema row: {}", e)))?;

    // Table may predate this process; creation is idempotent either way
    create_features_table(pool, &known).await?;

    if known == features {
        return Ok(version);
    }

    let added: Vec<&String> = features.iter().filter(|f| !known.contains(*f)).collect();

    for feature in &added {
        let sql = format!(
            "ALTER TABLE weather_features ADD COLUMN \"{}\" REAL",
            feature_column(feature)
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    let next = version + 1;
    register_schema_version(pool, next, features).await?;
    info!(
        "Feature schema evolved to v{}: {} new column(s), {} column(s) now declared",
        next,
        added.len(),
        features.len()
    );
    Ok(next)
}

async fn create_features_table(pool: &SqlitePool, features: &[String]) -> Result<()> {
    let feature_columns = features
        .iter()
        .map(|f| format!("            \"{}\" REAL,\n", feature_column(f)))
        .collect::<String>();

    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS weather_features (
            ts TEXT PRIMARY KEY,
{}            pc1 REAL NOT NULL,
            pc2 REAL NOT NULL,
            pc3 REAL NOT NULL,
            cluster_label INTEGER NOT NULL,
            model_version TEXT NOT NULL,
            computed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        feature_columns
    );
    sqlx::query(&sql).execute(pool).await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_weather_features_model_version ON weather_features(model_version)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn register_schema_version(pool: &SqlitePool, version: i64, features: &[String]) -> Result<()> {
    let columns_json = serde_json::to_string(features)
        .map_err(|e| wfs_common::Error::Internal(format!("encode feature columns: {}", e)))?;

    sqlx::query("INSERT INTO feature_schema (schema_version, feature_columns) VALUES (?, ?)")
        .bind(version)
        .bind(columns_json)
        .execute(pool)
        .await?;

    Ok(())
}

/// Upsert one run's feature records, keyed by timestamp.
///
/// Every record is validated against the declared column set before anything
/// is written; a shape mismatch rejects the whole batch. The writes
/// themselves run inside a single transaction, so a failure partway through
/// leaves no mix of old and new values for any timestamp. Timestamps outside
/// the batch are untouched.
pub async fn upsert_feature_records(
    pool: &SqlitePool,
    features: &[String],
    records: &[FeatureRecord],
) -> Result<usize> {
    for record in records {
        if record.standardized.len() != features.len() {
            return Err(Error::RowShape {
                ts: format_ts(&record.ts),
                expected: features.len(),
                actual: record.standardized.len(),
            });
        }
    }

    let feature_columns: Vec<String> = features.iter().map(|f| feature_column(f)).collect();

    let insert_columns = feature_columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; features.len() + 6].join(", ");
    let updates = feature_columns
        .iter()
        .map(|c| format!("\"{}\" = excluded.\"{}\"", c, c))
        .collect::<Vec<_>>()
        .join(",\n            ");

    let sql = format!(
        r#"
        INSERT INTO weather_features (
            ts, {}, pc1, pc2, pc3, cluster_label, model_version, computed_at
        ) VALUES ({}, CURRENT_TIMESTAMP)
        ON CONFLICT(ts) DO UPDATE SET
            {},
            pc1 = excluded.pc1,
            pc2 = excluded.pc2,
            pc3 = excluded.pc3,
            cluster_label = excluded.cluster_label,
            model_version = excluded.model_version,
            computed_at = CURRENT_TIMESTAMP
        "#,
        insert_columns, placeholders, updates
    );

    let mut tx = pool.begin().await?;
    for record in records {
        let mut query = sqlx::query(&sql).bind(format_ts(&record.ts));
        for value in &record.standardized {
            query = query.bind(*value);
        }
        query = query
            .bind(record.projection[0])
            .bind(record.projection[1])
            .bind(record.projection[2])
            .bind(record.cluster_label)
            .bind(&record.model_version);
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;

    Ok(records.len())
}

/// Read feature rows back in ascending timestamp order (consumer view).
pub async fn load_feature_rows(pool: &SqlitePool, features: &[String]) -> Result<Vec<FeatureRow>> {
    let feature_columns = features
        .iter()
        .map(|f| format!("\"{}\"", feature_column(f)))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "SELECT ts, {}, pc1, pc2, pc3, cluster_label, model_version, computed_at \
         FROM weather_features ORDER BY ts ASC",
        feature_columns
    );

    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let ts_text: String = row.try_get("ts")?;
        let ts = parse_ts(&ts_text).ok_or_else(|| {
            wfs_common::Error::Internal(format!("unparseable feature row timestamp: {}", ts_text))
        })?;

        let d = features.len();
        let standardized = (0..d).map(|i| row.try_get::<f64, _>(i + 1).ok()).collect();

        out.push(FeatureRow {
            ts,
            standardized,
            projection: [
                row.try_get(d + 1)?,
                row.try_get(d + 2)?,
                row.try_get(d + 3)?,
            ],
            cluster_label: row.try_get(d + 4)?,
            model_version: row.try_get(d + 5)?,
            computed_at: row.try_get(d + 6)?,
        });
    }

    Ok(out)
}

/// Total feature rows currently stored.
pub async fn count_feature_rows(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM weather_features")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
