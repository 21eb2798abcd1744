//! Curated observation store reader
//!
//! The curated table is owned by the external ingestion pipeline; this
//! module only issues one ordered, optionally range-bounded read per run.

use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use wfs_common::time::{format_ts, parse_ts};

/// One curated observation: timestamp plus the configured feature values in
/// declaration order. `None` marks a missing or non-numeric cell.
#[derive(Debug, Clone)]
pub struct Observation {
    pub ts: DateTime<Utc>,
    pub values: Vec<Option<f64>>,
}

/// Load observations in ascending timestamp order.
///
/// Rows whose timestamp fails to parse are dropped individually rather than
/// failing the batch; a failure of the query itself is fatal. Feature cells
/// that are not numeric read as missing.
pub async fn load_observations(
    pool: &SqlitePool,
    features: &[String],
    from: Option<&DateTime<Utc>>,
    until: Option<&DateTime<Utc>>,
) -> Result<Vec<Observation>> {
    let columns = features
        .iter()
        .map(|f| format!("\"{}\"", f))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT ts, {} FROM weather_curated", columns);
    let mut clauses = Vec::new();
    if from.is_some() {
        clauses.push("ts >= ?");
    }
    if until.is_some() {
        clauses.push("ts <= ?");
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY ts ASC");

    let mut query = sqlx::query(&sql);
    if let Some(from) = from {
        query = query.bind(format_ts(from));
    }
    if let Some(until) = until {
        query = query.bind(format_ts(until));
    }

    let rows = query.fetch_all(pool).await?;

    let mut observations = Vec::with_capacity(rows.len());
    for row in rows {
        let ts_text: Option<String> = row.try_get(0).ok();
        let Some(ts) = ts_text.as_deref().and_then(parse_ts) else {
            debug!("Dropping curated row with unparseable timestamp: {:?}", ts_text);
            continue;
        };

        let values = (0..features.len())
            .map(|i| row.try_get::<f64, _>(i + 1).ok().filter(|v| v.is_finite()))
            .collect();

        observations.push(Observation { ts, values });
    }

    Ok(observations)
}
