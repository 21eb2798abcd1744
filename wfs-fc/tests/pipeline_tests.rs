//! End-to-end pipeline tests
//!
//! Each test stands in for the external ingestion pipeline by provisioning a
//! curated table in a scratch database, then drives the orchestrator against
//! it and inspects the feature table the way a downstream consumer would.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;
use wfs_common::db::init_database;
use wfs_common::time::format_ts;
use wfs_fc::db::features::{count_feature_rows, load_feature_rows};
use wfs_fc::{Error, Orchestrator, PipelineConfig, Stage};

const FEATURES: [&str; 7] = [
    "temp_out",
    "out_hum",
    "bar",
    "wind_speed",
    "rain_rate",
    "solar_rad",
    "uv_index",
];

fn feature_names() -> Vec<String> {
    FEATURES.iter().map(|s| s.to_string()).collect()
}

fn test_config(k: usize, model_version: &str) -> PipelineConfig {
    PipelineConfig {
        features: feature_names(),
        k,
        model_version: model_version.to_string(),
        seed: 42,
        from: None,
        until: None,
    }
}

async fn setup_db() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&dir.path().join("wfs.db"))
        .await
        .expect("Failed to init database");

    sqlx::query(
        r#"
        CREATE TABLE weather_curated (
            ts TEXT PRIMARY KEY,
            temp_out REAL,
            out_hum REAL,
            bar REAL,
            wind_speed REAL,
            rain_rate REAL,
            solar_rad REAL,
            uv_index REAL
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create curated table");

    (dir, pool)
}

fn ts(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(30 * i as i64)
}

/// Varied but deterministic synthetic sensor values.
fn synthetic_values(i: usize) -> [f64; 7] {
    let x = i as f64;
    [
        10.0 + 8.0 * (x * 0.3).sin(),
        60.0 + 20.0 * (x * 0.17).cos(),
        1010.0 + 3.0 * (x * 0.05).sin(),
        5.0 + 4.0 * (x * 0.23 + 1.0).sin(),
        (i % 7) as f64 * 0.4,
        300.0 + 250.0 * (x * 0.11).sin(),
        2.0 + (i % 5) as f64,
    ]
}

async fn insert_observation(pool: &SqlitePool, when: DateTime<Utc>, values: [Option<f64>; 7]) {
    let mut query = sqlx::query(
        "INSERT INTO weather_curated \
         (ts, temp_out, out_hum, bar, wind_speed, rain_rate, solar_rad, uv_index) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(format_ts(&when));
    for value in values {
        query = query.bind(value);
    }
    query.execute(pool).await.expect("Failed to insert observation");
}

async fn seed_curated(pool: &SqlitePool, rows: usize) {
    for i in 0..rows {
        insert_observation(pool, ts(i), synthetic_values(i).map(Some)).await;
    }
}

#[tokio::test]
async fn test_full_run_writes_one_feature_row_per_observation() {
    let (_dir, pool) = setup_db().await;
    seed_curated(&pool, 100).await;

    let orchestrator = Orchestrator::new(pool.clone(), test_config(4, "v1"));
    let summary = orchestrator.run().await.expect("pipeline failed");

    assert_eq!(summary.rows_loaded, 100);
    assert_eq!(summary.rows_written, 100);
    assert_eq!(summary.schema_version, 1);
    assert!(summary.silhouette.is_some());
    assert!(summary.explained_variance_ratio.iter().all(|r| r.is_finite()));

    let rows = load_feature_rows(&pool, &feature_names()).await.unwrap();
    assert_eq!(rows.len(), 100);
    for row in &rows {
        assert!((0..4).contains(&row.cluster_label));
        assert!(row.projection.iter().all(|c| c.is_finite()));
        assert_eq!(row.model_version, "v1");
        assert!(row
            .standardized
            .iter()
            .all(|v| v.map(f64::is_finite) == Some(true)));
    }
}

#[tokio::test]
async fn test_rerun_with_new_version_replaces_rows_in_place() {
    let (_dir, pool) = setup_db().await;
    seed_curated(&pool, 100).await;

    Orchestrator::new(pool.clone(), test_config(4, "v1"))
        .run()
        .await
        .expect("first run failed");
    Orchestrator::new(pool.clone(), test_config(4, "v2"))
        .run()
        .await
        .expect("second run failed");

    // Still exactly one row per timestamp, all re-tagged
    assert_eq!(count_feature_rows(&pool).await.unwrap(), 100);
    let rows = load_feature_rows(&pool, &feature_names()).await.unwrap();
    assert!(rows.iter().all(|row| row.model_version == "v2"));
}

#[tokio::test]
async fn test_identical_runs_are_deterministic() {
    let (_dir, pool) = setup_db().await;
    seed_curated(&pool, 80).await;

    Orchestrator::new(pool.clone(), test_config(4, "v1"))
        .run()
        .await
        .expect("first run failed");
    let first = load_feature_rows(&pool, &feature_names()).await.unwrap();

    Orchestrator::new(pool.clone(), test_config(4, "v1"))
        .run()
        .await
        .expect("second run failed");
    let second = load_feature_rows(&pool, &feature_names()).await.unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.ts, b.ts);
        assert_eq!(a.projection, b.projection);
        assert_eq!(a.cluster_label, b.cluster_label);
        assert_eq!(a.standardized, b.standardized);
    }
}

#[tokio::test]
async fn test_gaps_are_closed_before_modeling() {
    let (_dir, pool) = setup_db().await;
    for i in 0..30 {
        let mut values = synthetic_values(i).map(Some);
        // Punch holes into two columns, including a leading gap
        if i < 3 {
            values[0] = None;
        }
        if i % 5 == 0 {
            values[5] = None;
        }
        insert_observation(&pool, ts(i), values).await;
    }

    Orchestrator::new(pool.clone(), test_config(3, "v1"))
        .run()
        .await
        .expect("pipeline failed");

    let rows = load_feature_rows(&pool, &feature_names()).await.unwrap();
    assert_eq!(rows.len(), 30);
    for row in &rows {
        assert!(row
            .standardized
            .iter()
            .all(|v| v.map(f64::is_finite) == Some(true)));
    }
}

#[tokio::test]
async fn test_empty_curated_store_aborts_in_validate() {
    let (_dir, pool) = setup_db().await;

    let failure = Orchestrator::new(pool.clone(), test_config(4, "v1"))
        .run()
        .await
        .expect_err("empty input must abort");

    assert_eq!(failure.stage, Stage::Validate);
    assert!(matches!(failure.source, Error::EmptyInput));

    // Nothing may have been provisioned or written
    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'weather_features'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(tables, 0);
}

#[tokio::test]
async fn test_fully_missing_column_aborts_before_writing() {
    let (_dir, pool) = setup_db().await;
    for i in 0..20 {
        let mut values = synthetic_values(i).map(Some);
        values[5] = None; // solar_rad never reports
        insert_observation(&pool, ts(i), values).await;
    }

    let failure = Orchestrator::new(pool.clone(), test_config(4, "v1"))
        .run()
        .await
        .expect_err("degenerate column must abort");

    assert_eq!(failure.stage, Stage::Validate);
    match &failure.source {
        Error::DegenerateFeature { column, .. } => assert_eq!(column, "solar_rad"),
        other => panic!("expected DegenerateFeature, got {:?}", other),
    }

    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'weather_features'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(tables, 0);
}

#[tokio::test]
async fn test_constant_column_aborts_in_standardize() {
    let (_dir, pool) = setup_db().await;
    for i in 0..20 {
        let mut values = synthetic_values(i).map(Some);
        values[4] = Some(0.0); // rain_rate flatlines
        insert_observation(&pool, ts(i), values).await;
    }

    let failure = Orchestrator::new(pool.clone(), test_config(4, "v1"))
        .run()
        .await
        .expect_err("constant column must abort");

    assert_eq!(failure.stage, Stage::Standardize);
    match &failure.source {
        Error::DegenerateFeature { column, .. } => assert_eq!(column, "rain_rate"),
        other => panic!("expected DegenerateFeature, got {:?}", other),
    }
    assert!(count_feature_rows(&pool).await.is_err() || count_feature_rows(&pool).await.unwrap() == 0);
}

#[tokio::test]
async fn test_range_bounded_run_leaves_other_rows_untouched() {
    let (_dir, pool) = setup_db().await;
    seed_curated(&pool, 40).await;

    Orchestrator::new(pool.clone(), test_config(3, "v1"))
        .run()
        .await
        .expect("full run failed");

    // Recompute only the later half under a new tag
    let mut config = test_config(3, "v2");
    config.from = Some(ts(20));
    Orchestrator::new(pool.clone(), config)
        .run()
        .await
        .expect("bounded run failed");

    let rows = load_feature_rows(&pool, &feature_names()).await.unwrap();
    assert_eq!(rows.len(), 40);
    for (i, row) in rows.iter().enumerate() {
        let expected = if i < 20 { "v1" } else { "v2" };
        assert_eq!(row.model_version, expected, "row {}", i);
    }
}

#[tokio::test]
async fn test_unparseable_timestamps_are_dropped_not_fatal() {
    let (_dir, pool) = setup_db().await;
    seed_curated(&pool, 10).await;
    sqlx::query(
        "INSERT INTO weather_curated (ts, temp_out, out_hum, bar, wind_speed, rain_rate, solar_rad, uv_index) \
         VALUES ('03/01/2024 00:00', 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let summary = Orchestrator::new(pool.clone(), test_config(2, "v1"))
        .run()
        .await
        .expect("pipeline failed");

    assert_eq!(summary.rows_loaded, 10);
    assert_eq!(count_feature_rows(&pool).await.unwrap(), 10);
}
