//! Batch pipeline orchestration
//!
//! One invocation advances through
//! LOAD → VALIDATE → CLEAN → STANDARDIZE → PROJECT → CLUSTER → PERSIST → REPORT.
//! A failure in LOAD or VALIDATE aborts before anything touches the feature
//! table; a failure in any later stage aborts the run and leaves prior runs'
//! rows exactly as they were. The store is never rolled back, only never
//! written to for a failed run.

use crate::analysis::standardizer::Standardizer;
use crate::analysis::{cleaner, clusterer, projector};
use crate::config::PipelineConfig;
use crate::db::curated::{self, Observation};
use crate::db::features::{self, FeatureRecord};
use crate::error::Error;
use sqlx::SqlitePool;
use std::fmt;
use tracing::info;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Validate,
    Clean,
    Standardize,
    Project,
    Cluster,
    Persist,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "LOAD",
            Stage::Validate => "VALIDATE",
            Stage::Clean => "CLEAN",
            Stage::Standardize => "STANDARDIZE",
            Stage::Project => "PROJECT",
            Stage::Cluster => "CLUSTER",
            Stage::Persist => "PERSIST",
            Stage::Report => "REPORT",
        };
        f.write_str(name)
    }
}

/// A pipeline run failure, tagged with the stage that raised it.
#[derive(Debug, thiserror::Error)]
#[error("pipeline aborted in {stage} stage: {source}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

fn stage_err(stage: Stage) -> impl FnOnce(Error) -> PipelineFailure {
    move |source| PipelineFailure { stage, source }
}

/// Operator-facing result of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub rows_loaded: usize,
    pub rows_written: usize,
    pub explained_variance_ratio: [f64; 3],
    pub silhouette: Option<f64>,
    pub k: usize,
    pub model_version: String,
    pub schema_version: i64,
}

impl RunSummary {
    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "{} curated rows in, {} feature rows written",
                self.rows_loaded, self.rows_written
            ),
            format!(
                "variance explained: pc1 {:.4}, pc2 {:.4}, pc3 {:.4}",
                self.explained_variance_ratio[0],
                self.explained_variance_ratio[1],
                self.explained_variance_ratio[2]
            ),
            format!(
                "regimes: k={}, model_version={}, schema v{}",
                self.k, self.model_version, self.schema_version
            ),
        ];
        if let Some(silhouette) = self.silhouette {
            lines.push(format!("silhouette score: {:.4}", silhouette));
        }
        lines
    }
}

/// Sequences the pipeline stages over one database.
pub struct Orchestrator {
    pool: SqlitePool,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Create an orchestrator for one configured run.
    ///
    /// The configuration is captured here and never re-read from process
    /// state, so differently-configured orchestrators can coexist.
    pub fn new(pool: SqlitePool, config: PipelineConfig) -> Self {
        Self { pool, config }
    }

    /// Run the batch to completion and report the summary.
    pub async fn run(&self) -> Result<RunSummary, PipelineFailure> {
        info!("stage LOAD: reading curated observations");
        let observations = curated::load_observations(
            &self.pool,
            &self.config.features,
            self.config.from.as_ref(),
            self.config.until.as_ref(),
        )
        .await
        .map_err(stage_err(Stage::Load))?;
        let rows_loaded = observations.len();

        info!("stage VALIDATE: {} observations", rows_loaded);
        self.validate(&observations).map_err(stage_err(Stage::Validate))?;

        info!("stage CLEAN: closing gaps");
        let cleaned =
            cleaner::clean(observations, &self.config.features).map_err(stage_err(Stage::Clean))?;

        info!("stage STANDARDIZE: rescaling {} columns", self.config.features.len());
        let standardizer = Standardizer::fit(&cleaned.rows, &self.config.features)
            .map_err(stage_err(Stage::Standardize))?;
        let standardized = standardizer.transform(&cleaned.rows);

        info!("stage PROJECT: fitting 3-axis projection");
        let projection = projector::project(&standardized).map_err(stage_err(Stage::Project))?;

        info!("stage CLUSTER: k={}", self.config.k);
        let clustering = clusterer::cluster(&projection.coordinates, self.config.k, self.config.seed)
            .map_err(stage_err(Stage::Cluster))?;

        info!("stage PERSIST: upserting {} feature rows", rows_loaded);
        let schema_version = features::ensure_feature_schema(&self.pool, &self.config.features)
            .await
            .map_err(stage_err(Stage::Persist))?;

        let records: Vec<FeatureRecord> = cleaned
            .timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| FeatureRecord {
                ts: *ts,
                standardized: standardized[i].clone(),
                projection: projection.coordinates[i],
                cluster_label: clustering.labels[i] as i64,
                model_version: self.config.model_version.clone(),
            })
            .collect();

        let rows_written = features::upsert_feature_records(&self.pool, &self.config.features, &records)
            .await
            .map_err(stage_err(Stage::Persist))?;

        let summary = RunSummary {
            rows_loaded,
            rows_written,
            explained_variance_ratio: projection.explained_variance_ratio,
            silhouette: clustering.silhouette,
            k: self.config.k,
            model_version: self.config.model_version.clone(),
            schema_version,
        };

        info!("stage REPORT");
        for line in summary.display_lines() {
            info!("{}", line);
        }

        Ok(summary)
    }

    /// Reject inputs no later stage can recover from, before any write.
    fn validate(&self, observations: &[Observation]) -> Result<(), Error> {
        if observations.is_empty() {
            return Err(Error::EmptyInput);
        }

        for (c, feature) in self.config.features.iter().enumerate() {
            if !observations.iter().any(|o| o.values[c].is_some()) {
                return Err(Error::DegenerateFeature {
                    column: feature.clone(),
                    reason: "all values missing".to_string(),
                });
            }
        }

        Ok(())
    }
}
