//! Pipeline configuration resolution
//!
//! Options resolve command line / environment → TOML config file → compiled
//! default, and land in one [`PipelineConfig`] value that is passed into the
//! orchestrator at construction. The pipeline stages themselves never
//! consult process state, so differently-configured runs can coexist in one
//! process (and under test) without interference.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use wfs_common::config::TomlConfig;
use wfs_common::time::parse_ts;

/// Default curated columns used by the model run
pub const DEFAULT_FEATURES: [&str; 7] = [
    "temp_out",
    "out_hum",
    "bar",
    "wind_speed",
    "rain_rate",
    "solar_rad",
    "uv_index",
];

/// Default cluster count
pub const DEFAULT_K: usize = 4;

/// Default model version tag
pub const DEFAULT_MODEL_VERSION: &str = "pca3_kmeans_v1";

/// Default seed for centroid initialization
pub const DEFAULT_SEED: u64 = 42;

/// Resolved configuration for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Curated feature columns, in declaration order
    pub features: Vec<String>,
    /// Cluster count k
    pub k: usize,
    /// Free-text model version tag written with every feature row
    pub model_version: String,
    /// Seed for centroid initialization
    pub seed: u64,
    /// Inclusive lower bound on observation timestamps
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on observation timestamps
    pub until: Option<DateTime<Utc>>,
}

impl PipelineConfig {
    /// Resolve configuration from CLI/environment values and the TOML layer.
    ///
    /// `k` and `model_version` arrive already folded with their environment
    /// variables by the CLI parser; this only adds the TOML and default
    /// tiers. Timestamp bounds are CLI-only.
    pub fn resolve(
        k: Option<usize>,
        model_version: Option<String>,
        from: Option<&str>,
        until: Option<&str>,
        toml: &TomlConfig,
    ) -> Result<Self> {
        let features = toml
            .features
            .clone()
            .unwrap_or_else(|| DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect());

        let config = Self {
            features,
            k: k.or(toml.kmeans_k).unwrap_or(DEFAULT_K),
            model_version: model_version
                .or_else(|| toml.model_version.clone())
                .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string()),
            seed: toml.seed.unwrap_or(DEFAULT_SEED),
            from: parse_bound(from, "--from")?,
            until: parse_bound(until, "--until")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.k < 1 {
            return Err(Error::Config("cluster count k must be at least 1".into()));
        }

        if self.features.len() < 3 {
            return Err(Error::Config(format!(
                "a 3-axis projection requires at least 3 feature columns, got {}",
                self.features.len()
            )));
        }

        for name in &self.features {
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(Error::Config(format!(
                    "feature name '{}' is not a valid column identifier",
                    name
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.features {
            if !seen.insert(name) {
                return Err(Error::Config(format!(
                    "feature '{}' is declared more than once",
                    name
                )));
            }
        }

        if self.model_version.trim().is_empty() {
            return Err(Error::Config("model version tag must not be empty".into()));
        }

        if let (Some(from), Some(until)) = (&self.from, &self.until) {
            if from > until {
                return Err(Error::Config(
                    "time range lower bound is after the upper bound".into(),
                ));
            }
        }

        Ok(())
    }
}

fn parse_bound(text: Option<&str>, flag: &str) -> Result<Option<DateTime<Utc>>> {
    match text {
        None => Ok(None),
        Some(raw) => parse_ts(raw).map(Some).ok_or_else(|| {
            Error::Config(format!("{} is not a valid RFC 3339 timestamp: '{}'", flag, raw))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let config =
            PipelineConfig::resolve(None, None, None, None, &TomlConfig::default()).unwrap();

        assert_eq!(config.k, DEFAULT_K);
        assert_eq!(config.model_version, DEFAULT_MODEL_VERSION);
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.features.len(), 7);
        assert_eq!(config.features[0], "temp_out");
        assert!(config.from.is_none());
        assert!(config.until.is_none());
    }

    #[test]
    fn test_resolve_toml_layer() {
        let toml = TomlConfig {
            kmeans_k: Some(6),
            model_version: Some("pca3_kmeans_v2".to_string()),
            seed: Some(7),
            features: Some(vec![
                "temp_out".to_string(),
                "out_hum".to_string(),
                "bar".to_string(),
            ]),
            ..Default::default()
        };

        let config = PipelineConfig::resolve(None, None, None, None, &toml).unwrap();
        assert_eq!(config.k, 6);
        assert_eq!(config.model_version, "pca3_kmeans_v2");
        assert_eq!(config.seed, 7);
        assert_eq!(config.features.len(), 3);
    }

    #[test]
    fn test_resolve_cli_beats_toml() {
        let toml = TomlConfig {
            kmeans_k: Some(6),
            model_version: Some("from_toml".to_string()),
            ..Default::default()
        };

        let config =
            PipelineConfig::resolve(Some(3), Some("from_cli".to_string()), None, None, &toml)
                .unwrap();
        assert_eq!(config.k, 3);
        assert_eq!(config.model_version, "from_cli");
    }

    #[test]
    fn test_resolve_parses_time_bounds() {
        let config = PipelineConfig::resolve(
            None,
            None,
            Some("2024-03-01T00:00:00Z"),
            Some("2024-03-02T00:00:00Z"),
            &TomlConfig::default(),
        )
        .unwrap();

        assert!(config.from.unwrap() < config.until.unwrap());
    }

    #[test]
    fn test_resolve_rejects_bad_timestamp() {
        let err = PipelineConfig::resolve(
            None,
            None,
            Some("yesterday"),
            None,
            &TomlConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_k() {
        let err =
            PipelineConfig::resolve(Some(0), None, None, None, &TomlConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_too_few_features() {
        let toml = TomlConfig {
            features: Some(vec!["temp_out".to_string(), "out_hum".to_string()]),
            ..Default::default()
        };
        let err = PipelineConfig::resolve(None, None, None, None, &toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_duplicate_feature() {
        let toml = TomlConfig {
            features: Some(vec![
                "temp_out".to_string(),
                "temp_out".to_string(),
                "bar".to_string(),
            ]),
            ..Default::default()
        };
        let err = PipelineConfig::resolve(None, None, None, None, &toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_unsafe_column_name() {
        let toml = TomlConfig {
            features: Some(vec![
                "temp_out".to_string(),
                "out_hum".to_string(),
                "bar; DROP TABLE".to_string(),
            ]),
            ..Default::default()
        };
        let err = PipelineConfig::resolve(None, None, None, None, &toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let err = PipelineConfig::resolve(
            None,
            None,
            Some("2024-03-02T00:00:00Z"),
            Some("2024-03-01T00:00:00Z"),
            &TomlConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
