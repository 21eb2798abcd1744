//! Column standardization
//!
//! Each feature column is rescaled to zero mean and unit variance using the
//! population standard deviation, so no single sensor dominates the
//! distance-based stages downstream. A constant column cannot be rescaled
//! and aborts the run: rescuing it with an epsilon would feed a meaningless
//! axis into projection and clustering without anyone noticing.

use crate::{Error, Result};

/// Per-column fit parameters.
#[derive(Debug, Clone)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Standardizer {
    /// Fit on a complete n×d matrix.
    ///
    /// Errors when the matrix is empty or a column's population standard
    /// deviation is zero.
    pub fn fit(rows: &[Vec<f64>], features: &[String]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::EmptyInput);
        }
        let n = rows.len() as f64;
        let d = features.len();

        let mut means = vec![0.0; d];
        for row in rows {
            for (c, value) in row.iter().enumerate() {
                means[c] += value;
            }
        }
        for mean in &mut means {
            *mean /= n;
        }

        let mut stds = vec![0.0; d];
        for row in rows {
            for (c, value) in row.iter().enumerate() {
                let dev = value - means[c];
                stds[c] += dev * dev;
            }
        }
        for (c, std) in stds.iter_mut().enumerate() {
            *std = (*std / n).sqrt();
            if *std == 0.0 {
                return Err(Error::DegenerateFeature {
                    column: features[c].clone(),
                    reason: "zero variance after cleaning".to_string(),
                });
            }
        }

        Ok(Self { means, stds })
    }

    /// Rescale every cell to `(value - mean) / std`.
    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(c, value)| (value - self.means[c]) / self.stds[c])
                    .collect()
            })
            .collect()
    }
}
