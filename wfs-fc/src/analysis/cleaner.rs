//! Gap closing for curated observation columns
//!
//! Missing cells are filled by two-sided linear interpolation over row
//! position: interior gaps take the straight line between the nearest known
//! neighbors, and gaps touching either end of the series carry the nearest
//! known value outward flat. Interpolation is positional: uneven timestamp
//! spacing does not weight the fill.

use crate::db::curated::Observation;
use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Complete observation matrix ready for numeric modeling.
#[derive(Debug, Clone)]
pub struct CleanedMatrix {
    /// Ascending observation timestamps, one per row
    pub timestamps: Vec<DateTime<Utc>>,
    /// Row-major complete matrix, rows parallel to `timestamps`
    pub rows: Vec<Vec<f64>>,
}

/// Sort observations by timestamp and close per-column gaps.
///
/// A column with no known value at all has no interpolation partner and is
/// reported as degenerate before any numeric stage can consume it.
pub fn clean(mut observations: Vec<Observation>, features: &[String]) -> Result<CleanedMatrix> {
    observations.sort_by_key(|o| o.ts);

    let n = observations.len();
    let d = features.len();

    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(n); d];
    for obs in &observations {
        for (c, value) in obs.values.iter().enumerate() {
            columns[c].push(value.filter(|v| v.is_finite()));
        }
    }

    let mut filled_columns = Vec::with_capacity(d);
    for (c, column) in columns.iter().enumerate() {
        let filled = interpolate_column(column).ok_or_else(|| Error::DegenerateFeature {
            column: features[c].clone(),
            reason: "all values missing".to_string(),
        })?;
        filled_columns.push(filled);
    }

    let timestamps = observations.iter().map(|o| o.ts).collect();
    let rows = (0..n)
        .map(|r| filled_columns.iter().map(|col| col[r]).collect())
        .collect();

    Ok(CleanedMatrix { timestamps, rows })
}

/// Two-sided linear interpolation over one column.
///
/// Returns `None` when the column holds no known value.
fn interpolate_column(cells: &[Option<f64>]) -> Option<Vec<f64>> {
    let known: Vec<(usize, f64)> = cells
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    if known.is_empty() {
        return None;
    }

    let mut filled = vec![0.0; cells.len()];
    let (first_idx, first_val) = known[0];
    let (last_idx, last_val) = known[known.len() - 1];

    // Leading and trailing gaps carry the nearest known value outward flat
    for slot in filled.iter_mut().take(first_idx) {
        *slot = first_val;
    }
    for slot in filled.iter_mut().skip(last_idx + 1) {
        *slot = last_val;
    }

    for window in known.windows(2) {
        let (lo_idx, lo_val) = window[0];
        let (hi_idx, hi_val) = window[1];
        filled[lo_idx] = lo_val;
        let span = (hi_idx - lo_idx) as f64;
        for i in lo_idx + 1..hi_idx {
            let t = (i - lo_idx) as f64 / span;
            filled[i] = lo_val + (hi_val - lo_val) * t;
        }
    }
    filled[last_idx] = last_val;

    Some(filled)
}
