//! Fixed-rank variance-preserving projection
//!
//! Principal component analysis of the standardized matrix: the d×d
//! covariance matrix is eigendecomposed with cyclic Jacobi rotations and
//! every row is projected onto the three leading orthonormal eigenvectors.
//! Each axis is oriented so its largest-magnitude loading is positive, which
//! pins the otherwise arbitrary eigenvector sign. The whole computation is
//! closed-form and seedless, so repeated runs on identical input produce
//! identical coordinates.

use crate::{Error, Result};

/// Number of projection axes produced per row.
pub const PROJECTION_RANK: usize = 3;

/// Sweeps cap for the Jacobi eigendecomposition. Small symmetric matrices
/// converge in well under ten sweeps; hitting the cap still yields a usable
/// near-diagonal result.
const MAX_SWEEPS: usize = 50;

/// Fitted projection of one run.
#[derive(Debug, Clone)]
pub struct Projection {
    /// Projected coordinates, one `[pc1, pc2, pc3]` triple per input row
    pub coordinates: Vec<[f64; 3]>,
    /// The three projection axes (unit loading vectors of length d)
    pub components: Vec<Vec<f64>>,
    /// Fraction of total variance captured by each axis
    pub explained_variance_ratio: [f64; 3],
}

/// Project standardized rows onto the three leading principal axes.
///
/// Fails with a configuration error when fewer than three feature columns
/// are available; the rank is never silently reduced.
pub fn project(rows: &[Vec<f64>]) -> Result<Projection> {
    if rows.is_empty() {
        return Err(Error::EmptyInput);
    }
    let d = rows[0].len();
    if d < PROJECTION_RANK {
        return Err(Error::Config(format!(
            "projection requires at least {} feature columns, got {}",
            PROJECTION_RANK, d
        )));
    }

    let cov = covariance(rows, d);
    let (eigenvalues, eigenvectors) = jacobi_eigen(cov, d);

    // Order axes by descending captured variance; tie-break on axis index so
    // the ordering is total and stable
    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let total: f64 = eigenvalues.iter().map(|v| v.max(0.0)).sum();

    let mut components = Vec::with_capacity(PROJECTION_RANK);
    let mut explained_variance_ratio = [0.0; PROJECTION_RANK];
    for (axis, &col) in order.iter().take(PROJECTION_RANK).enumerate() {
        let mut component: Vec<f64> = (0..d).map(|r| eigenvectors[r][col]).collect();
        orient(&mut component);
        components.push(component);
        if total > 0.0 {
            explained_variance_ratio[axis] = eigenvalues[col].max(0.0) / total;
        }
    }

    let coordinates = rows
        .iter()
        .map(|row| {
            let mut point = [0.0; PROJECTION_RANK];
            for (axis, component) in components.iter().enumerate() {
                point[axis] = row.iter().zip(component).map(|(x, w)| x * w).sum();
            }
            point
        })
        .collect();

    Ok(Projection {
        coordinates,
        components,
        explained_variance_ratio,
    })
}

/// Population covariance of the row matrix.
fn covariance(rows: &[Vec<f64>], d: usize) -> Vec<Vec<f64>> {
    let n = rows.len() as f64;

    let mut means = vec![0.0; d];
    for row in rows {
        for (c, value) in row.iter().enumerate() {
            means[c] += value;
        }
    }
    for mean in &mut means {
        *mean /= n;
    }

    let mut cov = vec![vec![0.0; d]; d];
    for row in rows {
        for i in 0..d {
            let dev_i = row[i] - means[i];
            for j in i..d {
                cov[i][j] += dev_i * (row[j] - means[j]);
            }
        }
    }
    for i in 0..d {
        for j in i..d {
            cov[i][j] /= n;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}

/// Eigendecomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and a matrix whose columns are the matching
/// orthonormal eigenvectors.
fn jacobi_eigen(mut a: Vec<Vec<f64>>, d: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
    let mut v = vec![vec![0.0; d]; d];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _sweep in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..d {
            for q in p + 1..d {
                off += a[p][q] * a[p][q];
            }
        }
        if off.sqrt() < 1e-12 {
            break;
        }

        for p in 0..d - 1 {
            for q in p + 1..d {
                if a[p][q].abs() < 1e-300 {
                    continue;
                }

                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = if theta == 0.0 {
                    1.0
                } else {
                    theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                // A <- Jᵀ A J with the Givens rotation J in the (p, q) plane
                for k in 0..d {
                    let akp = a[k][p];
                    let akq = a[k][q];
                    a[k][p] = c * akp - s * akq;
                    a[k][q] = s * akp + c * akq;
                }
                for k in 0..d {
                    let apk = a[p][k];
                    let aqk = a[q][k];
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                // Accumulate V <- V J; columns of V converge to eigenvectors
                for row in v.iter_mut() {
                    let vkp = row[p];
                    let vkq = row[q];
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..d).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}

/// Flip an eigenvector so its largest-magnitude loading is positive.
fn orient(component: &mut [f64]) {
    let mut lead = 0;
    for (i, value) in component.iter().enumerate() {
        if value.abs() > component[lead].abs() {
            lead = i;
        }
    }
    if component[lead] < 0.0 {
        for value in component.iter_mut() {
            *value = -*value;
        }
    }
}
