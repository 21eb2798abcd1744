//! Regime clustering
//!
//! K-means over the projected coordinates: k-means++ seeding drawn from a
//! fixed-seed RNG, then Lloyd iterations until assignments stop changing.
//! Labels are partition ids in `[0, k)` and carry no meaning across runs:
//! re-fitting on different data can permute which regime gets which id, so
//! consumers must not assume label stability between runs.

use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Iteration cap for Lloyd refinement.
const MAX_ITERATIONS: usize = 300;

/// Fitted partition of the projected points.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Cluster id per input row, each in `[0, k)`
    pub labels: Vec<usize>,
    /// Final centroid per cluster
    pub centroids: Vec<[f64; 3]>,
    /// Mean silhouette score over the partition; `None` when k == 1
    pub silhouette: Option<f64>,
}

/// Partition projected rows into k clusters.
pub fn cluster(points: &[[f64; 3]], k: usize, seed: u64) -> Result<Clustering> {
    if points.is_empty() {
        return Err(Error::EmptyInput);
    }
    if k < 1 {
        return Err(Error::Config("cluster count k must be at least 1".into()));
    }
    if k > points.len() {
        return Err(Error::Config(format!(
            "cluster count {} exceeds row count {}",
            k,
            points.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = init_centroids(points, k, &mut rng);
    let mut labels = vec![0usize; points.len()];

    let mut iterations = 0;
    loop {
        iterations += 1;

        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let nearest = nearest_centroid(point, &centroids);
            if labels[i] != nearest {
                labels[i] = nearest;
                changed = true;
            }
        }

        // The initial all-zero labels are a placeholder, so one full
        // assign/update round always runs before convergence can be declared
        if (!changed && iterations > 1) || iterations >= MAX_ITERATIONS {
            break;
        }

        update_centroids(points, &labels, &mut centroids);
    }

    let silhouette = (k > 1).then(|| silhouette_score(points, &labels, k));

    Ok(Clustering {
        labels,
        centroids,
        silhouette,
    })
}

/// K-means++ seeding: after a uniformly random first pick, each further
/// centroid is drawn with probability proportional to the squared distance
/// from the nearest centroid chosen so far.
fn init_centroids(points: &[[f64; 3]], k: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    while centroids.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = points.len() - 1;
            for (i, weight) in weights.iter().enumerate() {
                if target < *weight {
                    chosen = i;
                    break;
                }
                target -= weight;
            }
            chosen
        } else {
            // Every point coincides with an existing centroid
            rng.gen_range(0..points.len())
        };
        centroids.push(points[next]);
    }

    centroids
}

/// Nearest centroid by Euclidean distance; ties go to the lowest id.
fn nearest_centroid(point: &[f64; 3], centroids: &[[f64; 3]]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = i;
        }
    }
    best
}

/// Recompute each centroid as the mean of its members. An emptied cluster is
/// re-seeded with the point currently farthest from its own centroid.
fn update_centroids(points: &[[f64; 3]], labels: &[usize], centroids: &mut [[f64; 3]]) {
    let k = centroids.len();
    let mut sums = vec![[0.0; 3]; k];
    let mut counts = vec![0usize; k];

    for (point, &label) in points.iter().zip(labels) {
        for axis in 0..3 {
            sums[label][axis] += point[axis];
        }
        counts[label] += 1;
    }

    for c in 0..k {
        if counts[c] == 0 {
            let mut far = 0;
            let mut far_distance = -1.0;
            for (i, point) in points.iter().enumerate() {
                let distance = squared_distance(point, &centroids[labels[i]]);
                if distance > far_distance {
                    far_distance = distance;
                    far = i;
                }
            }
            centroids[c] = points[far];
        } else {
            for axis in 0..3 {
                centroids[c][axis] = sums[c][axis] / counts[c] as f64;
            }
        }
    }
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|axis| (a[axis] - b[axis]).powi(2)).sum()
}

/// Mean silhouette score over the partition (range -1..=1, higher means
/// better separated). Points in singleton clusters contribute 0.
fn silhouette_score(points: &[[f64; 3]], labels: &[usize], k: usize) -> f64 {
    let n = points.len();
    let mut sizes = vec![0usize; k];
    for &label in labels {
        sizes[label] += 1;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }

        let mut sums = vec![0.0; k];
        for j in 0..n {
            if i == j {
                continue;
            }
            sums[labels[j]] += squared_distance(&points[i], &points[j]).sqrt();
        }

        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        if b.is_finite() {
            let denom = a.max(b);
            if denom > 0.0 {
                total += (b - a) / denom;
            }
        }
    }

    total / n as f64
}
