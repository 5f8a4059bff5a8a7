// =============================================================================
// K-means price clusters
// =============================================================================
//
// Lloyd's algorithm with k-means++ seeding. Seeding draws from a `StdRng`
// seeded from the configuration, so identical input always yields identical
// centres. Several restarts run with derived seeds and the lowest-inertia fit
// wins.
//
// Cluster count: min(configured, max(2, n / 10)), further capped by the number
// of distinct feature vectors so a flat series yields a single level.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::detectors::{require_bars, DetectorError, DetectorOutput};
use crate::market_data::PriceSeries;
use crate::runtime_config::{ClusterFeatures, KMeansParams};

const MIN_CLUSTERS: usize = 2;
const CONVERGENCE_EPS: f64 = 1e-10;

/// Outcome of one k-means fit.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub centroids: Vec<Vec<f64>>,
    /// Number of points assigned to each centroid.
    pub sizes: Vec<usize>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
}

pub fn detect(series: &PriceSeries, params: &KMeansParams) -> Result<DetectorOutput, DetectorError> {
    require_bars(series, MIN_CLUSTERS)?;

    let (points, close_idx): (Vec<Vec<f64>>, usize) = match params.features {
        ClusterFeatures::Close => (series.bars().iter().map(|b| vec![b.close]).collect(), 0),
        ClusterFeatures::HighLowClose => (
            series
                .bars()
                .iter()
                .map(|b| vec![b.high, b.low, b.close])
                .collect(),
            2,
        ),
    };

    let k = params
        .clusters
        .min(MIN_CLUSTERS.max(series.len() / 10))
        .min(distinct_count(&points));
    if k == 0 {
        return Err(DetectorError::Degenerate("zero clusters requested".into()));
    }

    let fit = fit(&points, k, params.max_iter, params.n_init, params.seed)
        .ok_or_else(|| DetectorError::Degenerate("k-means did not produce centres".into()))?;

    let mut levels: Vec<f64> = fit
        .centroids
        .iter()
        .zip(&fit.sizes)
        .filter(|(_, size)| **size > 0)
        .map(|(c, _)| c[close_idx])
        .collect();
    levels.sort_by(f64::total_cmp);
    levels.dedup();

    trace!(k, levels = levels.len(), inertia = fit.inertia, "k-means fitted");
    Ok(DetectorOutput::LevelList(levels))
}

/// Fit `k` clusters to `points`, keeping the best of `n_init` seeded runs.
///
/// Returns `None` for empty input, `k == 0`, ragged or non-finite points.
pub fn fit(points: &[Vec<f64>], k: usize, max_iter: usize, n_init: usize, seed: u64) -> Option<KMeansFit> {
    let dim = points.first()?.len();
    if k == 0
        || dim == 0
        || points
            .iter()
            .any(|p| p.len() != dim || p.iter().any(|v| !v.is_finite()))
    {
        return None;
    }

    (0..n_init.max(1) as u64)
        .filter_map(|run| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(run));
            let init = plus_plus_init(points, k.min(points.len()), &mut rng);
            lloyd(points, init, max_iter.max(1))
        })
        .min_by(|a, b| a.inertia.total_cmp(&b.inertia))
}

fn plus_plus_init(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];
    while centroids.len() < k {
        let d2: Vec<f64> = points
            .iter()
            .map(|p| nearest(p, &centroids).1)
            .collect();
        let total: f64 = d2.iter().sum();
        if total <= 0.0 {
            // Every point already coincides with a centre.
            break;
        }
        let mut target = rng.gen::<f64>() * total;
        let mut chosen = points.len() - 1;
        for (i, w) in d2.iter().enumerate() {
            if target < *w {
                chosen = i;
                break;
            }
            target -= w;
        }
        centroids.push(points[chosen].clone());
    }
    centroids
}

fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iter: usize) -> Option<KMeansFit> {
    let dim = points[0].len();
    let k = centroids.len();
    let mut assignment = vec![usize::MAX; points.len()];

    for _ in 0..max_iter {
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let (best, _) = nearest(p, &centroids);
            if assignment[i] != best {
                assignment[i] = best;
                changed = true;
            }
        }

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &c) in points.iter().zip(&assignment) {
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(p) {
                *s += v;
            }
        }

        let mut shift: f64 = 0.0;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let updated: Vec<f64> = sums[c].iter().map(|s| s / counts[c] as f64).collect();
            shift = shift.max(sq_dist(&updated, &centroids[c]));
            centroids[c] = updated;
        }

        if !changed || shift < CONVERGENCE_EPS {
            break;
        }
    }

    let mut sizes = vec![0usize; k];
    let mut inertia = 0.0;
    for p in points {
        let (best, d2) = nearest(p, &centroids);
        sizes[best] += 1;
        inertia += d2;
    }

    inertia.is_finite().then_some(KMeansFit {
        centroids,
        sizes,
        inertia,
    })
}

/// Index of the closest centroid and the squared distance to it.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, sq_dist(point, c)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, f64::INFINITY))
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn distinct_count(points: &[Vec<f64>]) -> usize {
    let mut sorted: Vec<&Vec<f64>> = points.iter().collect();
    sorted.sort_by(|a, b| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.dedup();
    sorted.len()
}
