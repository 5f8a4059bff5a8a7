// =============================================================================
// Consensus summary — k-means over every detector value
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::detectors::kmeans;
use crate::indicators::stats;

const MIN_VALUES: usize = 3;
const MAX_ITER: usize = 300;
const N_INIT: usize = 4;
const SEED: u64 = 42;

/// Three-number digest of all detected levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusLevels {
    pub strong_support: f64,
    pub pivot_zone: f64,
    pub strong_resistance: f64,
}

/// Cluster `values` into `min(max_clusters, n / 2)` groups and report the
/// lowest, median and highest centre. `None` with fewer than three finite
/// values.
pub fn consensus_levels(values: &[f64], max_clusters: usize) -> Option<ConsensusLevels> {
    let points: Vec<Vec<f64>> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| vec![v])
        .collect();
    if points.len() < MIN_VALUES {
        return None;
    }

    let k = max_clusters.min(points.len() / 2).max(1);
    let fit = kmeans::fit(&points, k, MAX_ITER, N_INIT, SEED)?;

    let mut centres: Vec<f64> = fit
        .centroids
        .iter()
        .zip(&fit.sizes)
        .filter(|(_, size)| **size > 0)
        .map(|(c, _)| c[0])
        .collect();
    centres.sort_by(f64::total_cmp);

    Some(ConsensusLevels {
        strong_support: *centres.first()?,
        pivot_zone: stats::median(&centres)?,
        strong_resistance: *centres.last()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_groups_map_to_support_pivot_resistance() {
        let values = [9.0, 9.1, 8.9, 10.0, 10.1, 9.9, 11.0, 11.1, 10.9];
        let c = consensus_levels(&values, 3).unwrap();
        assert!((c.strong_support - 9.0).abs() < 1e-9);
        assert!((c.pivot_zone - 10.0).abs() < 1e-9);
        assert!((c.strong_resistance - 11.0).abs() < 1e-9);
    }

    #[test]
    fn needs_three_values() {
        assert!(consensus_levels(&[1.0, 2.0], 3).is_none());
        assert!(consensus_levels(&[1.0, 2.0, f64::NAN], 3).is_none());
    }

    #[test]
    fn few_values_shrink_cluster_count() {
        // n = 3 -> k = 1
        let c = consensus_levels(&[1.0, 2.0, 3.0], 3).unwrap();
        assert_eq!(c.strong_support, c.strong_resistance);
        assert!((c.pivot_zone - 2.0).abs() < 1e-12);
    }

    #[test]
    fn identical_values_collapse() {
        let c = consensus_levels(&[5.0; 6], 3).unwrap();
        assert_eq!(c.strong_support, 5.0);
        assert_eq!(c.strong_resistance, 5.0);
    }
}
