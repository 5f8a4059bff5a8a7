// =============================================================================
// Trendlines — Theil–Sen fits over trailing windows
// =============================================================================
//
// For each evaluation position, fit a robust line through the lows (support)
// and highs (resistance) of the trailing window and project it to the
// window's last bar. Only lines steeper than `angle_threshold_deg` count, and
// with `directional` set a support line must fall and a resistance line must
// rise. The current level is the mean of the last three accepted projections.
//
// Slope is measured in price per bar, so the angle depends on the instrument's
// price scale.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::trace;

use crate::detectors::{adaptive_window, require_bars, DetectorError, DetectorOutput, NamedLevel};
use crate::indicators::stats;
use crate::market_data::PriceSeries;
use crate::runtime_config::TrendlineParams;

const RECENT_PROJECTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Rising,
    Falling,
}

/// Robust line fit `y = intercept + slope * x`, with `x` the index in the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LineFit {
    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    pub fn angle_deg(&self) -> f64 {
        self.slope.atan().to_degrees()
    }
}

pub fn detect(series: &PriceSeries, params: &TrendlineParams) -> Result<DetectorOutput, DetectorError> {
    let window = adaptive_window(params.window, params.min_window.max(2), series.len(), 3);
    require_bars(series, window * 2)?;

    let lows = series.lows();
    let highs = series.highs();
    let positions = evaluation_positions(series.len(), window, params.max_samples, params.seed);

    let mut support = Vec::new();
    let mut resistance = Vec::new();
    for end in positions {
        let start = end - window;
        if let Some(p) = steep_projection(&lows[start..end], params, Direction::Falling) {
            support.push(p);
        }
        if let Some(p) = steep_projection(&highs[start..end], params, Direction::Rising) {
            resistance.push(p);
        }
    }

    trace!(
        window,
        support = support.len(),
        resistance = resistance.len(),
        "trendline projections accepted"
    );

    let mut levels = Vec::new();
    if let Some(v) = recent_mean(&support) {
        levels.push(NamedLevel::new("Current Support", v));
    }
    if let Some(v) = recent_mean(&resistance) {
        levels.push(NamedLevel::new("Current Resistance", v));
    }

    if levels.is_empty() {
        return Err(DetectorError::NoSignal(format!(
            "no trendline steeper than {}°",
            params.angle_threshold_deg
        )));
    }
    Ok(DetectorOutput::NamedLevels(levels))
}

/// Theil–Sen estimator: median of all pairwise slopes, intercept as the
/// median of `y - slope * x`.
pub fn theil_sen(values: &[f64]) -> Option<LineFit> {
    if values.len() < 2 {
        return None;
    }

    let mut slopes = Vec::with_capacity(values.len() * (values.len() - 1) / 2);
    for i in 0..values.len() {
        for j in i + 1..values.len() {
            slopes.push((values[j] - values[i]) / (j - i) as f64);
        }
    }
    let slope = stats::median(&slopes)?;

    let residuals: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(x, y)| y - slope * x as f64)
        .collect();
    let intercept = stats::median(&residuals)?;

    Some(LineFit { slope, intercept })
}

/// Exclusive window end indices, chronological. Every position is used when
/// there are at most `max_samples`; otherwise a seeded sample is drawn.
fn evaluation_positions(len: usize, window: usize, max_samples: usize, seed: u64) -> Vec<usize> {
    let all: Vec<usize> = (window..=len).collect();
    if all.len() <= max_samples || max_samples == 0 {
        return all;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked: Vec<usize> = rand::seq::index::sample(&mut rng, all.len(), max_samples)
        .into_iter()
        .map(|i| all[i])
        .collect();
    picked.sort_unstable();
    picked
}

fn steep_projection(values: &[f64], params: &TrendlineParams, direction: Direction) -> Option<f64> {
    let fit = theil_sen(values)?;
    let oriented = !params.directional
        || match direction {
            Direction::Rising => fit.slope > 0.0,
            Direction::Falling => fit.slope < 0.0,
        };
    let projected = fit.at((values.len() - 1) as f64);
    (oriented && fit.angle_deg().abs() > params.angle_threshold_deg && projected.is_finite()).then_some(projected)
}

fn recent_mean(projections: &[f64]) -> Option<f64> {
    let tail = &projections[projections.len().saturating_sub(RECENT_PROJECTIONS)..];
    stats::mean(tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{flat_series, series_from_closes};

    fn ramp(n: usize, start: f64, step: f64) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn theil_sen_recovers_line_despite_outlier() {
        let mut values = ramp(11, 2.0, 0.5);
        values[5] = 100.0;
        let fit = theil_sen(&values).unwrap();
        assert!((fit.slope - 0.5).abs() < 1e-12);
        assert!((fit.intercept - 2.0).abs() < 1e-12);
    }

    #[test]
    fn rising_ramp_yields_resistance_only() {
        // 40 bars -> window 13; the last three windows end on bars 37..=39.
        let series = series_from_closes(&ramp(40, 10.0, 0.5), 0.1);
        let out = detect(&series, &TrendlineParams::default()).unwrap();
        let resistance = out.named("Current Resistance").unwrap();
        assert!((resistance - (10.0 + 0.5 * 38.0 + 0.1)).abs() < 1e-9, "{resistance}");
        assert!(out.named("Current Support").is_none());
    }

    #[test]
    fn falling_ramp_yields_support_only() {
        let series = series_from_closes(&ramp(40, 40.0, -0.5), 0.1);
        let out = detect(&series, &TrendlineParams::default()).unwrap();
        let support = out.named("Current Support").unwrap();
        assert!((support - (40.0 - 0.5 * 38.0 - 0.1)).abs() < 1e-9, "{support}");
        assert!(out.named("Current Resistance").is_none());
    }

    #[test]
    fn undirected_fits_accept_both_sides() {
        let params = TrendlineParams {
            directional: false,
            ..TrendlineParams::default()
        };
        let series = series_from_closes(&ramp(40, 10.0, 0.5), 0.1);
        let out = detect(&series, &params).unwrap();
        let support = out.named("Current Support").unwrap();
        let resistance = out.named("Current Resistance").unwrap();
        assert!((support - (10.0 + 0.5 * 38.0 - 0.1)).abs() < 1e-9, "{support}");
        assert!((resistance - (10.0 + 0.5 * 38.0 + 0.1)).abs() < 1e-9, "{resistance}");
    }

    #[test]
    fn shallow_slope_is_no_signal() {
        let series = series_from_closes(&ramp(40, 10.0, 0.01), 0.1);
        assert!(matches!(
            detect(&series, &TrendlineParams::default()),
            Err(DetectorError::NoSignal(_))
        ));
    }

    #[test]
    fn flat_series_is_no_signal() {
        assert!(matches!(
            detect(&flat_series(30, 8.0), &TrendlineParams::default()),
            Err(DetectorError::NoSignal(_))
        ));
    }

    #[test]
    fn insufficient_data() {
        assert!(matches!(
            detect(&flat_series(9, 8.0), &TrendlineParams::default()),
            Err(DetectorError::InsufficientData { required: 10, available: 9 })
        ));
    }

    #[test]
    fn sampled_positions_are_sorted_and_deterministic() {
        let a = evaluation_positions(200, 20, 50, 7);
        let b = evaluation_positions(200, 20, 50, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(a.iter().all(|&p| (20..=200).contains(&p)));
        assert_eq!(evaluation_positions(30, 20, 50, 7), (20..=30).collect::<Vec<_>>());
    }
}
