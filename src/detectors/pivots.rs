// =============================================================================
// Pivot Points — clustered local extrema
// =============================================================================
//
// Raw extrema come from one of two strategies:
//
//   RollingWindow  bar i is a local max when high[i] is the maximum of the
//                  centered window [i - w/2, i + w/2] and strictly exceeds
//                  every earlier bar of that window (plateaus report once).
//                  Minima mirror this on the lows.
//
//   Prominence     peaks whose topographic prominence reaches the configured
//                  minimum; valleys are peaks of the negated lows.
//
// Raw extrema within the tolerance of a running group mean collapse into one
// level (the rounded group mean).

use tracing::trace;

use crate::detectors::{adaptive_window, require_bars, DetectorError, DetectorOutput};
use crate::indicators::{atr, stats};
use crate::market_data::PriceSeries;
use crate::runtime_config::{ClusterTolerance, PivotMethod, PivotParams};

const MIN_WINDOW: usize = 2;
const ATR_PERIOD: usize = 14;

pub fn detect(series: &PriceSeries, params: &PivotParams) -> Result<DetectorOutput, DetectorError> {
    let window = adaptive_window(params.window, MIN_WINDOW, series.len(), 3);
    require_bars(series, window * 2)?;

    let highs = series.highs();
    let lows = series.lows();

    let (raw_resistance, raw_support) = match params.method {
        PivotMethod::RollingWindow => (rolling_maxima(&highs, window), rolling_minima(&lows, window)),
        PivotMethod::Prominence { min_prominence } => {
            let negated: Vec<f64> = lows.iter().map(|v| -v).collect();
            (
                prominent_peaks(&highs, min_prominence),
                prominent_peaks(&negated, min_prominence)
                    .into_iter()
                    .map(|v| -v)
                    .collect(),
            )
        }
    };

    trace!(
        window,
        raw_resistance = raw_resistance.len(),
        raw_support = raw_support.len(),
        "pivot extrema located"
    );

    if raw_resistance.is_empty() && raw_support.is_empty() {
        return Err(DetectorError::NoSignal("no local extrema found".into()));
    }

    let unit = atr::volatility_unit(series.bars(), ATR_PERIOD);
    let resistance = cluster_levels(&raw_resistance, params.tolerance, unit, params.decimals);
    let support = cluster_levels(&raw_support, params.tolerance, unit, params.decimals);

    Ok(DetectorOutput::SupportResistance {
        support,
        resistance,
    })
}

fn rolling_maxima(values: &[f64], window: usize) -> Vec<f64> {
    centered_extrema(values, window, |candidate, other| candidate > other)
}

fn rolling_minima(values: &[f64], window: usize) -> Vec<f64> {
    centered_extrema(values, window, |candidate, other| candidate < other)
}

/// `beats(a, b)` is true when `a` is strictly more extreme than `b`.
fn centered_extrema(values: &[f64], window: usize, beats: fn(f64, f64) -> bool) -> Vec<f64> {
    let half = window / 2;
    if half == 0 || values.len() <= 2 * half {
        return Vec::new();
    }

    let mut extrema = Vec::new();
    for i in half..values.len() - half {
        let v = values[i];
        let earlier = &values[i - half..i];
        let later = &values[i + 1..=i + half];
        if earlier.iter().all(|&o| beats(v, o)) && later.iter().all(|&o| !beats(o, v)) {
            extrema.push(v);
        }
    }
    extrema
}

/// Values of local peaks whose prominence is at least `min_prominence`.
///
/// A plateau counts as one peak at its first index. Prominence is the peak
/// height above the higher of the two lowest points reached before climbing
/// to a higher value (or the series edge) on either side.
pub fn prominent_peaks(values: &[f64], min_prominence: f64) -> Vec<f64> {
    let n = values.len();
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < n {
        if values[i] <= values[i - 1] {
            i += 1;
            continue;
        }
        let mut end = i;
        while end + 1 < n && values[end + 1] == values[i] {
            end += 1;
        }
        if end + 1 < n && values[end + 1] < values[i] {
            let height = values[i];
            let left_base = values[..i]
                .iter()
                .rev()
                .take_while(|&&v| v <= height)
                .copied()
                .fold(height, f64::min);
            let right_base = values[end + 1..]
                .iter()
                .take_while(|&&v| v <= height)
                .copied()
                .fold(height, f64::min);
            let prominence = height - left_base.max(right_base);
            if prominence >= min_prominence {
                peaks.push(height);
            }
        }
        i = end + 1;
    }
    peaks
}

/// Group sorted levels whose distance to the running group mean is within
/// the tolerance, and return each group's rounded mean. Groups that round to
/// the same price are reported once.
pub fn cluster_levels(
    levels: &[f64],
    tolerance: ClusterTolerance,
    volatility_unit: Option<f64>,
    decimals: u32,
) -> Vec<f64> {
    let mut sorted: Vec<f64> = levels.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return Vec::new();
    }
    sorted.sort_by(f64::total_cmp);

    let threshold = match tolerance {
        ClusterTolerance::Absolute(t) => t,
        ClusterTolerance::PercentOfMean(p) => stats::mean(&sorted).unwrap_or(0.0).abs() * p,
        ClusterTolerance::AtrMultiple(m) => volatility_unit.unwrap_or(0.0) * m,
    };

    let mut groups: Vec<Vec<f64>> = Vec::new();
    for level in sorted {
        let joins = groups
            .last()
            .is_some_and(|g| (level - group_mean(g)).abs() <= threshold);
        if joins {
            if let Some(group) = groups.last_mut() {
                group.push(level);
            }
        } else {
            groups.push(vec![level]);
        }
    }

    let mut out: Vec<f64> = groups
        .iter()
        .map(|g| stats::round_to(group_mean(g), decimals))
        .collect();
    out.dedup();
    out
}

fn group_mean(group: &[f64]) -> f64 {
    group.iter().sum::<f64>() / group.len() as f64
}
