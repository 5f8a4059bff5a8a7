// =============================================================================
// Fibonacci Retracement
// =============================================================================
//
// Six levels interpolated between the anchor high and low:
//   0%     = high
//   23.6%  = high - 0.236 * (high - low)
//   38.2%, 50%, 61.8% likewise
//   100%   = low
//
// Optional swing filter: rolling-5 highs (lows) only anchor the retracement
// when they jumped up (down) by more than ATR × multiplier versus the
// previous bar, so single noisy wicks do not define the range.

use crate::detectors::{require_bars, DetectorError, DetectorOutput, NamedLevel};
use crate::indicators::atr;
use crate::market_data::PriceSeries;
use crate::runtime_config::FibonacciParams;

/// Retracement ratios paired with their display names.
pub const RATIOS: [(&str, f64); 6] = [
    ("0%", 0.0),
    ("23.6%", 0.236),
    ("38.2%", 0.382),
    ("50%", 0.5),
    ("61.8%", 0.618),
    ("100%", 1.0),
];

const SWING_WINDOW: usize = 5;

pub fn detect(series: &PriceSeries, params: &FibonacciParams) -> Result<DetectorOutput, DetectorError> {
    require_bars(series, 1)?;

    let (high, low) = anchors(series, params)?;
    let diff = high - low;

    let levels = RATIOS
        .iter()
        .map(|&(name, ratio)| {
            let value = if ratio >= 1.0 { low } else { high - diff * ratio };
            NamedLevel::new(name, value)
        })
        .collect();

    Ok(DetectorOutput::NamedLevels(levels))
}

fn anchors(series: &PriceSeries, params: &FibonacciParams) -> Result<(f64, f64), DetectorError> {
    let global_high = series
        .max_high()
        .ok_or_else(|| DetectorError::Degenerate("no high".into()))?;
    let global_low = series
        .min_low()
        .ok_or_else(|| DetectorError::Degenerate("no low".into()))?;

    let Some(multiplier) = params.swing_atr_multiplier else {
        return Ok((global_high, global_low));
    };

    let bars = series.bars();
    let Some(unit) = atr::mean_range(bars) else {
        return Ok((global_high, global_low));
    };
    let threshold = unit * multiplier;

    let rolling_high = rolling(bars.iter().map(|b| b.high), f64::max);
    let rolling_low = rolling(bars.iter().map(|b| b.low), f64::min);

    let swing_high = rolling_high
        .windows(2)
        .filter(|w| w[1] - w[0] > threshold)
        .map(|w| w[1])
        .reduce(f64::max);
    let swing_low = rolling_low
        .windows(2)
        .filter(|w| w[1] - w[0] < -threshold)
        .map(|w| w[1])
        .reduce(f64::min);

    let high = swing_high.unwrap_or(global_high);
    let low = swing_low.unwrap_or(global_low);

    if high < low {
        // Swings from opposite ends of the window can cross.
        return Ok((global_high, global_low));
    }
    Ok((high, low))
}

/// Trailing rolling reduction over `SWING_WINDOW` values; the first full
/// window produces the first output.
fn rolling(values: impl Iterator<Item = f64>, f: fn(f64, f64) -> f64) -> Vec<f64> {
    let values: Vec<f64> = values.collect();
    values
        .windows(SWING_WINDOW)
        .filter_map(|w| w.iter().copied().reduce(f))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{flat_series, oscillating, series_from_closes};

    fn values(out: &DetectorOutput) -> Vec<f64> {
        RATIOS.iter().map(|(n, _)| out.named(n).unwrap()).collect()
    }

    #[test]
    fn levels_are_monotonically_decreasing() {
        let series = series_from_closes(&oscillating(40, 10.0, 12.0, 8), 0.1);
        let out = detect(&series, &FibonacciParams::default()).unwrap();
        let v = values(&out);
        assert_eq!(v.len(), 6);
        for pair in v.windows(2) {
            assert!(pair[0] >= pair[1], "fib levels not monotonic: {v:?}");
        }
        assert!((v[0] - 12.1).abs() < 1e-9);
        assert!((v[5] - 9.9).abs() < 1e-9);
        assert!((v[3] - 11.0).abs() < 1e-9);
    }

    #[test]
    fn single_bar_is_enough() {
        let series = series_from_closes(&[5.0], 0.5);
        let out = detect(&series, &FibonacciParams::default()).unwrap();
        assert_eq!(out.named("0%"), Some(5.5));
        assert_eq!(out.named("100%"), Some(4.5));
    }

    #[test]
    fn flat_series_has_zero_width() {
        let series = flat_series(10, 7.0);
        let out = detect(&series, &FibonacciParams::default()).unwrap();
        assert!(values(&out).iter().all(|&v| v == 7.0));
    }

    #[test]
    fn swing_filter_keeps_levels_ordered() {
        let mut closes = oscillating(30, 10.0, 10.5, 6);
        closes.extend([11.0, 12.0, 13.5, 13.0, 12.0, 11.0, 10.0, 9.0, 8.5, 9.0]);
        let series = series_from_closes(&closes, 0.05);
        let params = FibonacciParams {
            swing_atr_multiplier: Some(1.5),
        };
        let v = values(&detect(&series, &params).unwrap());
        for pair in v.windows(2) {
            assert!(pair[0] >= pair[1], "fib levels not monotonic: {v:?}");
        }
        assert!(v[0] <= series.max_high().unwrap());
        assert!(v[5] >= series.min_low().unwrap());
    }

    #[test]
    fn swing_filter_without_swings_uses_global_extremes() {
        let series = series_from_closes(&oscillating(20, 10.0, 10.2, 4), 0.1);
        let params = FibonacciParams {
            swing_atr_multiplier: Some(50.0),
        };
        let out = detect(&series, &params).unwrap();
        assert_eq!(out.named("0%"), series.max_high());
        assert_eq!(out.named("100%"), series.min_low());
    }
}
