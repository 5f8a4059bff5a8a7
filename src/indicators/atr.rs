// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the smoothed average of TR using Wilder's method:
//   ATR_0   = SMA of first `period` TR values
//   ATR_t   = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// `mean_range` is the cruder mean(H - L) proxy used for swing filtering when
// the series is too short for a proper ATR.
// =============================================================================

use crate::market_data::Bar;

/// Compute the most recent ATR value using Wilder's smoothing.
///
/// Returns `None` when `period` is zero, there are fewer than `period + 1`
/// bars, or any intermediate value is non-finite.
pub fn calculate_atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    // `f64::max` discards NaN, so a broken bar must be caught before it.
    let tr_values: Vec<f64> = bars
        .windows(2)
        .map(|pair| true_range(&pair[0], &pair[1]))
        .collect::<Option<_>>()?;

    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return None;
    }

    let period_f = period as f64;
    let mut atr = seed;
    for &tr in &tr_values[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            return None;
        }
    }

    Some(atr)
}

fn true_range(prev: &Bar, cur: &Bar) -> Option<f64> {
    if !(cur.high.is_finite() && cur.low.is_finite() && prev.close.is_finite()) {
        return None;
    }
    let hl = cur.high - cur.low;
    let hc = (cur.high - prev.close).abs();
    let lc = (cur.low - prev.close).abs();
    Some(hl.max(hc).max(lc))
}

/// Mean of `high - low` across all bars.
pub fn mean_range(bars: &[Bar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let m = bars.iter().map(Bar::range).sum::<f64>() / bars.len() as f64;
    m.is_finite().then_some(m)
}

/// ATR with Wilder smoothing when enough bars exist, otherwise the mean
/// bar range.
pub fn volatility_unit(bars: &[Bar], period: usize) -> Option<f64> {
    calculate_atr(bars, period).or_else(|| mean_range(bars))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: 0,
            open,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn atr_period_zero() {
        let bars = vec![bar(100.0, 105.0, 95.0, 102.0); 20];
        assert!(calculate_atr(&bars, 0).is_none());
    }

    #[test]
    fn atr_insufficient_data() {
        let bars = vec![bar(100.0, 105.0, 95.0, 102.0); 10];
        assert!(calculate_atr(&bars, 14).is_none());
    }

    #[test]
    fn atr_constant_range() {
        let bars: Vec<Bar> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                bar(base, base + 5.0, base - 5.0, base)
            })
            .collect();
        let atr = calculate_atr(&bars, 14).unwrap();
        assert!((atr - 10.0).abs() < 1.0, "expected ATR near 10.0, got {atr}");
    }

    #[test]
    fn atr_true_range_uses_prev_close() {
        let bars = vec![
            bar(100.0, 105.0, 95.0, 95.0),
            bar(110.0, 115.0, 108.0, 112.0),
            bar(112.0, 118.0, 110.0, 115.0),
            bar(115.0, 120.0, 113.0, 118.0),
        ];
        let atr = calculate_atr(&bars, 3).unwrap();
        assert!(atr > 7.0, "ATR should reflect the gap, got {atr}");
    }

    #[test]
    fn atr_nan_returns_none() {
        let bars = vec![
            bar(100.0, 105.0, 95.0, 100.0),
            bar(100.0, f64::NAN, 95.0, 100.0),
            bar(100.0, 105.0, 95.0, 100.0),
            bar(100.0, 105.0, 95.0, 100.0),
        ];
        assert!(calculate_atr(&bars, 3).is_none());
    }

    #[test]
    fn atr_nan_prev_close_returns_none() {
        let bars = vec![
            bar(100.0, 105.0, 95.0, f64::NAN),
            bar(100.0, 105.0, 95.0, 100.0),
            bar(100.0, 105.0, 95.0, 100.0),
            bar(100.0, 105.0, 95.0, 100.0),
        ];
        assert!(calculate_atr(&bars, 3).is_none());
    }

    #[test]
    fn volatility_unit_falls_back_to_mean_range() {
        let bars = vec![bar(10.0, 11.0, 9.0, 10.0), bar(10.0, 10.5, 9.5, 10.0)];
        assert_eq!(calculate_atr(&bars, 14), None);
        assert!((volatility_unit(&bars, 14).unwrap() - 1.5).abs() < 1e-12);
    }
}
