// =============================================================================
// Smart Money levels — VWAP and rolling extremes
// =============================================================================
//
// VWAP_t = Σ(volume · typical price) / Σ volume, cumulative from the first
// bar. Support and resistance are the lowest low and highest high of the
// trailing window, where institutional accumulation is assumed to anchor.

use crate::detectors::{adaptive_window, require_bars, DetectorError, DetectorOutput, NamedLevel};
use crate::market_data::PriceSeries;
use crate::runtime_config::SmartMoneyParams;

pub fn detect(series: &PriceSeries, params: &SmartMoneyParams) -> Result<DetectorOutput, DetectorError> {
    require_bars(series, params.min_bars.max(1))?;
    let window = adaptive_window(params.window, params.min_window.max(1), series.len(), 3);
    require_bars(series, window)?;

    let bars = series.bars();
    let recent = &bars[bars.len() - window..];
    let support = recent.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let resistance = recent.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);

    if !support.is_finite() || !resistance.is_finite() {
        return Err(DetectorError::Degenerate("rolling extremes not finite".into()));
    }

    let mut levels = vec![
        NamedLevel::new("Support", support),
        NamedLevel::new("Resistance", resistance),
    ];
    if let Some(vwap) = cumulative_vwap(series).last().copied().flatten() {
        levels.push(NamedLevel::new("VWAP", vwap));
    }

    Ok(DetectorOutput::NamedLevels(levels))
}

/// Running VWAP per bar; `None` while cumulative volume is still zero.
pub fn cumulative_vwap(series: &PriceSeries) -> Vec<Option<f64>> {
    let mut pv = 0.0;
    let mut vol = 0.0;
    series
        .bars()
        .iter()
        .map(|b| {
            pv += b.volume * b.typical_price();
            vol += b.volume;
            if vol > 0.0 {
                Some(pv / vol).filter(|v| v.is_finite())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{bar, flat_series};
    use crate::market_data::Bar;

    fn series(bars: Vec<Bar>) -> PriceSeries {
        PriceSeries::new(bars).unwrap()
    }

    #[test]
    fn vwap_weights_by_volume() {
        let s = series(vec![bar(0, 10.0, 0.0, 100.0), bar(1, 20.0, 0.0, 300.0)]);
        let vwap = cumulative_vwap(&s);
        assert_eq!(vwap[0], Some(10.0));
        assert_eq!(vwap[1], Some(17.5));
    }

    #[test]
    fn zero_volume_has_no_vwap() {
        let s = series((0..6).map(|i| bar(i, 10.0, 0.5, 0.0)).collect());
        let out = detect(&s, &SmartMoneyParams::default()).unwrap();
        assert_eq!(out.named("VWAP"), None);
        assert_eq!(out.named("Support"), Some(9.5));
        assert_eq!(out.named("Resistance"), Some(10.5));
    }

    #[test]
    fn uses_trailing_window_only() {
        // 30 bars -> window 10; the early spike must not count.
        let mut bars: Vec<Bar> = (0..30).map(|i| bar(i, 10.0, 0.2, 100.0)).collect();
        bars[2] = bar(2, 50.0, 0.2, 100.0);
        bars[25] = bar(25, 11.0, 0.2, 100.0);
        let out = detect(&series(bars), &SmartMoneyParams::default()).unwrap();
        assert_eq!(out.named("Resistance"), Some(11.2));
        assert_eq!(out.named("Support"), Some(9.8));
    }

    #[test]
    fn requires_five_bars() {
        assert!(matches!(
            detect(&flat_series(4, 1.0), &SmartMoneyParams::default()),
            Err(DetectorError::InsufficientData { required: 5, available: 4 })
        ));
    }
}
