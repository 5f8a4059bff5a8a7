// =============================================================================
// Bollinger Band levels
// =============================================================================
//
// Lower band = support, upper band = resistance, both at the most recent bar.
// The window shrinks to the series length (never below `min_window`) so short
// intraday pulls still get bands.

use crate::detectors::{require_bars, DetectorError, DetectorOutput, NamedLevel};
use crate::indicators::bollinger::calculate_bollinger;
use crate::market_data::PriceSeries;
use crate::runtime_config::BollingerParams;

pub fn detect(series: &PriceSeries, params: &BollingerParams) -> Result<DetectorOutput, DetectorError> {
    let window = params.window.min(series.len()).max(params.min_window.max(2));
    require_bars(series, window)?;

    let bb = calculate_bollinger(&series.closes(), window, params.num_std)
        .ok_or_else(|| DetectorError::Degenerate("bollinger bands not finite".into()))?;

    Ok(DetectorOutput::NamedLevels(vec![
        NamedLevel::new("Support", bb.lower),
        NamedLevel::new("Middle", bb.middle),
        NamedLevel::new("Resistance", bb.upper),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{flat_series, oscillating, series_from_closes};
    use crate::indicators::stats;

    #[test]
    fn oscillating_series_brackets_mean() {
        let closes = oscillating(25, 10.0, 12.0, 4);
        let series = series_from_closes(&closes, 0.05);
        let out = detect(&series, &BollingerParams::default()).unwrap();

        let support = out.named("Support").unwrap();
        let resistance = out.named("Resistance").unwrap();
        assert!(support.is_finite() && resistance.is_finite());
        assert!(resistance > support, "resistance {resistance} <= support {support}");

        let window = &closes[closes.len() - 20..];
        let mean = stats::mean(window).unwrap();
        let sd = stats::std_sample(window).unwrap();
        assert!((support - (mean - 2.0 * sd)).abs() < 1e-9);
        assert!((resistance - (mean + 2.0 * sd)).abs() < 1e-9);
    }

    #[test]
    fn window_shrinks_on_short_series() {
        let series = series_from_closes(&[10.0, 11.0, 10.5, 11.5, 10.0, 11.0], 0.1);
        let out = detect(&series, &BollingerParams::default()).unwrap();
        assert!(out.named("Resistance").unwrap() > out.named("Support").unwrap());
    }

    #[test]
    fn too_short_is_unavailable() {
        let series = series_from_closes(&[10.0, 11.0, 10.5], 0.1);
        assert!(matches!(
            detect(&series, &BollingerParams::default()),
            Err(DetectorError::InsufficientData { required: 5, available: 3 })
        ));
    }

    #[test]
    fn flat_series_collapses_bands() {
        let out = detect(&flat_series(25, 3.0), &BollingerParams::default()).unwrap();
        assert_eq!(out.named("Support"), Some(3.0));
        assert_eq!(out.named("Resistance"), Some(3.0));
    }
}
