// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA over the trailing window, upper/lower = SMA ± k·σ where σ
// is the sample standard deviation (ddof = 1) of the same window.

use crate::indicators::stats;

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone)]
pub struct BollingerResult {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Calculate Bollinger Bands at the most recent close.
///
/// Returns `None` when:
/// - `period` is below 2 or exceeds the data length.
/// - Any band is non-finite.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<BollingerResult> {
    if period < 2 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = stats::mean(window)?;
    let std_dev = stats::std_sample(window)?;

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    if upper.is_finite() && lower.is_finite() {
        Some(BollingerResult { upper, middle, lower })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bb.upper > bb.middle);
        assert!(bb.lower < bb.middle);
        assert!((bb.middle - 10.5).abs() < 1e-12);
    }

    #[test]
    fn bollinger_uses_trailing_window() {
        let mut closes = vec![1000.0; 10];
        closes.extend((0..5).map(|_| 10.0));
        let bb = calculate_bollinger(&closes, 5, 2.0).unwrap();
        assert_eq!(bb.middle, 10.0);
        assert_eq!(bb.upper, 10.0);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let closes = vec![1.0, 2.0, 3.0];
        assert!(calculate_bollinger(&closes, 20, 2.0).is_none());
        assert!(calculate_bollinger(&closes, 1, 2.0).is_none());
    }

    #[test]
    fn bollinger_flat() {
        let closes = vec![100.0; 20];
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert_eq!(bb.upper, bb.lower);
        assert_eq!(bb.middle, 100.0);
    }
}
