// =============================================================================
// Volume Profile — high-volume price bins
// =============================================================================
//
// The traded range [min low, max high] is cut into equal-width bins (never
// narrower than `min_step`). A bar contributes its full volume to every bin
// its [low, high] touches. Significant bins are reported by their midpoint.

use tracing::trace;

use crate::detectors::{require_bars, DetectorError, DetectorOutput};
use crate::indicators::stats;
use crate::market_data::PriceSeries;
use crate::runtime_config::{Significance, VolumeProfileParams};

/// One price bin of the profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBin {
    pub low: f64,
    pub high: f64,
    pub volume: f64,
}

impl VolumeBin {
    pub fn midpoint(&self) -> f64 {
        (self.low + self.high) / 2.0
    }
}

pub fn detect(series: &PriceSeries, params: &VolumeProfileParams) -> Result<DetectorOutput, DetectorError> {
    require_bars(series, params.min_bars)?;

    let low = series
        .min_low()
        .ok_or_else(|| DetectorError::Degenerate("no low".into()))?;
    let high = series
        .max_high()
        .ok_or_else(|| DetectorError::Degenerate("no high".into()))?;

    if high - low <= 0.0 {
        return Ok(DetectorOutput::LevelList(vec![low]));
    }

    let bins = profile(series, params.bins, params.min_step);
    let threshold = significance_threshold(&bins, params.significance)
        .ok_or_else(|| DetectorError::NoSignal("no traded volume".into()))?;

    let levels: Vec<f64> = bins
        .iter()
        .filter(|b| b.volume > 0.0 && is_significant(b.volume, threshold, params.significance))
        .map(VolumeBin::midpoint)
        .collect();

    trace!(bins = bins.len(), threshold, levels = levels.len(), "volume profile built");

    if levels.is_empty() {
        return Err(DetectorError::NoSignal("no bin stands out".into()));
    }
    Ok(DetectorOutput::LevelList(levels))
}

/// Volume per price bin, ascending by price.
pub fn profile(series: &PriceSeries, bins: usize, min_step: f64) -> Vec<VolumeBin> {
    let (Some(low), Some(high)) = (series.min_low(), series.max_high()) else {
        return Vec::new();
    };
    let range = high - low;
    if range <= 0.0 {
        return Vec::new();
    }

    let step = (range / bins.max(1) as f64).max(min_step);
    // Absorb float noise so an exact multiple does not spawn an empty bin.
    let count = ((range / step - 1e-9).ceil() as usize).max(1);

    (0..count)
        .map(|i| {
            let bin_low = low + step * i as f64;
            let bin_high = bin_low + step;
            let volume = series
                .bars()
                .iter()
                .filter(|b| b.high >= bin_low && b.low <= bin_high)
                .map(|b| b.volume)
                .sum();
            VolumeBin {
                low: bin_low,
                high: bin_high,
                volume,
            }
        })
        .collect()
}

/// Volume a bin must reach to count; `None` when nothing traded.
pub fn significance_threshold(bins: &[VolumeBin], rule: Significance) -> Option<f64> {
    match rule {
        Significance::Percentile { q } => {
            let volumes: Vec<f64> = bins.iter().map(|b| b.volume).collect();
            if volumes.iter().all(|&v| v <= 0.0) {
                return None;
            }
            stats::percentile(&volumes, q)
        }
        Significance::MeanPlusStd => {
            let traded: Vec<f64> = bins.iter().map(|b| b.volume).filter(|&v| v > 0.0).collect();
            Some(stats::mean(&traded)? + stats::std_population(&traded)?)
        }
    }
}

fn is_significant(volume: f64, threshold: f64, rule: Significance) -> bool {
    match rule {
        Significance::Percentile { .. } => volume >= threshold,
        Significance::MeanPlusStd => volume > threshold,
    }
}
