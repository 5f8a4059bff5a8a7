// =============================================================================
// Level Detectors
// =============================================================================
//
// Seven independent heuristics, each a pure function
//   (&PriceSeries, &<Detector>Params) -> Result<DetectorOutput, DetectorError>
//
// - Fibonacci retracement
// - Pivot points (local extrema, clustered)
// - Bollinger Bands
// - K-means price clusters
// - Volume profile
// - Theil–Sen trendlines
// - Smart money (VWAP + rolling extremes)
//
// Windows and cluster counts shrink with the available data; below each
// detector's absolute minimum the detector reports `InsufficientData`.

pub mod bollinger;
pub mod fibonacci;
pub mod kmeans;
pub mod pivots;
pub mod smart_money;
pub mod trendlines;
pub mod volume_profile;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market_data::PriceSeries;
use crate::runtime_config::AnalyzerConfig;
use crate::types::DetectorName;

/// A named price, e.g. `("61.8%", 10.42)` or `("Support", 9.80)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedLevel {
    pub name: String,
    pub value: f64,
}

impl NamedLevel {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// What a detector produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DetectorOutput {
    Scalar(f64),
    NamedLevels(Vec<NamedLevel>),
    LevelList(Vec<f64>),
    SupportResistance {
        support: Vec<f64>,
        resistance: Vec<f64>,
    },
}

impl DetectorOutput {
    /// Look up a named value in a `NamedLevels` output.
    pub fn named(&self, name: &str) -> Option<f64> {
        match self {
            Self::NamedLevels(levels) => levels.iter().find(|l| l.name == name).map(|l| l.value),
            _ => None,
        }
    }

    /// Every price carried by the output, regardless of its role.
    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::Scalar(v) => vec![*v],
            Self::NamedLevels(levels) => levels.iter().map(|l| l.value).collect(),
            Self::LevelList(values) => values.clone(),
            Self::SupportResistance {
                support,
                resistance,
            } => support.iter().chain(resistance).copied().collect(),
        }
    }
}

/// Why a detector could not produce output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("insufficient data: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("numerically degenerate input: {0}")]
    Degenerate(String),
    #[error("no qualifying levels: {0}")]
    NoSignal(String),
}

/// Per-detector outcome as recorded in an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectorStatus {
    Available { output: DetectorOutput },
    Unavailable { reason: String },
}

impl DetectorStatus {
    pub fn output(&self) -> Option<&DetectorOutput> {
        match self {
            Self::Available { output } => Some(output),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

impl From<Result<DetectorOutput, DetectorError>> for DetectorStatus {
    fn from(result: Result<DetectorOutput, DetectorError>) -> Self {
        match result {
            Ok(output) => Self::Available { output },
            Err(e) => Self::Unavailable {
                reason: e.to_string(),
            },
        }
    }
}

/// Dispatch to the detector identified by `name`.
pub fn run_detector(
    name: DetectorName,
    series: &PriceSeries,
    config: &AnalyzerConfig,
) -> Result<DetectorOutput, DetectorError> {
    match name {
        DetectorName::Fibonacci => fibonacci::detect(series, &config.fibonacci),
        DetectorName::PivotPoints => pivots::detect(series, &config.pivots),
        DetectorName::BollingerBands => bollinger::detect(series, &config.bollinger),
        DetectorName::KMeans => kmeans::detect(series, &config.kmeans),
        DetectorName::VolumeProfile => volume_profile::detect(series, &config.volume_profile),
        DetectorName::Trendlines => trendlines::detect(series, &config.trendlines),
        DetectorName::SmartMoney => smart_money::detect(series, &config.smart_money),
    }
}

/// Shrink `preferred` to `len / divisor` but never below `floor`.
pub(crate) fn adaptive_window(preferred: usize, floor: usize, len: usize, divisor: usize) -> usize {
    preferred.min(floor.max(len / divisor.max(1)))
}

/// Fail with `InsufficientData` unless `series` holds at least `required` bars.
pub(crate) fn require_bars(series: &PriceSeries, required: usize) -> Result<(), DetectorError> {
    if series.len() < required {
        return Err(DetectorError::InsufficientData {
            required,
            available: series.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::market_data::{Bar, PriceSeries};

    /// Build a bar around `close` with a symmetric `spread`.
    pub fn bar(i: usize, close: f64, spread: f64, volume: f64) -> Bar {
        Bar {
            timestamp: i as i64 * 60_000,
            open: close,
            high: close + spread,
            low: close - spread,
            close,
            volume,
        }
    }

    /// Series from a list of closes with a fixed spread and volume.
    pub fn series_from_closes(closes: &[f64], spread: f64) -> PriceSeries {
        PriceSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| bar(i, c, spread, 1_000.0))
                .collect(),
        )
        .unwrap()
    }

    /// `n` identical bars.
    pub fn flat_series(n: usize, price: f64) -> PriceSeries {
        PriceSeries::new((0..n).map(|i| bar(i, price, 0.0, 500.0)).collect()).unwrap()
    }

    /// Closes oscillating between `lo` and `hi` with the given period.
    pub fn oscillating(n: usize, lo: f64, hi: f64, period: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let phase = (i % period) as f64 / period as f64;
                let tri = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
                lo + (hi - lo) * tri
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_window_shrinks_and_floors() {
        assert_eq!(adaptive_window(20, 5, 100, 3), 20);
        assert_eq!(adaptive_window(20, 5, 30, 3), 10);
        assert_eq!(adaptive_window(20, 5, 6, 3), 5);
    }

    #[test]
    fn status_from_error_records_reason() {
        let status: DetectorStatus = Err(DetectorError::InsufficientData {
            required: 20,
            available: 4,
        })
        .into();
        match status {
            DetectorStatus::Unavailable { reason } => assert!(reason.contains("need 20")),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn output_values_cover_all_variants() {
        let sr = DetectorOutput::SupportResistance {
            support: vec![1.0],
            resistance: vec![2.0, 3.0],
        };
        assert_eq!(sr.values(), vec![1.0, 2.0, 3.0]);
        let named = DetectorOutput::NamedLevels(vec![NamedLevel::new("Support", 4.0)]);
        assert_eq!(named.named("Support"), Some(4.0));
        assert_eq!(named.named("Resistance"), None);
    }
}
