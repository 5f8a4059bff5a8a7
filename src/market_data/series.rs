// =============================================================================
// Price Series — validated, immutable OHLCV input for the engine
// =============================================================================
//
// Invariants checked by `PriceSeries::new`:
//   - every field finite
//   - high >= max(open, close) >= min(open, close) >= low >= 0
//   - volume >= 0
//   - timestamps non-decreasing
//
// `PriceSeries::sanitized` is the lenient path for provider data: it sorts,
// drops offending bars and never fails.
// =============================================================================

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// A single OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time as unix milliseconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Typical price `(high + low + close) / 3`.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// High minus low.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    fn check(&self) -> Result<(), BarViolation> {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(BarViolation::NonFinite);
        }
        if self.low < 0.0 {
            return Err(BarViolation::NegativePrice);
        }
        if self.volume < 0.0 {
            return Err(BarViolation::NegativeVolume);
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err(BarViolation::InconsistentRange);
        }
        Ok(())
    }
}

/// The specific invariant a bar broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BarViolation {
    #[error("non-finite field")]
    NonFinite,
    #[error("negative price")]
    NegativePrice,
    #[error("negative volume")]
    NegativeVolume,
    #[error("high/low do not bracket open and close")]
    InconsistentRange,
}

/// Reasons a bar sequence cannot become a `PriceSeries`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("bar {index}: {violation}")]
    InvalidBar { index: usize, violation: BarViolation },
    #[error("bar {index}: timestamp goes backwards")]
    OutOfOrder { index: usize },
}

/// Ordered, validated OHLCV bars. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Validate `bars` and wrap them. The series may be empty; the engine
    /// decides what length is sufficient.
    pub fn new(bars: Vec<Bar>) -> Result<Self, SeriesError> {
        for (index, bar) in bars.iter().enumerate() {
            bar.check()
                .map_err(|violation| SeriesError::InvalidBar { index, violation })?;
            if index > 0 && bar.timestamp < bars[index - 1].timestamp {
                return Err(SeriesError::OutOfOrder { index });
            }
        }
        Ok(Self { bars })
    }

    /// Sort by timestamp and drop every bar that violates an invariant.
    pub fn sanitized(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        let before = bars.len();
        bars.retain(|b| b.check().is_ok());
        let dropped = before - bars.len();
        if dropped > 0 {
            warn!(dropped, kept = bars.len(), "dropped invalid bars from series");
        }
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Close of the most recent bar.
    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Highest high across the series.
    pub fn max_high(&self) -> Option<f64> {
        self.bars.iter().map(|b| b.high).reduce(f64::max)
    }

    /// Lowest low across the series.
    pub fn min_low(&self) -> Option<f64> {
        self.bars.iter().map(|b| b.low).reduce(f64::min)
    }
}

impl<'de> Deserialize<'de> for PriceSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bars = Vec::<Bar>::deserialize(deserializer)?;
        PriceSeries::new(bars).map_err(serde::de::Error::custom)
    }
}
