// =============================================================================
// Shared types used across the keylevels engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Which side of price a level sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelKind {
    Support,
    Resistance,
}

impl std::fmt::Display for LevelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Support => write!(f, "Support"),
            Self::Resistance => write!(f, "Resistance"),
        }
    }
}

/// Identifies one of the seven level detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetectorName {
    Fibonacci,
    PivotPoints,
    BollingerBands,
    KMeans,
    VolumeProfile,
    Trendlines,
    SmartMoney,
}

impl DetectorName {
    /// Every detector, in the order the engine runs them.
    pub const ALL: [DetectorName; 7] = [
        Self::Fibonacci,
        Self::PivotPoints,
        Self::BollingerBands,
        Self::KMeans,
        Self::VolumeProfile,
        Self::Trendlines,
        Self::SmartMoney,
    ];

    /// Human-readable label used in reports and merged output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fibonacci => "Fibonacci",
            Self::PivotPoints => "Pivot Points",
            Self::BollingerBands => "Bollinger Bands",
            Self::KMeans => "KMeans Clusters",
            Self::VolumeProfile => "Volume Profile",
            Self::Trendlines => "Trendlines",
            Self::SmartMoney => "Smart Money",
        }
    }
}

impl std::fmt::Display for DetectorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single candidate price level emitted by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub value: f64,
    pub kind: LevelKind,
    pub source: DetectorName,
    /// Display source, e.g. "Fib 61.8%" or "Pivot Points".
    pub label: String,
    /// Detector-assigned importance.
    pub weight: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_labels_are_unique() {
        let mut labels: Vec<&str> = DetectorName::ALL.iter().map(|d| d.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), DetectorName::ALL.len());
    }

    #[test]
    fn display_matches_label() {
        assert_eq!(DetectorName::KMeans.to_string(), "KMeans Clusters");
        assert_eq!(LevelKind::Resistance.to_string(), "Resistance");
    }
}
