// =============================================================================
// Support/Resistance Engine — runs every detector and merges the result
// =============================================================================
//
// Pipeline:
//   1. Short-circuit when the series is shorter than `min_bars`
//   2. Run the seven detectors sequentially; a failing detector is recorded
//      as unavailable and never aborts the others
//   3. Flatten available outputs into typed levels
//   4. Score + merge (fall back to the raw levels when merging fails)
//   5. Consensus summary over every detector value
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detectors::{run_detector, DetectorStatus};
use crate::levels::{consensus_levels, flatten_outputs, merge_levels, unmerged_levels};
use crate::levels::{ConsensusLevels, MergedLevels};
use crate::market_data::PriceSeries;
use crate::runtime_config::AnalyzerConfig;
use crate::types::DetectorName;

// =============================================================================
// Analysis result
// =============================================================================

/// Outcome of one detector inside an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorEntry {
    pub name: DetectorName,
    pub status: DetectorStatus,
}

/// Complete record of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Unique identifier (UUID v4).
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// RFC 3339 timestamp of when the analysis ran.
    pub created_at: String,

    pub bars: usize,
    pub last_close: f64,

    /// One entry per detector, in run order.
    pub detectors: Vec<DetectorEntry>,

    pub merged: MergedLevels,

    pub consensus: Option<ConsensusLevels>,
}

impl AnalysisResult {
    pub fn detector(&self, name: DetectorName) -> Option<&DetectorStatus> {
        self.detectors.iter().find(|e| e.name == name).map(|e| &e.status)
    }

    pub fn available_count(&self) -> usize {
        self.detectors.iter().filter(|e| e.status.is_available()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis {
    Complete(AnalysisResult),
    /// Too few bars for any detector to run.
    InsufficientData { bars: usize, required: usize },
}

impl Analysis {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Complete(r) => Some(r),
            Self::InsufficientData { .. } => None,
        }
    }

    pub fn into_result(self) -> Option<AnalysisResult> {
        match self {
            Self::Complete(r) => Some(r),
            Self::InsufficientData { .. } => None,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SupportResistanceEngine {
    config: AnalyzerConfig,
}

impl SupportResistanceEngine {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Run every detector over `series` and merge their levels.
    pub fn run_all_analysis(&self, series: &PriceSeries, symbol: Option<&str>) -> Analysis {
        let required = self.config.min_bars.max(1);
        let symbol_label = symbol.unwrap_or("-");

        // ── 1. Data sufficiency ──────────────────────────────────────────
        let last_close = match series.last_close() {
            Some(close) if series.len() >= required => close,
            _ => {
                warn!(
                    symbol = symbol_label,
                    bars = series.len(),
                    required,
                    "insufficient data for analysis"
                );
                return Analysis::InsufficientData {
                    bars: series.len(),
                    required,
                };
            }
        };

        // ── 2. Detectors ─────────────────────────────────────────────────
        let detectors: Vec<DetectorEntry> = DetectorName::ALL
            .iter()
            .map(|&name| {
                let status = DetectorStatus::from(run_detector(name, series, &self.config));
                match &status {
                    DetectorStatus::Available { output } => {
                        debug!(symbol = symbol_label, detector = %name, values = output.values().len(), "detector ok");
                    }
                    DetectorStatus::Unavailable { reason } => {
                        debug!(symbol = symbol_label, detector = %name, reason = %reason, "detector unavailable");
                    }
                }
                DetectorEntry { name, status }
            })
            .collect();

        let available = || {
            detectors
                .iter()
                .filter_map(|e| e.status.output().map(|o| (e.name, o)))
        };

        // ── 3. Flatten ───────────────────────────────────────────────────
        let levels = flatten_outputs(available(), &self.config.merge.weights);

        // ── 4. Merge ─────────────────────────────────────────────────────
        let merged = merge_levels(&levels, last_close, &self.config.merge).unwrap_or_else(|e| {
            warn!(symbol = symbol_label, error = %e, "merge failed, returning unmerged levels");
            unmerged_levels(&levels)
        });

        // ── 5. Consensus ─────────────────────────────────────────────────
        let all_values: Vec<f64> = available().flat_map(|(_, o)| o.values()).collect();
        let consensus = consensus_levels(&all_values, self.config.consensus_clusters);

        let result = AnalysisResult {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.map(str::to_string),
            created_at: chrono::Utc::now().to_rfc3339(),
            bars: series.len(),
            last_close,
            detectors,
            merged,
            consensus,
        };

        info!(
            symbol = symbol_label,
            bars = result.bars,
            last_close,
            available = result.available_count(),
            support = result.merged.support.len(),
            resistance = result.merged.resistance.len(),
            merged = result.merged.merged,
            "analysis complete"
        );

        Analysis::Complete(result)
    }
}
