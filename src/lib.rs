// =============================================================================
// keylevels — support and resistance levels from OHLCV bars
// =============================================================================
//
// Seven independent detectors feed a scoring and merge stage:
//
//   PriceSeries ──► detectors::* ──► levels::flatten ──► levels::merge
//                                         │
//                                         └──────────► levels::consensus
//
// `engine::SupportResistanceEngine` drives the pipeline; `provider` fetches
// intraday bars; `api` serves the engine over REST; `report` renders text.
// =============================================================================

pub mod api;
pub mod app_state;
pub mod detectors;
pub mod engine;
pub mod indicators;
pub mod levels;
pub mod market_data;
pub mod provider;
pub mod report;
pub mod runtime_config;
pub mod types;

pub use engine::{Analysis, AnalysisResult, SupportResistanceEngine};
pub use market_data::{Bar, PriceSeries};
pub use runtime_config::{AnalyzerConfig, RuntimeConfig};
