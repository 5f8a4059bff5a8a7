// =============================================================================
// Runtime Configuration — analyzer tuning, provider access, server binding
// =============================================================================
//
// Every tunable threshold of the detectors and the merge stage lives here so
// that the divergent heuristics (fixed $0.02 clustering, 0.5 % of price, ATR
// multiples, ...) are an explicit choice rather than a hard-coded guess.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry serde defaults so that adding new fields never
// breaks loading an older config file. The provider API key is accepted on
// load but never written back.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::DetectorName;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_min_bars() -> usize {
    3
}

fn default_consensus_clusters() -> usize {
    3
}

fn default_bind_addr() -> String {
    "0.0.0.0:3002".to_string()
}

fn default_base_url() -> String {
    "https://financialmodelingprep.com".to_string()
}

fn default_rate_limit_per_minute() -> u32 {
    60
}

fn default_interval() -> String {
    "5min".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

// =============================================================================
// Threshold policies
// =============================================================================

/// How close two raw extrema must be to collapse into one level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "value", rename_all = "snake_case")]
pub enum ClusterTolerance {
    /// Fixed price distance, e.g. 0.02 for two cents.
    Absolute(f64),
    /// Fraction of the mean of the values being clustered, e.g. 0.005.
    PercentOfMean(f64),
    /// Multiple of the series' average true range.
    AtrMultiple(f64),
}

impl Default for ClusterTolerance {
    fn default() -> Self {
        Self::PercentOfMean(0.005)
    }
}

/// Extremum detection strategy for pivot points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PivotMethod {
    /// Centered rolling-window maxima/minima.
    RollingWindow,
    /// Peaks whose topographic prominence reaches `min_prominence`.
    Prominence { min_prominence: f64 },
}

impl Default for PivotMethod {
    fn default() -> Self {
        Self::RollingWindow
    }
}

/// Feature vector fed to k-means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterFeatures {
    Close,
    HighLowClose,
}

impl Default for ClusterFeatures {
    fn default() -> Self {
        Self::Close
    }
}

/// Rule selecting significant volume-profile bins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Significance {
    /// Bins whose volume is at or above the `q`-th percentile.
    Percentile { q: f64 },
    /// Bins whose volume exceeds mean + one standard deviation of the
    /// non-empty bins.
    MeanPlusStd,
}

impl Default for Significance {
    fn default() -> Self {
        Self::Percentile { q: 80.0 }
    }
}

// =============================================================================
// Per-detector parameters
// =============================================================================

/// Fibonacci retracement parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FibonacciParams {
    /// When set, only swings whose rolling extreme moved by more than
    /// `ATR × multiplier` anchor the retracement.
    pub swing_atr_multiplier: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotParams {
    pub window: usize,
    pub method: PivotMethod,
    pub tolerance: ClusterTolerance,
    /// Decimal places of each clustered level.
    pub decimals: u32,
}

impl Default for PivotParams {
    fn default() -> Self {
        Self {
            window: 10,
            method: PivotMethod::default(),
            tolerance: ClusterTolerance::default(),
            decimals: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BollingerParams {
    pub window: usize,
    /// Smallest window the detector shrinks to on short series.
    pub min_window: usize,
    pub num_std: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            window: 20,
            min_window: 5,
            num_std: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansParams {
    pub clusters: usize,
    pub features: ClusterFeatures,
    pub seed: u64,
    pub max_iter: usize,
    /// Independent k-means++ restarts; the lowest-inertia run wins.
    pub n_init: usize,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            clusters: 5,
            features: ClusterFeatures::default(),
            seed: 42,
            max_iter: 300,
            n_init: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeProfileParams {
    pub bins: usize,
    pub min_bars: usize,
    /// Smallest bin width (one cent for penny stocks).
    pub min_step: f64,
    pub significance: Significance,
}

impl Default for VolumeProfileParams {
    fn default() -> Self {
        Self {
            bins: 20,
            min_bars: 20,
            min_step: 0.01,
            significance: Significance::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendlineParams {
    pub window: usize,
    pub min_window: usize,
    /// Minimum |atan(slope)| in degrees, slope measured in price per bar.
    pub angle_threshold_deg: f64,
    /// Support lines must fall and resistance lines must rise.
    pub directional: bool,
    /// Evaluation positions beyond this count are sampled.
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for TrendlineParams {
    fn default() -> Self {
        Self {
            window: 20,
            min_window: 5,
            angle_threshold_deg: 5.0,
            directional: true,
            max_samples: 50,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartMoneyParams {
    pub window: usize,
    pub min_window: usize,
    pub min_bars: usize,
}

impl Default for SmartMoneyParams {
    fn default() -> Self {
        Self {
            window: 20,
            min_window: 3,
            min_bars: 5,
        }
    }
}

// =============================================================================
// Merge & scoring
// =============================================================================

/// Fixed per-detector priority used when scoring levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorWeights {
    pub volume_profile: f64,
    pub pivot_points: f64,
    pub trendlines: f64,
    pub fibonacci: f64,
    pub smart_money: f64,
    pub bollinger_bands: f64,
    pub kmeans: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            volume_profile: 2.0,
            pivot_points: 1.5,
            trendlines: 1.2,
            fibonacci: 1.0,
            smart_money: 1.0,
            bollinger_bands: 0.8,
            kmeans: 0.5,
        }
    }
}

impl DetectorWeights {
    pub fn weight(&self, detector: DetectorName) -> f64 {
        match detector {
            DetectorName::VolumeProfile => self.volume_profile,
            DetectorName::PivotPoints => self.pivot_points,
            DetectorName::Trendlines => self.trendlines,
            DetectorName::Fibonacci => self.fibonacci,
            DetectorName::SmartMoney => self.smart_money,
            DetectorName::BollingerBands => self.bollinger_bands,
            DetectorName::KMeans => self.kmeans,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeParams {
    /// Grouping band as a fraction of the last close.
    pub tolerance_pct: f64,
    /// Levels closer than this fraction of the last close get boosted.
    pub proximity_pct: f64,
    pub proximity_boost: f64,
    /// Round merged values to this many places; `None` keeps the exact mean.
    pub decimals: Option<u32>,
    pub weights: DetectorWeights,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            tolerance_pct: 0.005,
            proximity_pct: 0.02,
            proximity_boost: 1.5,
            decimals: None,
            weights: DetectorWeights::default(),
        }
    }
}

// =============================================================================
// AnalyzerConfig
// =============================================================================

/// All parameters of one support/resistance analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Below this bar count the whole analysis short-circuits.
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,

    #[serde(default)]
    pub fibonacci: FibonacciParams,

    #[serde(default)]
    pub pivots: PivotParams,

    #[serde(default)]
    pub bollinger: BollingerParams,

    #[serde(default)]
    pub kmeans: KMeansParams,

    #[serde(default)]
    pub volume_profile: VolumeProfileParams,

    #[serde(default)]
    pub trendlines: TrendlineParams,

    #[serde(default)]
    pub smart_money: SmartMoneyParams,

    #[serde(default)]
    pub merge: MergeParams,

    /// Upper bound on consensus clusters in the summary.
    #[serde(default = "default_consensus_clusters")]
    pub consensus_clusters: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_bars: default_min_bars(),
            fibonacci: FibonacciParams::default(),
            pivots: PivotParams::default(),
            bollinger: BollingerParams::default(),
            kmeans: KMeansParams::default(),
            volume_profile: VolumeProfileParams::default(),
            trendlines: TrendlineParams::default(),
            smart_money: SmartMoneyParams::default(),
            merge: MergeParams::default(),
            consensus_clusters: default_consensus_clusters(),
        }
    }
}

// =============================================================================
// ProviderConfig
// =============================================================================

/// Market-data provider access, owned by whoever builds the client.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Never serialised; normally injected from the `FMP_KEY` env var.
    #[serde(default, skip_serializing)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// Bar interval requested when the caller does not specify one.
    #[serde(default = "default_interval")]
    pub default_interval: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            default_interval: default_interval(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &if self.has_api_key() { "<set>" } else { "<unset>" })
            .field("base_url", &self.base_url)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("default_interval", &self.default_interval)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration file for the keylevels binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    /// Address the REST API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            min_bars = config.analyzer.min_bars,
            bind_addr = %config.bind_addr,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply environment overrides: `FMP_KEY`, `KEYLEVELS_BIND_ADDR` and
    /// `KEYLEVELS_RATE_LIMIT`. `lookup` is normally `std::env::var(..).ok()`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("FMP_KEY").filter(|k| !k.trim().is_empty()) {
            self.provider.api_key = key.trim().to_string();
        }
        if let Some(addr) = lookup("KEYLEVELS_BIND_ADDR").filter(|a| !a.trim().is_empty()) {
            self.bind_addr = addr.trim().to_string();
        }
        if let Some(raw) = lookup("KEYLEVELS_RATE_LIMIT") {
            match raw.trim().parse::<u32>() {
                Ok(limit) => self.provider.rate_limit_per_minute = limit,
                Err(e) => warn!(value = %raw, error = %e, "ignoring invalid KEYLEVELS_RATE_LIMIT"),
            }
        }
    }
}
