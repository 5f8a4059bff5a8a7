// =============================================================================
// Central Application State — keylevels server
// =============================================================================
//
// Shared across all request handlers via `Arc<AppState>`.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the config and the recent-analysis ring.
//   - The provider client carries its own rate limiter behind an Arc.
// =============================================================================

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::engine::{AnalysisResult, SupportResistanceEngine};
use crate::provider::{FmpClient, RateLimitSnapshot};
use crate::runtime_config::RuntimeConfig;

/// Maximum number of analyses retained for `GET /api/v1/analyses`.
pub const MAX_RECENT_ANALYSES: usize = 50;

/// Operational summary for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state_version: u64,
    pub uptime_secs: u64,
    pub recent_analyses: usize,
    pub provider_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSnapshot>,
}

pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every config change and stored analysis.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: RwLock<RuntimeConfig>,
    /// Where config updates are persisted; `None` keeps them in memory.
    pub config_path: Option<PathBuf>,

    // ── Market data ─────────────────────────────────────────────────────
    /// `None` when no API key is configured.
    pub provider: Option<Arc<FmpClient>>,

    // ── Results ─────────────────────────────────────────────────────────
    pub recent: RwLock<VecDeque<AnalysisResult>>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig, config_path: Option<PathBuf>, provider: Option<Arc<FmpClient>>) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            runtime_config: RwLock::new(config),
            config_path,
            provider,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_ANALYSES)),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Engine ──────────────────────────────────────────────────────────

    /// Engine bound to a snapshot of the current analyzer config.
    pub fn engine(&self) -> SupportResistanceEngine {
        SupportResistanceEngine::new(self.runtime_config.read().analyzer.clone())
    }

    // ── Recent analyses ─────────────────────────────────────────────────

    /// Store a result; the oldest entry is evicted beyond
    /// [`MAX_RECENT_ANALYSES`].
    pub fn push_analysis(&self, result: AnalysisResult) {
        {
            let mut recent = self.recent.write();
            recent.push_back(result);
            while recent.len() > MAX_RECENT_ANALYSES {
                recent.pop_front();
            }
        }
        self.increment_version();
    }

    /// Stored results, oldest first.
    pub fn recent_analyses(&self) -> Vec<AnalysisResult> {
        self.recent.read().iter().cloned().collect()
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state_version: self.current_state_version(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            recent_analyses: self.recent.read().len(),
            provider_configured: self.provider.is_some(),
            rate_limit: self.provider.as_ref().map(|p| p.rate_limiter().snapshot()),
        }
    }
}
