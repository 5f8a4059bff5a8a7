// =============================================================================
// Rate Limiter — sliding one-minute window for provider requests
// =============================================================================
//
// Financial Modeling Prep plans cap requests per minute. Every outgoing
// request first calls `acquire`, which waits until the window has room.
// A limit of zero disables throttling.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const WINDOW: Duration = Duration::from_secs(60);

/// Thread-safe sliding-window limiter.
pub struct RateLimiter {
    limit_per_minute: u32,
    sent: Mutex<VecDeque<Instant>>,
    total_requests: AtomicU64,
    total_waits: AtomicU64,
}

/// Serialisable view of the limiter state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub limit_per_minute: u32,
    pub used_last_minute: u32,
    pub total_requests: u64,
    pub total_waits: u64,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit_per_minute,
            sent: Mutex::new(VecDeque::new()),
            total_requests: AtomicU64::new(0),
            total_waits: AtomicU64::new(0),
        }
    }

    /// Wait until a request slot is free, then claim it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire_at(Instant::now()) {
                Ok(()) => return,
                Err(wait) => {
                    self.total_waits.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        limit_per_minute = self.limit_per_minute,
                        wait_ms = wait.as_millis() as u64,
                        "provider rate limit reached, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Claim a slot if one is free right now.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now()).is_ok()
    }

    /// Claim a slot at `now`, or return how long until the oldest request
    /// leaves the window.
    fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        if self.limit_per_minute == 0 {
            self.total_requests.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let mut sent = self.sent.lock();
        while sent
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= WINDOW)
        {
            sent.pop_front();
        }

        if sent.len() < self.limit_per_minute as usize {
            sent.push_back(now);
            let total = self.total_requests.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(used = sent.len(), total, "provider request slot claimed");
            return Ok(());
        }

        let oldest = sent.front().copied().unwrap_or(now);
        Err((oldest + WINDOW).saturating_duration_since(now).max(Duration::from_millis(1)))
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        let now = Instant::now();
        let used = self
            .sent
            .lock()
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < WINDOW)
            .count();
        RateLimitSnapshot {
            limit_per_minute: self.limit_per_minute,
            used_last_minute: used as u32,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_waits: self.total_waits.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit_per_minute", &self.limit_per_minute)
            .field("used_last_minute", &self.sent.lock().len())
            .field("total_requests", &self.total_requests.load(Ordering::Relaxed))
            .finish()
    }
}
