// =============================================================================
// Market-data provider
// =============================================================================

pub mod client;
pub mod rate_limit;

pub use client::{FmpClient, ProviderError};
pub use rate_limit::{RateLimitSnapshot, RateLimiter};
