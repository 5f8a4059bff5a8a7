// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free numeric building blocks used by the level detectors.
// Every public function returns `Option<T>` so callers are forced to handle
// insufficient-data and numerical-edge-case scenarios.

pub mod atr;
pub mod bollinger;
pub mod stats;
