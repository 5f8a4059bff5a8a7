// =============================================================================
// Level aggregation — flatten, score, merge, summarise
// =============================================================================
//
// Detector outputs are flattened into `Level`s, scored by detector weight and
// proximity to the last close, then grouped into merged support and
// resistance lists. A k-means pass over every detector value yields the
// consensus summary.

pub mod consensus;
pub mod flatten;
pub mod merge;

pub use consensus::{consensus_levels, ConsensusLevels};
pub use flatten::flatten_outputs;
pub use merge::{merge_levels, unmerged_levels, MergeError, MergedLevel, MergedLevels};
