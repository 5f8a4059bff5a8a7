// =============================================================================
// Merge & scoring
// =============================================================================
//
// score = detector weight × proximity, proximity = boost when the level sits
// within `proximity_pct` of the last close.
//
// Per kind, levels are sorted ascending and greedily grouped while each new
// value stays within `tolerance_pct × close` of the running group mean. A
// group collapses to its mean, attributed to its best-scoring member (ties go
// to the lower price). With `decimals` set, values are rounded and entries
// that land on the same price are folded together.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indicators::stats;
use crate::runtime_config::MergeParams;
use crate::types::{DetectorName, Level, LevelKind};

/// One merged support or resistance level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedLevel {
    /// Display source of the attributed member, e.g. "Fib 61.8%".
    pub source: String,
    pub detector: DetectorName,
    pub value: f64,
    pub score: f64,
    /// Number of raw levels folded into this entry.
    pub members: usize,
}

/// Merged output, each side ascending by price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedLevels {
    pub support: Vec<MergedLevel>,
    pub resistance: Vec<MergedLevel>,
    /// `false` when merging failed and the raw levels were passed through.
    pub merged: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("last close {0} is not a positive finite price")]
    InvalidClose(f64),
}

#[derive(Debug, Clone, Copy)]
struct Scored<'a> {
    level: &'a Level,
    score: f64,
}

pub fn merge_levels(levels: &[Level], last_close: f64, params: &MergeParams) -> Result<MergedLevels, MergeError> {
    if !last_close.is_finite() || last_close <= 0.0 {
        return Err(MergeError::InvalidClose(last_close));
    }

    let tolerance = params.tolerance_pct * last_close;
    let side = |kind: LevelKind| {
        let mut scored: Vec<Scored<'_>> = levels
            .iter()
            .filter(|l| l.kind == kind && l.value.is_finite())
            .map(|l| Scored {
                level: l,
                score: score(l, last_close, params),
            })
            .collect();
        scored.sort_by(|a, b| a.level.value.total_cmp(&b.level.value));
        let merged: Vec<MergedLevel> = group(&scored, tolerance).iter().map(|g| collapse(g)).collect();
        match params.decimals {
            Some(decimals) => round_and_fold(merged, decimals),
            None => merged,
        }
    };

    Ok(MergedLevels {
        support: side(LevelKind::Support),
        resistance: side(LevelKind::Resistance),
        merged: true,
    })
}

/// Pass-through used when merging fails: every finite level on its own,
/// ascending, unscored.
pub fn unmerged_levels(levels: &[Level]) -> MergedLevels {
    let side = |kind: LevelKind| {
        let mut out: Vec<MergedLevel> = levels
            .iter()
            .filter(|l| l.kind == kind && l.value.is_finite())
            .map(|l| MergedLevel {
                source: l.label.clone(),
                detector: l.source,
                value: l.value,
                score: 0.0,
                members: 1,
            })
            .collect();
        out.sort_by(|a, b| a.value.total_cmp(&b.value));
        out
    };

    MergedLevels {
        support: side(LevelKind::Support),
        resistance: side(LevelKind::Resistance),
        merged: false,
    }
}

fn score(level: &Level, last_close: f64, params: &MergeParams) -> f64 {
    let distance = (level.value - last_close).abs() / last_close;
    let proximity = if distance < params.proximity_pct {
        params.proximity_boost
    } else {
        1.0
    };
    level.weight * proximity
}

fn group<'a>(sorted: &[Scored<'a>], tolerance: f64) -> Vec<Vec<Scored<'a>>> {
    let mut groups: Vec<Vec<Scored<'a>>> = Vec::new();
    for item in sorted {
        let joins = groups
            .last()
            .is_some_and(|g| (item.level.value - group_mean(g)).abs() <= tolerance);
        if joins {
            if let Some(g) = groups.last_mut() {
                g.push(*item);
            }
        } else {
            groups.push(vec![*item]);
        }
    }
    groups
}

fn collapse(group: &[Scored<'_>]) -> MergedLevel {
    // Ascending input: strict `>` keeps the lower price on ties.
    let mut best = group[0];
    for item in &group[1..] {
        if item.score > best.score {
            best = *item;
        }
    }

    MergedLevel {
        source: best.level.label.clone(),
        detector: best.level.source,
        value: group_mean(group),
        score: best.score,
        members: group.len(),
    }
}

/// Round ascending entries; neighbours sharing a rounded price become one
/// entry keeping the better score (the lower one on ties).
fn round_and_fold(levels: Vec<MergedLevel>, decimals: u32) -> Vec<MergedLevel> {
    let mut out: Vec<MergedLevel> = Vec::with_capacity(levels.len());
    for mut level in levels {
        level.value = stats::round_to(level.value, decimals);
        match out.last_mut() {
            Some(prev) if prev.value == level.value => {
                let members = prev.members + level.members;
                if level.score > prev.score {
                    *prev = level;
                }
                prev.members = members;
            }
            _ => out.push(level),
        }
    }
    out
}

fn group_mean(group: &[Scored<'_>]) -> f64 {
    group.iter().map(|s| s.level.value).sum::<f64>() / group.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(value: f64, kind: LevelKind, source: DetectorName, weight: f64) -> Level {
        Level {
            value,
            kind,
            source,
            label: source.label().to_string(),
            weight,
        }
    }

    #[test]
    fn levels_within_tolerance_collapse() {
        // close 100 -> tolerance 0.5
        let levels = vec![
            level(95.0, LevelKind::Support, DetectorName::KMeans, 0.5),
            level(95.4, LevelKind::Support, DetectorName::VolumeProfile, 2.0),
        ];
        let merged = merge_levels(&levels, 100.0, &MergeParams::default()).unwrap();
        assert!(merged.merged);
        assert_eq!(merged.support.len(), 1);
        let m = &merged.support[0];
        assert!((m.value - 95.2).abs() < 1e-9, "{}", m.value);
        assert_eq!(m.detector, DetectorName::VolumeProfile);
        assert_eq!(m.source, "Volume Profile");
        assert_eq!(m.members, 2);
        assert!(merged.resistance.is_empty());
    }

    #[test]
    fn merged_value_keeps_full_precision_mean() {
        let levels = vec![
            level(10.001, LevelKind::Resistance, DetectorName::Fibonacci, 1.0),
            level(10.004, LevelKind::Resistance, DetectorName::PivotPoints, 1.5),
        ];
        let merged = merge_levels(&levels, 10.0, &MergeParams::default()).unwrap();
        assert_eq!(merged.resistance.len(), 1);
        assert!((merged.resistance[0].value - 10.0025).abs() < 1e-12);
    }

    #[test]
    fn sub_dollar_levels_stay_distinct() {
        // close 0.052 -> tolerance 0.00026, so the two levels never group.
        let levels = vec![
            level(0.0512, LevelKind::Support, DetectorName::KMeans, 0.5),
            level(0.0538, LevelKind::Support, DetectorName::VolumeProfile, 2.0),
        ];
        let merged = merge_levels(&levels, 0.052, &MergeParams::default()).unwrap();
        let values: Vec<f64> = merged.support.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![0.0512, 0.0538]);
    }

    #[test]
    fn rounding_folds_entries_sharing_a_price() {
        let levels = vec![
            level(0.0512, LevelKind::Support, DetectorName::KMeans, 0.5),
            level(0.0538, LevelKind::Support, DetectorName::VolumeProfile, 2.0),
        ];
        let params = MergeParams {
            decimals: Some(2),
            ..MergeParams::default()
        };
        let merged = merge_levels(&levels, 0.052, &params).unwrap();
        assert_eq!(merged.support.len(), 1);
        let m = &merged.support[0];
        assert_eq!(m.value, 0.05);
        assert_eq!(m.detector, DetectorName::VolumeProfile);
        assert_eq!(m.members, 2);
    }

    #[test]
    fn levels_beyond_tolerance_stay_separate() {
        let levels = vec![
            level(96.0, LevelKind::Support, DetectorName::PivotPoints, 1.5),
            level(95.0, LevelKind::Support, DetectorName::KMeans, 0.5),
        ];
        let merged = merge_levels(&levels, 100.0, &MergeParams::default()).unwrap();
        let values: Vec<f64> = merged.support.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![95.0, 96.0]);
        assert_eq!(merged.support[0].detector, DetectorName::KMeans);
        assert_eq!(merged.support[1].detector, DetectorName::PivotPoints);
    }

    #[test]
    fn proximity_boosts_nearby_levels() {
        let levels = vec![
            level(101.0, LevelKind::Resistance, DetectorName::Fibonacci, 1.0),
            level(110.0, LevelKind::Resistance, DetectorName::Fibonacci, 1.0),
        ];
        let merged = merge_levels(&levels, 100.0, &MergeParams::default()).unwrap();
        assert!((merged.resistance[0].score - 1.5).abs() < 1e-12);
        assert!((merged.resistance[1].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ties_go_to_lower_price() {
        let levels = vec![
            level(50.1, LevelKind::Resistance, DetectorName::SmartMoney, 1.0),
            level(50.0, LevelKind::Resistance, DetectorName::Fibonacci, 1.0),
        ];
        let merged = merge_levels(&levels, 40.0, &MergeParams::default()).unwrap();
        assert_eq!(merged.resistance.len(), 1);
        assert_eq!(merged.resistance[0].detector, DetectorName::Fibonacci);
    }

    #[test]
    fn invalid_close_errors_and_fallback_passes_through() {
        let levels = vec![
            level(2.0, LevelKind::Support, DetectorName::KMeans, 0.5),
            level(1.0, LevelKind::Support, DetectorName::KMeans, 0.5),
        ];
        assert_eq!(
            merge_levels(&levels, 0.0, &MergeParams::default()),
            Err(MergeError::InvalidClose(0.0))
        );
        let fallback = unmerged_levels(&levels);
        assert!(!fallback.merged);
        let values: Vec<f64> = fallback.support.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }
}
