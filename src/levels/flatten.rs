// =============================================================================
// Flatten detector outputs into typed levels
// =============================================================================
//
// Role assignment:
//   Fibonacci      0% / 23.6% / 38.2% resist, 61.8% / 100% support, 50% both
//   NamedLevels    name contains "Support" or "Resistance"; others are
//                  informational (Bollinger middle, VWAP) and skipped
//   LevelList      lowest value supports, highest value resists
//   Scalar         both sides
// Non-finite values never leave this module.

use crate::detectors::{DetectorOutput, NamedLevel};
use crate::runtime_config::DetectorWeights;
use crate::types::{DetectorName, Level, LevelKind};

const FIB_RESISTANCE: [&str; 3] = ["0%", "23.6%", "38.2%"];
const FIB_SUPPORT: [&str; 2] = ["61.8%", "100%"];
const FIB_BOTH: &str = "50%";

/// Flatten every `(detector, output)` pair into levels.
pub fn flatten_outputs<'a>(
    outputs: impl IntoIterator<Item = (DetectorName, &'a DetectorOutput)>,
    weights: &DetectorWeights,
) -> Vec<Level> {
    outputs
        .into_iter()
        .flat_map(|(detector, output)| flatten_output(detector, output, weights.weight(detector)))
        .collect()
}

fn flatten_output(detector: DetectorName, output: &DetectorOutput, weight: f64) -> Vec<Level> {
    let level = |value: f64, kind: LevelKind, label: String| Level {
        value,
        kind,
        source: detector,
        label,
        weight,
    };
    let plain = || detector.label().to_string();

    let mut levels = Vec::new();
    match output {
        DetectorOutput::Scalar(v) => {
            levels.push(level(*v, LevelKind::Support, plain()));
            levels.push(level(*v, LevelKind::Resistance, plain()));
        }
        DetectorOutput::NamedLevels(named) if detector == DetectorName::Fibonacci => {
            for NamedLevel { name, value } in named {
                let label = format!("Fib {name}");
                for kind in fibonacci_kinds(name) {
                    levels.push(level(*value, *kind, label.clone()));
                }
            }
        }
        DetectorOutput::NamedLevels(named) => {
            for NamedLevel { name, value } in named {
                if name.contains("Support") {
                    levels.push(level(*value, LevelKind::Support, plain()));
                } else if name.contains("Resistance") {
                    levels.push(level(*value, LevelKind::Resistance, plain()));
                }
            }
        }
        DetectorOutput::LevelList(values) => {
            let finite = || values.iter().copied().filter(|v| v.is_finite());
            if let Some(low) = finite().min_by(f64::total_cmp) {
                levels.push(level(low, LevelKind::Support, plain()));
            }
            if let Some(high) = finite().max_by(f64::total_cmp) {
                levels.push(level(high, LevelKind::Resistance, plain()));
            }
        }
        DetectorOutput::SupportResistance {
            support,
            resistance,
        } => {
            levels.extend(support.iter().map(|&v| level(v, LevelKind::Support, plain())));
            levels.extend(resistance.iter().map(|&v| level(v, LevelKind::Resistance, plain())));
        }
    }

    levels.retain(|l| l.value.is_finite());
    levels
}

fn fibonacci_kinds(name: &str) -> &'static [LevelKind] {
    if FIB_RESISTANCE.contains(&name) {
        &[LevelKind::Resistance]
    } else if FIB_SUPPORT.contains(&name) {
        &[LevelKind::Support]
    } else if name == FIB_BOTH {
        &[LevelKind::Support, LevelKind::Resistance]
    } else {
        &[]
    }
}
