// =============================================================================
// Text report — human-readable rendering of an analysis
// =============================================================================

use std::fmt;

use crate::detectors::{DetectorOutput, DetectorStatus};
use crate::engine::{Analysis, AnalysisResult};
use crate::levels::MergedLevel;

const DECIMALS: usize = 4;

/// Render `analysis` as a plain-text report.
pub fn format_analysis(analysis: &Analysis) -> String {
    Report(analysis).to_string()
}

/// `Display` adapter over an [`Analysis`].
pub struct Report<'a>(pub &'a Analysis);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Analysis::InsufficientData { bars, required } => writeln!(
                f,
                "WARNING: insufficient data for analysis ({bars} bars, need at least {required})"
            ),
            Analysis::Complete(result) => write_result(f, result),
        }
    }
}

fn write_result(f: &mut fmt::Formatter<'_>, result: &AnalysisResult) -> fmt::Result {
    let symbol = result.symbol.as_deref().unwrap_or("series");
    writeln!(
        f,
        "=== {symbol} | {} bars | last close {:.prec$} ===",
        result.bars,
        result.last_close,
        prec = DECIMALS
    )?;

    for entry in &result.detectors {
        match &entry.status {
            DetectorStatus::Available { output } => {
                writeln!(f, "\n[{}]", entry.name)?;
                write_output(f, output)?;
            }
            DetectorStatus::Unavailable { reason } => {
                writeln!(f, "\n[{}] unavailable: {reason}", entry.name)?;
            }
        }
    }

    let tag = if result.merged.merged { "" } else { " (unmerged)" };
    writeln!(f, "\n--- Support{tag} ---")?;
    write_merged(f, &result.merged.support, result.merged.merged)?;
    writeln!(f, "--- Resistance{tag} ---")?;
    write_merged(f, &result.merged.resistance, result.merged.merged)?;

    if let Some(c) = &result.consensus {
        writeln!(f, "--- Consensus ---")?;
        writeln!(f, "  Strong resistance: {:.prec$}", c.strong_resistance, prec = DECIMALS)?;
        writeln!(f, "  Pivot zone:        {:.prec$}", c.pivot_zone, prec = DECIMALS)?;
        writeln!(f, "  Strong support:    {:.prec$}", c.strong_support, prec = DECIMALS)?;
    }
    Ok(())
}

fn write_output(f: &mut fmt::Formatter<'_>, output: &DetectorOutput) -> fmt::Result {
    match output {
        DetectorOutput::Scalar(v) => writeln!(f, "  {}", fmt_value(*v)),
        DetectorOutput::NamedLevels(levels) => {
            for level in levels {
                writeln!(f, "  {}: {}", level.name, fmt_value(level.value))?;
            }
            Ok(())
        }
        DetectorOutput::LevelList(values) => writeln!(f, "  {}", fmt_list(values)),
        DetectorOutput::SupportResistance {
            support,
            resistance,
        } => {
            writeln!(f, "  Support: {}", fmt_list(support))?;
            writeln!(f, "  Resistance: {}", fmt_list(resistance))
        }
    }
}

fn write_merged(f: &mut fmt::Formatter<'_>, levels: &[MergedLevel], scored: bool) -> fmt::Result {
    if levels.is_empty() {
        return writeln!(f, "  (none)");
    }
    // Highest price first reads naturally top-down.
    for level in levels.iter().rev() {
        if scored {
            writeln!(
                f,
                "  {:>12}  {:<20} score {:.2}  ({} merged)",
                fmt_value(level.value),
                level.source,
                level.score,
                level.members
            )?;
        } else {
            writeln!(f, "  {:>12}  {}", fmt_value(level.value), level.source)?;
        }
    }
    Ok(())
}

fn fmt_value(v: f64) -> String {
    format!("{v:.prec$}", prec = DECIMALS)
}

/// Comma-joined values, deduplicated after rounding.
fn fmt_list(values: &[f64]) -> String {
    let mut seen: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let s = fmt_value(*v);
        if !seen.contains(&s) {
            seen.push(s);
        }
    }
    if seen.is_empty() {
        "-".to_string()
    } else {
        seen.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{oscillating, series_from_closes};
    use crate::detectors::NamedLevel;
    use crate::engine::{DetectorEntry, SupportResistanceEngine};
    use crate::levels::MergedLevels;
    use crate::types::DetectorName;

    fn result_with(detectors: Vec<DetectorEntry>) -> AnalysisResult {
        AnalysisResult {
            id: "test".into(),
            symbol: Some("ABC".into()),
            created_at: "2024-01-02T00:00:00Z".into(),
            bars: 10,
            last_close: 1.5,
            detectors,
            merged: MergedLevels {
                support: Vec::new(),
                resistance: Vec::new(),
                merged: true,
            },
            consensus: None,
        }
    }

    #[test]
    fn insufficient_data_is_one_warning_line() {
        let text = format_analysis(&Analysis::InsufficientData { bars: 2, required: 3 });
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("WARNING"));
    }

    #[test]
    fn lists_are_rounded_and_deduplicated() {
        let result = result_with(vec![DetectorEntry {
            name: DetectorName::KMeans,
            status: DetectorStatus::Available {
                output: DetectorOutput::LevelList(vec![1.00001, 1.00002, 2.0]),
            },
        }]);
        let text = format_analysis(&Analysis::Complete(result));
        assert!(text.contains("1.0000, 2.0000"), "{text}");
        assert!(!text.contains("1.0000, 1.0000"));
    }

    #[test]
    fn unavailable_detectors_show_reason() {
        let result = result_with(vec![
            DetectorEntry {
                name: DetectorName::Fibonacci,
                status: DetectorStatus::Available {
                    output: DetectorOutput::NamedLevels(vec![NamedLevel::new("61.8%", 1.23456)]),
                },
            },
            DetectorEntry {
                name: DetectorName::VolumeProfile,
                status: DetectorStatus::Unavailable {
                    reason: "insufficient data: need 20 bars, have 10".into(),
                },
            },
        ]);
        let text = format_analysis(&Analysis::Complete(result));
        assert!(text.contains("61.8%: 1.2346"));
        assert!(text.contains("[Volume Profile] unavailable: insufficient data"));
        assert!(text.contains("(none)"));
    }

    #[test]
    fn full_report_has_every_section() {
        let series = series_from_closes(&oscillating(60, 10.0, 12.0, 10), 0.1);
        let analysis = SupportResistanceEngine::default().run_all_analysis(&series, Some("OSC"));
        let text = format_analysis(&analysis);
        for name in DetectorName::ALL {
            assert!(text.contains(&format!("[{name}]")), "missing {name}");
        }
        assert!(text.contains("--- Support ---"));
        assert!(text.contains("--- Resistance ---"));
        assert!(text.contains("--- Consensus ---"));
    }
}
