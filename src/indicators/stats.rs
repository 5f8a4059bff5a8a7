// =============================================================================
// Descriptive statistics helpers
// =============================================================================
//
// Small, allocation-light helpers shared by the detectors. Every function
// returns `Option<f64>` and yields `None` on empty input or when the result
// would not be finite.

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    m.is_finite().then_some(m)
}

/// Population standard deviation (ddof = 0).
pub fn std_population(values: &[f64]) -> Option<f64> {
    std_with_ddof(values, 0)
}

/// Sample standard deviation (ddof = 1). Needs at least two values.
pub fn std_sample(values: &[f64]) -> Option<f64> {
    std_with_ddof(values, 1)
}

fn std_with_ddof(values: &[f64], ddof: usize) -> Option<f64> {
    if values.len() <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    let sd = (ss / (values.len() - ddof) as f64).sqrt();
    sd.is_finite().then_some(sd)
}

/// Median. NaNs sort last and therefore only matter when they dominate.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let m = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    m.is_finite().then_some(m)
}

/// Percentile `q` in `[0, 100]` with linear interpolation between the closest
/// ranks (the numpy default).
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let p = sorted[lo] + (sorted[hi] - sorted[lo]) * frac;
    p.is_finite().then_some(p)
}

/// Round to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
