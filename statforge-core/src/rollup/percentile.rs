//! Empirical percentile estimation over a bounded in-memory sample.

use statforge_model::PercentileProfile;

/// Compute {p25, p50, p75, p90} from an unordered sample set using
/// linear interpolation between order statistics.
///
/// An empty sample yields all zeros; a single sample yields that value
/// for every percentile. Pure function, no I/O.
pub fn profile(samples: &[f64]) -> PercentileProfile {
    if samples.is_empty() {
        return PercentileProfile::default();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    PercentileProfile {
        p25: interpolate(&sorted, 0.25),
        p50: interpolate(&sorted, 0.50),
        p75: interpolate(&sorted, 0.75),
        p90: interpolate(&sorted, 0.90),
    }
}

/// Order statistic at `percentile`, interpolating between the floor
/// and ceiling index by the fractional weight.
fn interpolate(sorted: &[f64], percentile: f64) -> f64 {
    let index = percentile * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = index - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}
