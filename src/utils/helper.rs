use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since epoch
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Median of a set of prices. Even-sized sets use the mean of the two
/// central values. `None` for an empty set.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        let (low, high) = (sorted[mid - 1], sorted[mid]);
        Some(low + (high - low) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Relative distance of `value` from `reference`, as a fraction (0.05 = 5%).
pub fn relative_deviation(value: f64, reference: f64) -> f64 {
    (value - reference).abs() / reference
}
