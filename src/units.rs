//! # Unit Formatting Module
//!
//! Human-readable formatting for byte counts, durations and transfer rates.
//! Pure functions, no state.

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

/// Time units from smallest to largest, with their size in seconds
const TIME_UNITS: &[(f64, &str)] = &[
    (1e-9, "ns"),
    (1e-6, "µs"),
    (1e-3, "ms"),
    (1.0, "s"),
    (60.0, "m"),
    (3600.0, "h"),
];

/// Scale a byte count to the largest binary unit that keeps it >= 1
fn scale_size(bytes: f64) -> (f64, &'static str) {
    if bytes == 0.0 || !bytes.is_finite() {
        return (0.0, SIZE_UNITS[0]);
    }

    let mut value = bytes;
    let mut unit_index = 0;
    while value.abs() >= 1024.0 && unit_index < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    (value, SIZE_UNITS[unit_index])
}

/// Format a byte count, e.g. `1.5MB`
pub fn format_data_volume(bytes: u64) -> String {
    let (value, unit) = scale_size(bytes as f64);
    format!("{:.1}{}", value, unit)
}

/// Format a duration in seconds, e.g. `2.5m`
pub fn format_time(seconds: f64) -> String {
    if seconds == 0.0 || !seconds.is_finite() {
        return "0.0s".to_string();
    }

    for (threshold, unit) in TIME_UNITS.iter().rev() {
        if seconds.abs() >= *threshold {
            return format!("{:.1}{}", seconds / threshold, unit);
        }
    }

    // Below one nanosecond
    format!("{:.1}s", seconds)
}

/// Format a rate in bytes per second, e.g. `12.0MB/s`
pub fn format_data_rate(bytes_per_second: f64) -> String {
    let (value, unit) = scale_size(bytes_per_second);
    format!("{:.1}{}/s", value, unit)
}
