//! Number formatting utilities.

/// Format a ratio in [0, 1] as a whole percentage.
#[must_use]
pub fn format_percent(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

/// Format a cost in USD.
#[must_use]
pub fn format_cost(value: f64) -> String {
    if value > 0.0 && value < 0.01 {
        format!("${value:.4}")
    } else {
        format!("${value:.2}")
    }
}

/// Format a latency in milliseconds, switching to seconds past one second.
#[must_use]
pub fn format_ms(ms: f64) -> String {
    if ms >= 1_000.0 {
        format!("{:.1}s", ms / 1_000.0)
    } else {
        format!("{ms:.0}ms")
    }
}
