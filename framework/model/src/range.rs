/// Parse the numeric magnitude out of a range display string
///
/// Accepts `± N`, `+/- N` and a bare `N`. Returns `None` if no number can be read.
pub fn parse_range(display: &str) -> Option<f64> {
    let trimmed = display.trim();
    let number = trimmed
        .strip_prefix('±')
        .or_else(|| trimmed.strip_prefix("+/-"))
        .unwrap_or(trimmed)
        .trim();

    number.parse::<f64>().ok()
}

/// Format a range magnitude the way the dashboard displays it
pub fn format_range(magnitude: f64) -> String {
    format!("± {}", magnitude)
}
