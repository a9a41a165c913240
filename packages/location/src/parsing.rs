//! Shared parsing utilities for numeric cells in reference data and feeds.

/// Parses a non-negative count.
///
/// Accepts surrounding whitespace, thousands separators (`"1,234"`) and
/// whole-valued decimals (`"1234.0"`, as exported by spreadsheets). Returns
/// `None` for anything else, including negative and fractional values.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn parse_count(s: &str) -> Option<u64> {
    let cleaned = s.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(value) = cleaned.parse::<u64>() {
        return Some(value);
    }
    let value = cleaned.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return None;
    }
    Some(value as u64)
}

/// Parses an optional decimal. Returns `None` for blank or unparseable
/// cells.
#[must_use]
pub fn parse_decimal(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}
