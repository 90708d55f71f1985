//! Field validators shared by the business modules.

use crate::error::{DomainError, DomainResult};

/// Trimmed, non-empty text.
pub fn required_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// `None` for blank input, trimmed text otherwise.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Largest amount a single document, line or movement may carry (one
/// thousand million euros, in cents).
pub const MAX_AMOUNT: u64 = 100_000_000_000;

/// Largest quantity a single line or movement may carry.
pub const MAX_QUANTITY: i64 = 1_000_000_000_000;

/// `value` in cents, within [`MAX_AMOUNT`].
pub fn bounded_amount(field: &str, value: u64) -> DomainResult<u64> {
    if value > MAX_AMOUNT {
        return Err(DomainError::validation(format!(
            "{field} cannot exceed {MAX_AMOUNT} cents"
        )));
    }
    Ok(value)
}

/// `value` with magnitude within [`MAX_QUANTITY`].
pub fn bounded_quantity(field: &str, value: i64) -> DomainResult<i64> {
    if value.unsigned_abs() > MAX_QUANTITY.unsigned_abs() {
        return Err(DomainError::validation(format!(
            "{field} cannot exceed {MAX_QUANTITY} in magnitude"
        )));
    }
    Ok(value)
}

/// `#RRGGBB` color.
pub fn hex_color(field: &str, value: &str) -> DomainResult<()> {
    let ok = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if ok {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "{field} must be a #RRGGBB color, got '{value}'"
        )))
    }
}
