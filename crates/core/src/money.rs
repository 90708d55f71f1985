//! Amounts are integer cents of euro everywhere in the domain.

/// `123456` → `"1234.56"` (machine format, e.g. SEPA XML).
pub fn format_decimal(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// `123456` → `"1.234,56 €"` (Spanish print format).
pub fn format_eur(cents: u64) -> String {
    let units = (cents / 100).to_string();
    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    format!("{grouped},{:02} €", cents % 100)
}

/// `amount × bp / 10000`, rounded half up.
pub fn apply_bp(amount: u64, bp: u32) -> u64 {
    let scaled = (u128::from(amount) * u128::from(bp) + 5_000) / 10_000;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}
