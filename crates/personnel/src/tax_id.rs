//! Spanish personal tax identifiers: DNI (`12345678Z`) and NIE (`X1234567L`).

use gestiona_core::{DomainError, DomainResult};

const LETTERS: &[u8; 23] = b"TRWAGMYFPDXBNJZSQVHLCKE";

/// Control letter for the numeric part.
pub fn control_letter(number: u32) -> char {
    LETTERS[(number % 23) as usize] as char
}

/// Uppercase, strip separators, and verify the control letter.
pub fn normalize_tax_id(raw: &str) -> DomainResult<String> {
    let id: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let invalid = || DomainError::validation(format!("'{raw}' is not a valid DNI/NIE"));

    if id.len() != 9 || !id.is_ascii() {
        return Err(invalid());
    }
    let (body, letter) = id.split_at(8);
    let digits = match body.as_bytes()[0] {
        b'X' => format!("0{}", &body[1..]),
        b'Y' => format!("1{}", &body[1..]),
        b'Z' => format!("2{}", &body[1..]),
        _ => body.to_string(),
    };
    let number: u32 = digits
        .chars()
        .all(|c| c.is_ascii_digit())
        .then(|| digits.parse().ok())
        .flatten()
        .ok_or_else(invalid)?;
    if letter.chars().next() != Some(control_letter(number)) {
        return Err(DomainError::validation(format!(
            "'{raw}' has a wrong control letter"
        )));
    }
    Ok(id)
}
