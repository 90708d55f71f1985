//! ISO 13616 IBAN and ISO 9362 BIC checks.

use gestiona_core::{DomainError, DomainResult};

/// Strip spaces, uppercase, and verify the mod-97 checksum.
pub fn normalize_iban(raw: &str) -> DomainResult<String> {
    let iban: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if !(15..=34).contains(&iban.len()) || !iban.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DomainError::validation(format!("'{raw}' is not an IBAN")));
    }
    let (country, rest) = iban.split_at(2);
    if !country.chars().all(|c| c.is_ascii_uppercase())
        || !rest[..2].chars().all(|c| c.is_ascii_digit())
    {
        return Err(DomainError::validation(format!("'{raw}' is not an IBAN")));
    }
    if country == "ES" && iban.len() != 24 {
        return Err(DomainError::validation("Spanish IBANs have 24 characters"));
    }
    if mod97(&iban[4..], &iban[..4]) != 1 {
        return Err(DomainError::validation(format!(
            "IBAN '{iban}' has an invalid check digit"
        )));
    }
    Ok(iban)
}

/// Check digits for a country and BBAN, e.g. `("ES", "21000418450200051332")` → `"91"`.
pub fn check_digits(country: &str, bban: &str) -> String {
    let head = format!("{country}00");
    format!("{:02}", 98 - mod97(bban, &head))
}

/// Remainder of `bban ++ head` (letters as 10..35) modulo 97, computed digit by digit.
fn mod97(bban: &str, head: &str) -> u32 {
    bban.chars().chain(head.chars()).fold(0u32, |acc, c| {
        match c.to_digit(36) {
            Some(v) if v >= 10 => (acc * 100 + v) % 97,
            Some(v) => (acc * 10 + v) % 97,
            None => acc,
        }
    })
}

/// 8 or 11 characters: bank (4 letters), country (2 letters), location and branch.
pub fn is_valid_bic(bic: &str) -> bool {
    let bic = bic.trim();
    bic.is_ascii()
        && (bic.len() == 8 || bic.len() == 11)
        && bic[..6].chars().all(|c| c.is_ascii_uppercase())
        && bic[6..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}
