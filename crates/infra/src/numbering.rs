//! Sequential document numbers: `PREFIX{year}-{seq:05}`, e.g. `FAC2024-00042`.

/// Next number for `prefix` in `year`, continuing after the highest existing one.
///
/// Numbers with another prefix or year, or that do not parse, are ignored.
pub fn next_number<'a, I>(prefix: &str, year: i32, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let head = format!("{prefix}{year}-");
    let last = existing
        .into_iter()
        .filter_map(|n| n.strip_prefix(head.as_str()))
        .filter_map(|seq| seq.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{head}{:05}", u128::from(last) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_number_of_the_year() {
        assert_eq!(next_number("FAC", 2024, std::iter::empty()), "FAC2024-00001");
    }

    #[test]
    fn continues_from_the_highest_matching_number() {
        let existing = ["FAC2024-00007", "FAC2024-00003", "FAC2023-00099", "ALB2024-00500", "FAC2024-xx"];
        assert_eq!(next_number("FAC", 2024, existing), "FAC2024-00008");
    }

    #[test]
    fn new_year_restarts_the_sequence() {
        assert_eq!(next_number("REM", 2025, ["REM2024-00012"]), "REM2025-00001");
    }

    #[test]
    fn grows_past_five_digits() {
        assert_eq!(next_number("TRA", 2024, ["TRA2024-99999"]), "TRA2024-100000");
    }

    #[test]
    fn largest_sequences_do_not_wrap() {
        assert_eq!(next_number("FAC", 2024, ["FAC2024-4294967295"]), "FAC2024-4294967296");
        assert_eq!(
            next_number("FAC", 2024, ["FAC2024-18446744073709551615"]),
            "FAC2024-18446744073709551616"
        );
    }
}
