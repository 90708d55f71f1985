//! Spanish print formatting for quantities, rates, dates and amounts in words.

use chrono::NaiveDate;

use gestiona_invoicing::QUANTITY_SCALE;

/// `1500` thousandths → `"1,5"`.
pub fn quantity(thousandths: i64) -> String {
    let sign = if thousandths < 0 { "-" } else { "" };
    let abs = thousandths.unsigned_abs();
    let scale = QUANTITY_SCALE as u64;
    let (units, frac) = (abs / scale, abs % scale);
    if frac == 0 {
        return format!("{sign}{units}");
    }
    let frac = format!("{frac:03}");
    format!("{sign}{units},{}", frac.trim_end_matches('0'))
}

/// `2100` basis points → `"21%"`, `1050` → `"10,5%"`.
pub fn percent(bp: u32) -> String {
    let (units, frac) = (bp / 100, bp % 100);
    if frac == 0 {
        format!("{units}%")
    } else {
        let frac = format!("{frac:02}");
        format!("{units},{}%", frac.trim_end_matches('0'))
    }
}

pub fn date(d: NaiveDate) -> String {
    d.format("%d/%m/%Y").to_string()
}

const UNITS: [&str; 30] = [
    "cero", "uno", "dos", "tres", "cuatro", "cinco", "seis", "siete", "ocho", "nueve", "diez",
    "once", "doce", "trece", "catorce", "quince", "dieciséis", "diecisiete", "dieciocho",
    "diecinueve", "veinte", "veintiuno", "veintidós", "veintitrés", "veinticuatro",
    "veinticinco", "veintiséis", "veintisiete", "veintiocho", "veintinueve",
];

const TENS: [&str; 10] = [
    "", "", "", "treinta", "cuarenta", "cincuenta", "sesenta", "setenta", "ochenta", "noventa",
];

const HUNDREDS: [&str; 10] = [
    "", "ciento", "doscientos", "trescientos", "cuatrocientos", "quinientos", "seiscientos",
    "setecientos", "ochocientos", "novecientos",
];

fn below_thousand(n: u64) -> String {
    debug_assert!(n < 1_000);
    if n == 100 {
        return "cien".to_string();
    }
    let (h, rest) = ((n / 100) as usize, n % 100);
    let rest_words = match rest {
        0 => String::new(),
        1..=29 => UNITS[rest as usize].to_string(),
        _ if rest % 10 == 0 => TENS[(rest / 10) as usize].to_string(),
        _ => format!("{} y {}", TENS[(rest / 10) as usize], UNITS[(rest % 10) as usize]),
    };
    match (h, rest_words.is_empty()) {
        (0, _) => rest_words,
        (_, true) => HUNDREDS[h].to_string(),
        (_, false) => format!("{} {}", HUNDREDS[h], rest_words),
    }
}

/// "uno" → "un" in front of a noun ("un euro", "veintiún mil").
fn apocopate(words: String) -> String {
    if let Some(stem) = words.strip_suffix("veintiuno") {
        format!("{stem}veintiún")
    } else if let Some(stem) = words.strip_suffix("uno") {
        format!("{stem}un")
    } else {
        words
    }
}

/// Cardinal number in Spanish words.
pub fn number_in_words(n: u64) -> String {
    if n == 0 {
        return UNITS[0].to_string();
    }
    let millions = n / 1_000_000;
    let thousands = (n / 1_000) % 1_000;
    let rest = n % 1_000;

    let mut parts = Vec::new();
    match millions {
        0 => {}
        1 => parts.push("un millón".to_string()),
        m => parts.push(format!("{} millones", apocopate(number_in_words(m)))),
    }
    match thousands {
        0 => {}
        1 => parts.push("mil".to_string()),
        t => parts.push(format!("{} mil", apocopate(below_thousand(t)))),
    }
    if rest > 0 {
        parts.push(below_thousand(rest));
    }
    parts.join(" ")
}

/// `123456` cents → `"mil doscientos treinta y cuatro euros con cincuenta y seis céntimos"`.
pub fn amount_in_words(cents: u64) -> String {
    let (euros, cents) = (cents / 100, cents % 100);
    let euro_word = if euros == 1 { "euro" } else { "euros" };
    let mut out = format!("{} {euro_word}", apocopate(number_in_words(euros)));
    if cents > 0 {
        let cent_word = if cents == 1 { "céntimo" } else { "céntimos" };
        out.push_str(&format!(" con {} {cent_word}", apocopate(number_in_words(cents))));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_and_rates() {
        assert_eq!(quantity(2_000), "2");
        assert_eq!(quantity(1_500), "1,5");
        assert_eq!(quantity(333), "0,333");
        assert_eq!(percent(2_100), "21%");
        assert_eq!(percent(1_050), "10,5%");
        assert_eq!(percent(25), "0,25%");
    }

    #[test]
    fn numbers_in_words() {
        assert_eq!(number_in_words(16), "dieciséis");
        assert_eq!(number_in_words(45), "cuarenta y cinco");
        assert_eq!(number_in_words(100), "cien");
        assert_eq!(number_in_words(101), "ciento uno");
        assert_eq!(number_in_words(1_000), "mil");
        assert_eq!(number_in_words(21_000), "veintiún mil");
        assert_eq!(number_in_words(2_500_000), "dos millones quinientos mil");
        assert_eq!(number_in_words(1_001_001), "un millón mil uno");
    }

    #[test]
    fn amounts_in_words() {
        assert_eq!(
            amount_in_words(123_456),
            "mil doscientos treinta y cuatro euros con cincuenta y seis céntimos"
        );
        assert_eq!(amount_in_words(100), "un euro");
        assert_eq!(amount_in_words(2_101), "veintiún euros con un céntimo");
        assert_eq!(amount_in_words(0), "cero euros");
    }
}
