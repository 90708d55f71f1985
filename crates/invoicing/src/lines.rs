//! Commercial document lines and their totals.
//!
//! Quantities are in thousandths of a unit, prices in cents, discounts and tax
//! rates in basis points. Tax is rounded once per rate, not per line.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gestiona_core::validation::{MAX_AMOUNT, bounded_amount, bounded_quantity, optional_text, required_text};
use gestiona_core::{AggregateId, DomainError, DomainResult};

/// One thousandth of a unit.
pub const QUANTITY_SCALE: i64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    #[serde(default)]
    pub line_no: u32,
    #[serde(default)]
    pub product_id: Option<AggregateId>,
    #[serde(default)]
    pub sku: Option<String>,
    pub description: String,
    /// Thousandths of a unit.
    pub quantity: i64,
    /// Cents.
    pub unit_price: u64,
    #[serde(default)]
    pub discount_bp: u32,
    #[serde(default = "default_tax_rate")]
    pub tax_rate_bp: u32,
}

fn default_tax_rate() -> u32 {
    2_100
}

impl DocumentLine {
    /// Taxable base after discount, rounded half up to the cent.
    pub fn base(&self) -> u64 {
        let gross = u128::try_from(self.quantity)
            .unwrap_or(0)
            .saturating_mul(u128::from(self.unit_price));
        let net = gross.saturating_mul(u128::from(10_000 - self.discount_bp.min(10_000)));
        let divisor = QUANTITY_SCALE as u128 * 10_000;
        u64::try_from(net.saturating_add(divisor / 2) / divisor).unwrap_or(u64::MAX)
    }
}

/// Validate lines and renumber them from 1.
pub fn normalize_lines(lines: Vec<DocumentLine>) -> DomainResult<Vec<DocumentLine>> {
    if lines.is_empty() {
        return Err(DomainError::validation("a document needs at least one line"));
    }
    let lines = lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {}: quantity must be positive",
                    i + 1
                )));
            }
            if line.discount_bp > 10_000 {
                return Err(DomainError::validation(format!(
                    "line {}: discount cannot exceed 100%",
                    i + 1
                )));
            }
            if line.tax_rate_bp > 10_000 {
                return Err(DomainError::validation(format!(
                    "line {}: tax rate cannot exceed 100%",
                    i + 1
                )));
            }
            bounded_quantity(&format!("line {} quantity", i + 1), line.quantity)?;
            bounded_amount(&format!("line {} unit price", i + 1), line.unit_price)?;
            Ok(DocumentLine {
                line_no: (i + 1) as u32,
                sku: optional_text(line.sku.as_deref()),
                description: required_text("description", &line.description)?,
                ..line
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;

    let mut base = 0u64;
    for line in &lines {
        base = base.saturating_add(line.base());
        if base > MAX_AMOUNT {
            return Err(DomainError::validation(format!(
                "document base cannot exceed {MAX_AMOUNT} cents"
            )));
        }
    }
    Ok(lines)
}

/// Base and tax for one tax rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBucket {
    pub rate_bp: u32,
    pub base: u64,
    pub tax: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub base: u64,
    pub tax: u64,
    pub total: u64,
    pub breakdown: Vec<TaxBucket>,
}

impl DocumentTotals {
    pub fn compute(lines: &[DocumentLine]) -> Self {
        let mut by_rate: BTreeMap<u32, u64> = BTreeMap::new();
        for line in lines {
            let bucket = by_rate.entry(line.tax_rate_bp).or_default();
            *bucket = bucket.saturating_add(line.base());
        }
        let breakdown: Vec<TaxBucket> = by_rate
            .into_iter()
            .map(|(rate_bp, base)| TaxBucket {
                rate_bp,
                base,
                tax: gestiona_core::money::apply_bp(base, rate_bp),
            })
            .collect();
        let base = breakdown.iter().fold(0u64, |acc, b| acc.saturating_add(b.base));
        let tax = breakdown.iter().fold(0u64, |acc, b| acc.saturating_add(b.tax));
        Self {
            base,
            tax,
            total: base.saturating_add(tax),
            breakdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(quantity: i64, unit_price: u64, discount_bp: u32, tax_rate_bp: u32) -> DocumentLine {
        DocumentLine {
            line_no: 0,
            product_id: None,
            sku: None,
            description: "Caña".into(),
            quantity,
            unit_price,
            discount_bp,
            tax_rate_bp,
        }
    }

    #[test]
    fn line_base_applies_quantity_and_discount() {
        assert_eq!(line(2_000, 1_50, 0, 1_000).base(), 3_00);
        assert_eq!(line(1_500, 10_00, 1_000, 2_100).base(), 13_50);
        // 0.333 × 1.00 = 0.333 → 0.33
        assert_eq!(line(333, 1_00, 0, 2_100).base(), 33);
        assert_eq!(line(1_000, 10_00, 10_000, 2_100).base(), 0);
    }

    #[test]
    fn extreme_lines_saturate_instead_of_overflowing() {
        assert_eq!(line(i64::MAX, u64::MAX, 0, 2_100).base(), u64::MAX);
        let totals = DocumentTotals::compute(&[line(i64::MAX, u64::MAX, 0, 2_100)]);
        assert_eq!(totals.total, u64::MAX);
    }

    #[test]
    fn totals_round_tax_per_rate() {
        let lines = vec![
            line(1_000, 33, 0, 2_100),
            line(1_000, 33, 0, 2_100),
            line(1_000, 10_00, 0, 1_000),
        ];
        let totals = DocumentTotals::compute(&lines);
        assert_eq!(totals.breakdown.len(), 2);
        assert_eq!(totals.breakdown[0], TaxBucket { rate_bp: 1_000, base: 10_00, tax: 1_00 });
        // 0.66 × 21% = 0.1386 → 0.14 (per-line rounding would give 0.07 + 0.07)
        assert_eq!(totals.breakdown[1], TaxBucket { rate_bp: 2_100, base: 66, tax: 14 });
        assert_eq!(totals.base, 10_66);
        assert_eq!(totals.total, 10_66 + 1_14);
    }

    #[test]
    fn normalize_renumbers_and_validates() {
        let lines = normalize_lines(vec![line(1_000, 1, 0, 0), line(2_000, 1, 0, 0)]).unwrap();
        assert_eq!(lines[0].line_no, 1);
        assert_eq!(lines[1].line_no, 2);

        assert!(normalize_lines(vec![]).is_err());
        assert!(normalize_lines(vec![line(0, 1, 0, 0)]).is_err());
        assert!(normalize_lines(vec![line(1_000, 1, 10_001, 0)]).is_err());
        assert!(normalize_lines(vec![line(i64::MAX, 1, 0, 0)]).is_err());
        assert!(normalize_lines(vec![line(1_000, u64::MAX, 0, 0)]).is_err());
        // Each line within bounds, the document over them.
        let big = line(1_000_000, MAX_AMOUNT / 1_000, 0, 0);
        assert!(normalize_lines(vec![big.clone()]).is_ok());
        assert!(normalize_lines(vec![big.clone(), big]).is_err());
        let mut blank = line(1_000, 1, 0, 0);
        blank.description = "  ".into();
        assert!(normalize_lines(vec![blank]).is_err());
    }

    proptest! {
        #[test]
        fn total_is_base_plus_tax(
            raw in prop::collection::vec(
                (1i64..100_000, 0u64..1_000_000, 0u32..=10_000, prop::sample::select(vec![0u32, 400, 1_000, 2_100])),
                1..20,
            )
        ) {
            let lines: Vec<_> = raw.into_iter().map(|(q, p, d, t)| line(q, p, d, t)).collect();
            let totals = DocumentTotals::compute(&lines);
            prop_assert_eq!(totals.total, totals.base + totals.tax);
            prop_assert_eq!(totals.base, lines.iter().map(DocumentLine::base).sum::<u64>());
            for bucket in &totals.breakdown {
                prop_assert!(bucket.tax <= bucket.base);
            }
        }
    }
}
