use serde::Serialize;

/// Actual cost of a project against its budget. Amounts in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostReport {
    pub budget: u64,
    pub machinery: u64,
    pub delivered: u64,
    pub total: u64,
    /// Positive when over budget.
    pub deviation: i64,
    /// Total over budget in basis points; `None` without a budget.
    pub consumed_bp: Option<u64>,
}

impl CostReport {
    pub fn new(budget: u64, machinery: u64, delivered: u64) -> Self {
        let total = machinery.saturating_add(delivered);
        let deviation = i64::try_from(total).unwrap_or(i64::MAX)
            - i64::try_from(budget).unwrap_or(i64::MAX);
        let consumed_bp = (budget > 0).then(|| {
            let bp = u128::from(total) * 10_000 / u128::from(budget);
            u64::try_from(bp).unwrap_or(u64::MAX)
        });
        Self {
            budget,
            machinery,
            delivered,
            total,
            deviation,
            consumed_bp,
        }
    }

    pub fn over_budget(&self) -> bool {
        self.budget > 0 && self.deviation > 0
    }
}
