use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{optional_text, required_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, DomainError, DomainResult, TenantId,
};
use gestiona_events::{Event, TenantScoped};

gestiona_core::aggregate_id_newtype!(
    /// Payment method (forma de pago) identifier.
    PaymentMethodId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Cash,
    Card,
    BankTransfer,
    DirectDebit,
    Check,
    Other,
}

/// One due date of a payment schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    /// Days after the issue date.
    pub days: u32,
    /// Share of the amount in basis points (10000 = 100%).
    pub share_bp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueInstallment {
    pub due_date: NaiveDate,
    pub amount: u64,
}

/// Split `amount` over `installments`; the rounding remainder lands on the last one.
pub fn schedule(
    installments: &[Installment],
    amount: u64,
    issue_date: NaiveDate,
) -> Vec<DueInstallment> {
    let mut allocated = 0u64;
    let last = installments.len().saturating_sub(1);
    installments
        .iter()
        .enumerate()
        .map(|(i, inst)| {
            let share = if i == last {
                amount.saturating_sub(allocated)
            } else {
                let part = u128::from(amount) * u128::from(inst.share_bp) / 10_000;
                u64::try_from(part).unwrap_or(amount).min(amount - allocated)
            };
            allocated = allocated.saturating_add(share);
            DueInstallment {
                due_date: issue_date
                    .checked_add_days(Days::new(u64::from(inst.days)))
                    .unwrap_or(issue_date),
                amount: share,
            }
        })
        .collect()
}

fn validate_installments(installments: &[Installment]) -> DomainResult<()> {
    if installments.is_empty() {
        return Err(DomainError::validation("at least one installment is required"));
    }
    if installments.iter().any(|i| i.share_bp == 0) {
        return Err(DomainError::validation("every installment needs a positive share"));
    }
    let total: u64 = installments.iter().map(|i| u64::from(i.share_bp)).sum();
    if total != 10_000 {
        return Err(DomainError::validation(format!(
            "installment shares must add up to 100% (got {}.{:02}%)",
            total / 100,
            total % 100
        )));
    }
    if installments.windows(2).any(|w| w[1].days <= w[0].days) {
        return Err(DomainError::validation("installment days must be ascending"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    pub code: String,
    pub name: String,
    pub kind: PaymentKind,
    #[serde(default = "immediate")]
    pub installments: Vec<Installment>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

fn immediate() -> Vec<Installment> {
    vec![Installment {
        days: 0,
        share_bp: 10_000,
    }]
}

impl PaymentMethodDetails {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.code = required_text("code", &self.code)?.to_uppercase();
        self.name = required_text("name", &self.name)?;
        self.notes = optional_text(self.notes.as_deref());
        validate_installments(&self.installments)?;
        Ok(self)
    }
}

/// Aggregate root: PaymentMethod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentMethod {
    id: PaymentMethodId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    #[serde(flatten)]
    details: PaymentMethodDetails,
    active: bool,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl PaymentMethod {
    pub fn empty(id: PaymentMethodId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: PaymentMethodDetails {
                code: String::new(),
                name: String::new(),
                kind: PaymentKind::Other,
                installments: immediate(),
                is_default: false,
                notes: None,
            },
            active: true,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> PaymentMethodId {
        self.id
    }

    pub fn details(&self) -> &PaymentMethodDetails {
        &self.details
    }

    pub fn code(&self) -> &str {
        &self.details.code
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn schedule(&self, amount: u64, issue_date: NaiveDate) -> Vec<DueInstallment> {
        schedule(&self.details.installments, amount, issue_date)
    }
}

impl AggregateRoot for PaymentMethod {
    type Id = PaymentMethodId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentMethod {
    pub tenant_id: TenantId,
    pub payment_method_id: PaymentMethodId,
    pub details: PaymentMethodDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePaymentMethod {
    pub tenant_id: TenantId,
    pub payment_method_id: PaymentMethodId,
    pub details: PaymentMethodDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPaymentMethodActive {
    pub tenant_id: TenantId,
    pub payment_method_id: PaymentMethodId,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePaymentMethod {
    pub tenant_id: TenantId,
    pub payment_method_id: PaymentMethodId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethodCommand {
    Create(CreatePaymentMethod),
    Update(UpdatePaymentMethod),
    SetActive(SetPaymentMethodActive),
    Delete(DeletePaymentMethod),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodCreated {
    pub tenant_id: TenantId,
    pub payment_method_id: PaymentMethodId,
    pub details: PaymentMethodDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodUpdated {
    pub tenant_id: TenantId,
    pub payment_method_id: PaymentMethodId,
    pub details: PaymentMethodDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodActivationChanged {
    pub tenant_id: TenantId,
    pub payment_method_id: PaymentMethodId,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodDeleted {
    pub tenant_id: TenantId,
    pub payment_method_id: PaymentMethodId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethodEvent {
    PaymentMethodCreated(PaymentMethodCreated),
    PaymentMethodUpdated(PaymentMethodUpdated),
    PaymentMethodActivationChanged(PaymentMethodActivationChanged),
    PaymentMethodDeleted(PaymentMethodDeleted),
}

impl Event for PaymentMethodEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentMethodEvent::PaymentMethodCreated(_) => "treasury.payment_method.created",
            PaymentMethodEvent::PaymentMethodUpdated(_) => "treasury.payment_method.updated",
            PaymentMethodEvent::PaymentMethodActivationChanged(_) => {
                "treasury.payment_method.activation_changed"
            }
            PaymentMethodEvent::PaymentMethodDeleted(_) => "treasury.payment_method.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentMethodEvent::PaymentMethodCreated(e) => e.occurred_at,
            PaymentMethodEvent::PaymentMethodUpdated(e) => e.occurred_at,
            PaymentMethodEvent::PaymentMethodActivationChanged(e) => e.occurred_at,
            PaymentMethodEvent::PaymentMethodDeleted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for PaymentMethodEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            PaymentMethodEvent::PaymentMethodCreated(e) => e.tenant_id,
            PaymentMethodEvent::PaymentMethodUpdated(e) => e.tenant_id,
            PaymentMethodEvent::PaymentMethodActivationChanged(e) => e.tenant_id,
            PaymentMethodEvent::PaymentMethodDeleted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for PaymentMethod {
    type Command = PaymentMethodCommand;
    type Event = PaymentMethodEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentMethodEvent::PaymentMethodCreated(e) => {
                self.id = e.payment_method_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.active = true;
                self.created = true;
            }
            PaymentMethodEvent::PaymentMethodUpdated(e) => {
                self.details = e.details.clone();
            }
            PaymentMethodEvent::PaymentMethodActivationChanged(e) => {
                self.active = e.active;
            }
            PaymentMethodEvent::PaymentMethodDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentMethodCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("payment method already exists"));
                }
                Ok(vec![PaymentMethodEvent::PaymentMethodCreated(PaymentMethodCreated {
                    tenant_id: cmd.tenant_id,
                    payment_method_id: cmd.payment_method_id,
                    details: cmd.details.clone().normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PaymentMethodCommand::Update(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.payment_method_id)?;
                let details = cmd.details.clone().normalized()?;
                if details.is_default && !self.active {
                    return Err(DomainError::invariant(
                        "an inactive payment method cannot be the default",
                    ));
                }
                if details == self.details {
                    return Ok(vec![]);
                }
                Ok(vec![PaymentMethodEvent::PaymentMethodUpdated(PaymentMethodUpdated {
                    tenant_id: cmd.tenant_id,
                    payment_method_id: cmd.payment_method_id,
                    details,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PaymentMethodCommand::SetActive(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.payment_method_id)?;
                if !cmd.active && self.details.is_default {
                    return Err(DomainError::invariant(
                        "the default payment method cannot be deactivated",
                    ));
                }
                if self.active == cmd.active {
                    return Ok(vec![]);
                }
                Ok(vec![PaymentMethodEvent::PaymentMethodActivationChanged(
                    PaymentMethodActivationChanged {
                        tenant_id: cmd.tenant_id,
                        payment_method_id: cmd.payment_method_id,
                        active: cmd.active,
                        occurred_at: cmd.occurred_at,
                    },
                )])
            }
            PaymentMethodCommand::Delete(cmd) => {
                self.ensure_live(cmd.tenant_id, cmd.payment_method_id)?;
                Ok(vec![PaymentMethodEvent::PaymentMethodDeleted(PaymentMethodDeleted {
                    tenant_id: cmd.tenant_id,
                    payment_method_id: cmd.payment_method_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl AggregateKind for PaymentMethod {
    const AGGREGATE_TYPE: &'static str = "treasury.payment_method";

    fn empty(id: AggregateId) -> Self {
        PaymentMethod::empty(PaymentMethodId::new(id))
    }

    fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl PaymentMethod {
    fn ensure_live(&self, tenant_id: TenantId, id: PaymentMethodId) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != id {
            return Err(DomainError::invariant("payment_method_id mismatch"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn thirds() -> Vec<Installment> {
        vec![
            Installment { days: 30, share_bp: 3_333 },
            Installment { days: 60, share_bp: 3_333 },
            Installment { days: 90, share_bp: 3_334 },
        ]
    }

    #[test]
    fn thirty_sixty_ninety() {
        let due = schedule(&thirds(), 100_00, date(2026, 1, 31));
        assert_eq!(
            due,
            vec![
                DueInstallment { due_date: date(2026, 3, 2), amount: 33_33 },
                DueInstallment { due_date: date(2026, 4, 1), amount: 33_33 },
                DueInstallment { due_date: date(2026, 5, 1), amount: 33_34 },
            ]
        );
    }

    #[test]
    fn shares_must_sum_to_hundred() {
        let mut installments = thirds();
        installments[2].share_bp = 3_000;
        let err = validate_installments(&installments).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("96.66%")));
    }

    #[test]
    fn huge_shares_do_not_wrap_to_hundred() {
        // 2^32 - 1 + 10_001 would wrap a u32 sum back to exactly 10_000.
        let installments = vec![
            Installment { days: 30, share_bp: u32::MAX },
            Installment { days: 60, share_bp: 10_001 },
        ];
        assert!(validate_installments(&installments).is_err());
    }

    #[test]
    fn days_must_ascend() {
        let installments = vec![
            Installment { days: 60, share_bp: 5_000 },
            Installment { days: 30, share_bp: 5_000 },
        ];
        assert!(validate_installments(&installments).is_err());
    }

    #[test]
    fn default_method_cannot_be_deactivated() {
        let tenant_id = TenantId::new();
        let id = PaymentMethodId::generate();
        let mut method = PaymentMethod::empty(id);
        let events = method
            .handle(&PaymentMethodCommand::Create(CreatePaymentMethod {
                tenant_id,
                payment_method_id: id,
                details: PaymentMethodDetails {
                    code: " rec30 ".into(),
                    name: "Recibo 30 días".into(),
                    kind: PaymentKind::DirectDebit,
                    installments: vec![Installment { days: 30, share_bp: 10_000 }],
                    is_default: true,
                    notes: None,
                },
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            method.apply(e);
        }
        assert_eq!(method.code(), "REC30");

        let err = method
            .handle(&PaymentMethodCommand::SetActive(SetPaymentMethodActive {
                tenant_id,
                payment_method_id: id,
                active: false,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    fn shares() -> impl Strategy<Value = Vec<Installment>> {
        proptest::collection::vec(1u32..5_000, 1..6).prop_map(|raw| {
            let total: u32 = raw.iter().sum();
            let mut bps: Vec<u32> = raw.iter().map(|r| (r * 10_000 / total).max(1)).collect();
            let assigned: u32 = bps[..bps.len() - 1].iter().sum();
            let last = bps.len() - 1;
            bps[last] = 10_000u32.saturating_sub(assigned).max(1);
            bps.into_iter()
                .enumerate()
                .map(|(i, share_bp)| Installment { days: 30 * i as u32, share_bp })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn schedule_sums_exactly(installments in shares(), amount in 0u64..10_000_000_00) {
            let due = schedule(&installments, amount, date(2026, 6, 15));
            prop_assert_eq!(due.len(), installments.len());
            prop_assert_eq!(due.iter().map(|d| d.amount).sum::<u64>(), amount);
            prop_assert!(due.windows(2).all(|w| w[0].due_date <= w[1].due_date));
        }
    }
}
