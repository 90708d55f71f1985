use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{MAX_QUANTITY, bounded_quantity};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, DomainError, DomainResult, TenantId,
};
use gestiona_events::{Event, TenantScoped};

gestiona_core::aggregate_id_newtype!(
    /// Stock level identifier, derived from warehouse + product.
    StockLevelId
);

impl StockLevelId {
    pub fn for_product(warehouse_id: AggregateId, product_id: AggregateId) -> Self {
        Self(AggregateId::derived(
            "inventory.stock",
            &[&warehouse_id.to_string(), &product_id.to_string()],
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    TransferOut,
    TransferIn,
    TransferReversal,
    Manual,
}

/// Aggregate root: StockLevel (quantity on hand of one product in one warehouse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    id: StockLevelId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    warehouse_id: AggregateId,
    product_id: AggregateId,
    product_name: String,
    on_hand: i64,
    updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl StockLevel {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockLevelId) -> Self {
        Self {
            id,
            tenant_id: None,
            warehouse_id: AggregateId::nil(),
            product_id: AggregateId::nil(),
            product_name: String::new(),
            on_hand: 0,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockLevelId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn warehouse_id(&self) -> AggregateId {
        self.warehouse_id
    }

    pub fn product_id(&self) -> AggregateId {
        self.product_id
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }
}

impl AggregateRoot for StockLevel {
    type Id = StockLevelId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AdjustStock. The first adjustment opens the stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub warehouse_id: AggregateId,
    pub product_id: AggregateId,
    pub product_name: String,
    pub delta: i64,
    pub reason: AdjustmentReason,
    /// Document that caused the movement (e.g. a transfer number).
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AdjustStock {
    pub fn stock_id(&self) -> StockLevelId {
        StockLevelId::for_product(self.warehouse_id, self.product_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    AdjustStock(AdjustStock),
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub stock_id: StockLevelId,
    pub warehouse_id: AggregateId,
    pub product_id: AggregateId,
    pub product_name: String,
    pub delta: i64,
    pub reason: AdjustmentReason,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    StockAdjusted(StockAdjusted),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockAdjusted(_) => "inventory.stock.adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for InventoryEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            InventoryEvent::StockAdjusted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for StockLevel {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::StockAdjusted(e) => {
                if !self.created {
                    self.id = e.stock_id;
                    self.tenant_id = Some(e.tenant_id);
                    self.warehouse_id = e.warehouse_id;
                    self.product_id = e.product_id;
                    self.created = true;
                }
                if !e.product_name.is_empty() {
                    self.product_name = e.product_name.clone();
                }
                self.on_hand += e.delta;
                self.updated_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl AggregateKind for StockLevel {
    const AGGREGATE_TYPE: &'static str = "inventory.stock";

    fn empty(id: AggregateId) -> Self {
        StockLevel::empty(StockLevelId::new(id))
    }

    fn exists(&self) -> bool {
        self.created
    }
}

impl StockLevel {
    fn ensure_tenant(&self, tenant_id: TenantId) -> DomainResult<()> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> DomainResult<Vec<InventoryEvent>> {
        self.ensure_tenant(cmd.tenant_id)?;
        let stock_id = cmd.stock_id();
        if self.id != stock_id {
            return Err(DomainError::invariant("stock_id mismatch"));
        }

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        bounded_quantity("delta", cmd.delta)?;
        let new_stock = self
            .on_hand
            .checked_add(cmd.delta)
            .filter(|n| *n <= MAX_QUANTITY)
            .ok_or_else(|| DomainError::validation("stock on hand would exceed the allowed maximum"))?;
        if new_stock < 0 {
            return Err(DomainError::invariant(format!(
                "insufficient stock: {} on hand, {} requested",
                self.on_hand, -cmd.delta
            )));
        }

        Ok(vec![InventoryEvent::StockAdjusted(StockAdjusted {
            tenant_id: cmd.tenant_id,
            stock_id,
            warehouse_id: cmd.warehouse_id,
            product_id: cmd.product_id,
            product_name: cmd.product_name.trim().to_string(),
            delta: cmd.delta,
            reason: cmd.reason,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn adjust(tenant_id: TenantId, w: AggregateId, p: AggregateId, delta: i64) -> AdjustStock {
        AdjustStock {
            tenant_id,
            warehouse_id: w,
            product_id: p,
            product_name: "Tornillo M6".into(),
            delta,
            reason: AdjustmentReason::Manual,
            reference: None,
            occurred_at: Utc::now(),
        }
    }

    fn apply_all(level: &mut StockLevel, cmd: AdjustStock) -> DomainResult<()> {
        for e in level.handle(&InventoryCommand::AdjustStock(cmd))? {
            level.apply(&e);
        }
        Ok(())
    }

    #[test]
    fn first_adjustment_opens_the_level() {
        let (t, w, p) = (TenantId::new(), AggregateId::new(), AggregateId::new());
        let mut level = StockLevel::empty(StockLevelId::for_product(w, p));
        apply_all(&mut level, adjust(t, w, p, 12)).unwrap();
        assert!(level.exists());
        assert_eq!(level.on_hand(), 12);
        assert_eq!(level.warehouse_id(), w);
    }

    #[test]
    fn stock_cannot_go_negative() {
        let (t, w, p) = (TenantId::new(), AggregateId::new(), AggregateId::new());
        let mut level = StockLevel::empty(StockLevelId::for_product(w, p));
        apply_all(&mut level, adjust(t, w, p, 3)).unwrap();
        let err = apply_all(&mut level, adjust(t, w, p, -4)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.starts_with("insufficient stock")));
        assert_eq!(level.on_hand(), 3);
    }

    #[test]
    fn adjustment_for_other_product_is_rejected() {
        let (t, w, p) = (TenantId::new(), AggregateId::new(), AggregateId::new());
        let level = StockLevel::empty(StockLevelId::for_product(w, p));
        let err = level
            .handle(&InventoryCommand::AdjustStock(adjust(t, w, AggregateId::new(), 1)))
            .unwrap_err();
        assert_eq!(err, DomainError::invariant("stock_id mismatch"));
    }

    #[test]
    fn huge_deltas_are_rejected_without_overflow() {
        let (t, w, p) = (TenantId::new(), AggregateId::new(), AggregateId::new());
        let mut level = StockLevel::empty(StockLevelId::for_product(w, p));
        let err = apply_all(&mut level, adjust(t, w, p, i64::MAX)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        apply_all(&mut level, adjust(t, w, p, MAX_QUANTITY)).unwrap();
        let err = apply_all(&mut level, adjust(t, w, p, MAX_QUANTITY)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("allowed maximum")));
        assert_eq!(level.on_hand(), MAX_QUANTITY);
    }

    proptest! {
        #[test]
        fn on_hand_never_negative(deltas in proptest::collection::vec(-20i64..20, 1..40)) {
            let (t, w, p) = (TenantId::new(), AggregateId::new(), AggregateId::new());
            let mut level = StockLevel::empty(StockLevelId::for_product(w, p));
            for d in deltas {
                let _ = apply_all(&mut level, adjust(t, w, p, d));
                prop_assert!(level.on_hand() >= 0);
            }
        }
    }
}
