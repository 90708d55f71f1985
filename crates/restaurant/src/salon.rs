use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{hex_color, optional_text, required_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, DomainError, DomainResult, TenantId,
};
use gestiona_events::{Event, TenantScoped};

use crate::layout::{FloorPlan, OpeningHours, SalonFeatures};

gestiona_core::aggregate_id_newtype!(
    /// Salon (dining room) identifier.
    SalonId
);

/// Editable attributes of a salon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalonDetails {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub floor_plan: FloorPlan,
    /// Seating limit imposed by the venue, independent of the tables placed.
    #[serde(default)]
    pub max_capacity: Option<u32>,
    /// Warehouse that POS sales in this salon draw stock from.
    #[serde(default)]
    pub warehouse_id: Option<AggregateId>,
    #[serde(default)]
    pub terminal_ids: Vec<String>,
    #[serde(default)]
    pub opening_hours: Vec<OpeningHours>,
    #[serde(default)]
    pub features: SalonFeatures,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub sort_order: i32,
}

fn default_color() -> String {
    "#3B82F6".to_string()
}

impl SalonDetails {
    /// Validate and normalise user input.
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.name = required_text("name", &self.name)?;
        self.description = optional_text(self.description.as_deref());
        self.floor_plan.validate()?;
        hex_color("color", &self.color)?;
        if self.max_capacity == Some(0) {
            return Err(DomainError::validation("max capacity must be positive"));
        }
        for slot in &self.opening_hours {
            slot.validate()?;
        }
        self.terminal_ids.retain(|t| !t.trim().is_empty());
        self.terminal_ids.dedup();
        Ok(self)
    }
}

/// Aggregate root: Salon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Salon {
    id: SalonId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    #[serde(flatten)]
    details: SalonDetails,
    active: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl Salon {
    pub fn empty(id: SalonId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: SalonDetails {
                name: String::new(),
                description: None,
                floor_plan: FloorPlan::default(),
                max_capacity: None,
                warehouse_id: None,
                terminal_ids: Vec::new(),
                opening_hours: Vec::new(),
                features: SalonFeatures::default(),
                color: default_color(),
                sort_order: 0,
            },
            active: true,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> SalonId {
        self.id
    }

    pub fn details(&self) -> &SalonDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn floor_plan(&self) -> &FloorPlan {
        &self.details.floor_plan
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl AggregateRoot for Salon {
    type Id = SalonId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSalon {
    pub tenant_id: TenantId,
    pub salon_id: SalonId,
    pub details: SalonDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSalon {
    pub tenant_id: TenantId,
    pub salon_id: SalonId,
    pub details: SalonDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSalonActive {
    pub tenant_id: TenantId,
    pub salon_id: SalonId,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteSalon. `remaining_tables` is looked up by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSalon {
    pub tenant_id: TenantId,
    pub salon_id: SalonId,
    pub remaining_tables: usize,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalonCommand {
    Create(CreateSalon),
    Update(UpdateSalon),
    SetActive(SetSalonActive),
    Delete(DeleteSalon),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalonCreated {
    pub tenant_id: TenantId,
    pub salon_id: SalonId,
    pub details: SalonDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalonUpdated {
    pub tenant_id: TenantId,
    pub salon_id: SalonId,
    pub details: SalonDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalonActivationChanged {
    pub tenant_id: TenantId,
    pub salon_id: SalonId,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalonDeleted {
    pub tenant_id: TenantId,
    pub salon_id: SalonId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalonEvent {
    SalonCreated(SalonCreated),
    SalonUpdated(SalonUpdated),
    SalonActivationChanged(SalonActivationChanged),
    SalonDeleted(SalonDeleted),
}

impl Event for SalonEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalonEvent::SalonCreated(_) => "restaurant.salon.created",
            SalonEvent::SalonUpdated(_) => "restaurant.salon.updated",
            SalonEvent::SalonActivationChanged(_) => "restaurant.salon.activation_changed",
            SalonEvent::SalonDeleted(_) => "restaurant.salon.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalonEvent::SalonCreated(e) => e.occurred_at,
            SalonEvent::SalonUpdated(e) => e.occurred_at,
            SalonEvent::SalonActivationChanged(e) => e.occurred_at,
            SalonEvent::SalonDeleted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for SalonEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            SalonEvent::SalonCreated(e) => e.tenant_id,
            SalonEvent::SalonUpdated(e) => e.tenant_id,
            SalonEvent::SalonActivationChanged(e) => e.tenant_id,
            SalonEvent::SalonDeleted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for Salon {
    type Command = SalonCommand;
    type Event = SalonEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalonEvent::SalonCreated(e) => {
                self.id = e.salon_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.active = true;
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            SalonEvent::SalonUpdated(e) => {
                self.details = e.details.clone();
                self.updated_at = Some(e.occurred_at);
            }
            SalonEvent::SalonActivationChanged(e) => {
                self.active = e.active;
                self.updated_at = Some(e.occurred_at);
            }
            SalonEvent::SalonDeleted(e) => {
                self.deleted = true;
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalonCommand::Create(cmd) => self.handle_create(cmd),
            SalonCommand::Update(cmd) => self.handle_update(cmd),
            SalonCommand::SetActive(cmd) => self.handle_set_active(cmd),
            SalonCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl AggregateKind for Salon {
    const AGGREGATE_TYPE: &'static str = "restaurant.salon";

    fn empty(id: AggregateId) -> Self {
        Salon::empty(SalonId::new(id))
    }

    fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl Salon {
    fn ensure_live(&self, tenant_id: TenantId, salon_id: SalonId) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != salon_id {
            return Err(DomainError::invariant("salon_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSalon) -> DomainResult<Vec<SalonEvent>> {
        if self.created {
            return Err(DomainError::conflict("salon already exists"));
        }
        let details = cmd.details.clone().normalized()?;
        Ok(vec![SalonEvent::SalonCreated(SalonCreated {
            tenant_id: cmd.tenant_id,
            salon_id: cmd.salon_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateSalon) -> DomainResult<Vec<SalonEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.salon_id)?;
        let details = cmd.details.clone().normalized()?;
        if details == self.details {
            return Ok(vec![]);
        }
        Ok(vec![SalonEvent::SalonUpdated(SalonUpdated {
            tenant_id: cmd.tenant_id,
            salon_id: cmd.salon_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_active(&self, cmd: &SetSalonActive) -> DomainResult<Vec<SalonEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.salon_id)?;
        if self.active == cmd.active {
            return Ok(vec![]);
        }
        Ok(vec![SalonEvent::SalonActivationChanged(SalonActivationChanged {
            tenant_id: cmd.tenant_id,
            salon_id: cmd.salon_id,
            active: cmd.active,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteSalon) -> DomainResult<Vec<SalonEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.salon_id)?;
        if cmd.remaining_tables > 0 {
            return Err(DomainError::invariant(format!(
                "salon still has {} table(s); delete or move them first",
                cmd.remaining_tables
            )));
        }
        Ok(vec![SalonEvent::SalonDeleted(SalonDeleted {
            tenant_id: cmd.tenant_id,
            salon_id: cmd.salon_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(name: &str) -> SalonDetails {
        SalonDetails {
            name: name.to_string(),
            ..Salon::empty(SalonId::generate()).details().clone()
        }
    }

    fn created(tenant_id: TenantId) -> Salon {
        let id = SalonId::generate();
        let mut salon = Salon::empty(id);
        let events = salon
            .handle(&SalonCommand::Create(CreateSalon {
                tenant_id,
                salon_id: id,
                details: details("Terraza"),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            salon.apply(e);
        }
        salon
    }

    #[test]
    fn create_normalises_name_and_starts_active() {
        let tenant_id = TenantId::new();
        let id = SalonId::generate();
        let events = Salon::empty(id)
            .handle(&SalonCommand::Create(CreateSalon {
                tenant_id,
                salon_id: id,
                details: details("  Comedor principal "),
                occurred_at: Utc::now(),
            }))
            .unwrap();

        let mut salon = Salon::empty(id);
        salon.apply(&events[0]);
        assert_eq!(salon.name(), "Comedor principal");
        assert!(salon.is_active());
        assert_eq!(salon.version(), 1);
    }

    #[test]
    fn invalid_color_is_rejected() {
        let id = SalonId::generate();
        let mut d = details("Barra");
        d.color = "blue".into();
        let err = Salon::empty(id)
            .handle(&SalonCommand::Create(CreateSalon {
                tenant_id: TenantId::new(),
                salon_id: id,
                details: d,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cannot_delete_salon_with_tables() {
        let tenant_id = TenantId::new();
        let salon = created(tenant_id);
        let err = salon
            .handle(&SalonCommand::Delete(DeleteSalon {
                tenant_id,
                salon_id: salon.id_typed(),
                remaining_tables: 3,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("3 table") => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn deleted_salon_no_longer_exists() {
        let tenant_id = TenantId::new();
        let mut salon = created(tenant_id);
        let events = salon
            .handle(&SalonCommand::Delete(DeleteSalon {
                tenant_id,
                salon_id: salon.id_typed(),
                remaining_tables: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        salon.apply(&events[0]);
        assert!(!salon.exists());

        let err = salon
            .handle(&SalonCommand::SetActive(SetSalonActive {
                tenant_id,
                salon_id: salon.id_typed(),
                active: false,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn deactivating_twice_is_a_no_op() {
        let tenant_id = TenantId::new();
        let mut salon = created(tenant_id);
        let cmd = SalonCommand::SetActive(SetSalonActive {
            tenant_id,
            salon_id: salon.id_typed(),
            active: false,
            occurred_at: Utc::now(),
        });
        for e in salon.handle(&cmd).unwrap() {
            salon.apply(&e);
        }
        assert!(!salon.is_active());
        assert!(salon.handle(&cmd).unwrap().is_empty());
    }

    #[test]
    fn other_tenant_cannot_update() {
        let salon = created(TenantId::new());
        let err = salon
            .handle(&SalonCommand::Update(UpdateSalon {
                tenant_id: TenantId::new(),
                salon_id: salon.id_typed(),
                details: details("Otro"),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::invariant("tenant mismatch"));
    }
}
