use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gestiona_core::validation::{optional_text, required_text};
use gestiona_core::{
    Aggregate, AggregateId, AggregateKind, AggregateRoot, DomainError, DomainResult, TenantId,
};
use gestiona_events::{Event, TenantScoped};

use crate::style::{TemplateSections, TemplateStyle};

gestiona_core::aggregate_id_newtype!(
    /// Document template identifier.
    TemplateId
);

impl TemplateId {
    /// Stable id of the tenant's built-in template for `document_type`.
    pub fn system(tenant_id: TenantId, document_type: DocumentType) -> Self {
        Self(AggregateId::derived(
            "templates.system",
            &[&tenant_id.to_string(), document_type.as_str()],
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Estimate,
    DeliveryNote,
    Order,
    WorkOrder,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Invoice,
        DocumentType::Estimate,
        DocumentType::DeliveryNote,
        DocumentType::Order,
        DocumentType::WorkOrder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Estimate => "estimate",
            DocumentType::DeliveryNote => "delivery_note",
            DocumentType::Order => "order",
            DocumentType::WorkOrder => "work_order",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "invoice" => Ok(DocumentType::Invoice),
            "estimate" => Ok(DocumentType::Estimate),
            "delivery_note" => Ok(DocumentType::DeliveryNote),
            "order" => Ok(DocumentType::Order),
            "work_order" => Ok(DocumentType::WorkOrder),
            other => Err(DomainError::validation(format!(
                "unknown document type '{other}'"
            ))),
        }
    }

    /// Printed title when the template does not set one.
    pub fn default_title(self) -> &'static str {
        match self {
            DocumentType::Invoice => "FACTURA",
            DocumentType::Estimate => "PRESUPUESTO",
            DocumentType::DeliveryNote => "ALBARÁN",
            DocumentType::Order => "PEDIDO",
            DocumentType::WorkOrder => "ORDEN DE TRABAJO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDetails {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub document_type: DocumentType,
    #[serde(default)]
    pub style: TemplateStyle,
    #[serde(default)]
    pub sections: TemplateSections,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl TemplateDetails {
    /// Built-in layout used when a tenant has no template of this type.
    pub fn builtin(document_type: DocumentType) -> Self {
        Self {
            name: format!("Predeterminada ({})", document_type.as_str()),
            description: None,
            document_type,
            style: TemplateStyle::default(),
            sections: TemplateSections::default(),
            active: true,
        }
    }

    pub fn normalized(mut self) -> DomainResult<Self> {
        self.name = required_text("name", &self.name)?;
        self.description = optional_text(self.description.as_deref());
        self.style.validate()?;
        self.sections.header.title = optional_text(self.sections.header.title.as_deref());
        self.sections.footer.text = optional_text(self.sections.footer.text.as_deref());
        Ok(self)
    }

    /// Printed document title.
    pub fn title(&self) -> &str {
        self.sections
            .header
            .title
            .as_deref()
            .unwrap_or(self.document_type.default_title())
    }
}

/// Aggregate root: DocumentTemplate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentTemplate {
    id: TemplateId,
    #[serde(skip)]
    tenant_id: Option<TenantId>,
    #[serde(flatten)]
    details: TemplateDetails,
    is_default: bool,
    is_system: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    created: bool,
    #[serde(skip)]
    deleted: bool,
}

impl DocumentTemplate {
    pub fn empty(id: TemplateId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: TemplateDetails::builtin(DocumentType::Invoice),
            is_default: false,
            is_system: false,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> TemplateId {
        self.id
    }

    pub fn details(&self) -> &TemplateDetails {
        &self.details
    }

    pub fn document_type(&self) -> DocumentType {
        self.details.document_type
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// Details for a copy: `"<name> (copia)"`, active.
    pub fn duplicate_details(&self) -> TemplateDetails {
        TemplateDetails {
            name: format!("{} (copia)", self.details.name),
            active: true,
            ..self.details.clone()
        }
    }
}

impl AggregateRoot for DocumentTemplate {
    type Id = TemplateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTemplate {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub details: TemplateDetails,
    pub is_system: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTemplate {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub details: TemplateDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetDefaultTemplate. Clearing the previous default is a separate command on that template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDefaultTemplate {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub is_default: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTemplate {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateCommand {
    Create(CreateTemplate),
    Update(UpdateTemplate),
    SetDefault(SetDefaultTemplate),
    Delete(DeleteTemplate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateCreated {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub details: TemplateDetails,
    pub is_system: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateUpdated {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub details: TemplateDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefaultChanged {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub is_default: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDeleted {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateEvent {
    TemplateCreated(TemplateCreated),
    TemplateUpdated(TemplateUpdated),
    TemplateDefaultChanged(TemplateDefaultChanged),
    TemplateDeleted(TemplateDeleted),
}

impl Event for TemplateEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TemplateEvent::TemplateCreated(_) => "templates.template.created",
            TemplateEvent::TemplateUpdated(_) => "templates.template.updated",
            TemplateEvent::TemplateDefaultChanged(_) => "templates.template.default_changed",
            TemplateEvent::TemplateDeleted(_) => "templates.template.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TemplateEvent::TemplateCreated(e) => e.occurred_at,
            TemplateEvent::TemplateUpdated(e) => e.occurred_at,
            TemplateEvent::TemplateDefaultChanged(e) => e.occurred_at,
            TemplateEvent::TemplateDeleted(e) => e.occurred_at,
        }
    }
}

impl TenantScoped for TemplateEvent {
    fn tenant_id(&self) -> TenantId {
        match self {
            TemplateEvent::TemplateCreated(e) => e.tenant_id,
            TemplateEvent::TemplateUpdated(e) => e.tenant_id,
            TemplateEvent::TemplateDefaultChanged(e) => e.tenant_id,
            TemplateEvent::TemplateDeleted(e) => e.tenant_id,
        }
    }
}

impl Aggregate for DocumentTemplate {
    type Command = TemplateCommand;
    type Event = TemplateEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TemplateEvent::TemplateCreated(e) => {
                self.id = e.template_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.is_system = e.is_system;
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            TemplateEvent::TemplateUpdated(e) => {
                self.details = e.details.clone();
                self.updated_at = Some(e.occurred_at);
            }
            TemplateEvent::TemplateDefaultChanged(e) => {
                self.is_default = e.is_default;
                self.updated_at = Some(e.occurred_at);
            }
            TemplateEvent::TemplateDeleted(e) => {
                self.deleted = true;
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TemplateCommand::Create(cmd) => self.handle_create(cmd),
            TemplateCommand::Update(cmd) => self.handle_update(cmd),
            TemplateCommand::SetDefault(cmd) => self.handle_set_default(cmd),
            TemplateCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl AggregateKind for DocumentTemplate {
    const AGGREGATE_TYPE: &'static str = "templates.template";

    fn empty(id: AggregateId) -> Self {
        DocumentTemplate::empty(TemplateId::new(id))
    }

    fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl DocumentTemplate {
    fn ensure_live(&self, tenant_id: TenantId, template_id: TemplateId) -> DomainResult<()> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != template_id {
            return Err(DomainError::invariant("template_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTemplate) -> DomainResult<Vec<TemplateEvent>> {
        if self.created {
            return Err(DomainError::conflict("template already exists"));
        }
        let details = cmd.details.clone().normalized()?;
        Ok(vec![TemplateEvent::TemplateCreated(TemplateCreated {
            tenant_id: cmd.tenant_id,
            template_id: cmd.template_id,
            details,
            is_system: cmd.is_system,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateTemplate) -> DomainResult<Vec<TemplateEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.template_id)?;
        if self.is_system {
            return Err(DomainError::invariant("system templates cannot be modified"));
        }
        let details = cmd.details.clone().normalized()?;
        if details.document_type != self.details.document_type && self.is_default {
            return Err(DomainError::invariant(
                "cannot change the document type of a default template",
            ));
        }
        if !details.active && self.is_default {
            return Err(DomainError::invariant("a default template must stay active"));
        }
        if details == self.details {
            return Ok(vec![]);
        }
        Ok(vec![TemplateEvent::TemplateUpdated(TemplateUpdated {
            tenant_id: cmd.tenant_id,
            template_id: cmd.template_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_default(&self, cmd: &SetDefaultTemplate) -> DomainResult<Vec<TemplateEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.template_id)?;
        if cmd.is_default && !self.details.active {
            return Err(DomainError::invariant(
                "an inactive template cannot be the default",
            ));
        }
        if self.is_default == cmd.is_default {
            return Ok(vec![]);
        }
        Ok(vec![TemplateEvent::TemplateDefaultChanged(TemplateDefaultChanged {
            tenant_id: cmd.tenant_id,
            template_id: cmd.template_id,
            is_default: cmd.is_default,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteTemplate) -> DomainResult<Vec<TemplateEvent>> {
        self.ensure_live(cmd.tenant_id, cmd.template_id)?;
        if self.is_system {
            return Err(DomainError::invariant("system templates cannot be deleted"));
        }
        if self.is_default {
            return Err(DomainError::invariant(
                "the default template cannot be deleted; make another template default first",
            ));
        }
        Ok(vec![TemplateEvent::TemplateDeleted(TemplateDeleted {
            tenant_id: cmd.tenant_id,
            template_id: cmd.template_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(template: &mut DocumentTemplate, cmd: TemplateCommand) -> DomainResult<()> {
        for e in template.handle(&cmd)? {
            template.apply(&e);
        }
        Ok(())
    }

    fn created(tenant_id: TenantId, is_system: bool) -> DocumentTemplate {
        let id = TemplateId::generate();
        let mut template = DocumentTemplate::empty(id);
        let mut details = TemplateDetails::builtin(DocumentType::Invoice);
        details.name = "Factura clásica".into();
        run(
            &mut template,
            TemplateCommand::Create(CreateTemplate {
                tenant_id,
                template_id: id,
                details,
                is_system,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        template
    }

    fn set_default(tenant_id: TenantId, id: TemplateId, is_default: bool) -> TemplateCommand {
        TemplateCommand::SetDefault(SetDefaultTemplate {
            tenant_id,
            template_id: id,
            is_default,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn invalid_color_is_rejected_on_create() {
        let id = TemplateId::generate();
        let mut details = TemplateDetails::builtin(DocumentType::DeliveryNote);
        details.style.primary_color = "#12".into();
        let err = DocumentTemplate::empty(id)
            .handle(&TemplateCommand::Create(CreateTemplate {
                tenant_id: TenantId::new(),
                template_id: id,
                details,
                is_system: false,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn system_template_is_read_only() {
        let tenant_id = TenantId::new();
        let mut template = created(tenant_id, true);
        let id = template.id_typed();
        let mut details = template.details().clone();
        details.name = "Otra".into();

        let err = run(
            &mut template,
            TemplateCommand::Update(UpdateTemplate {
                tenant_id,
                template_id: id,
                details,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::invariant("system templates cannot be modified"));

        let err = run(
            &mut template,
            TemplateCommand::Delete(DeleteTemplate {
                tenant_id,
                template_id: id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("system")));
    }

    #[test]
    fn default_template_cannot_be_deleted() {
        let tenant_id = TenantId::new();
        let mut template = created(tenant_id, false);
        let id = template.id_typed();
        run(&mut template, set_default(tenant_id, id, true)).unwrap();
        assert!(template.is_default());

        let delete = TemplateCommand::Delete(DeleteTemplate {
            tenant_id,
            template_id: id,
            occurred_at: Utc::now(),
        });
        assert!(run(&mut template, delete.clone()).is_err());

        run(&mut template, set_default(tenant_id, id, false)).unwrap();
        run(&mut template, delete).unwrap();
        assert!(!template.exists());
    }

    #[test]
    fn duplicate_names_the_copy() {
        let template = created(TenantId::new(), true);
        let copy = template.duplicate_details();
        assert_eq!(copy.name, "Factura clásica (copia)");
        assert_eq!(copy.style, template.details().style);
    }

    #[test]
    fn title_falls_back_to_document_type() {
        let mut details = TemplateDetails::builtin(DocumentType::DeliveryNote);
        assert_eq!(details.title(), "ALBARÁN");
        details.sections.header.title = Some("Nota de entrega".into());
        assert_eq!(details.title(), "Nota de entrega");
    }

    #[test]
    fn setting_same_default_is_noop() {
        let tenant_id = TenantId::new();
        let template = created(tenant_id, false);
        let events = template
            .handle(&set_default(tenant_id, template.id_typed(), false))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn system_ids_are_per_tenant_and_type() {
        let a = TenantId::new();
        let b = TenantId::new();
        assert_eq!(
            TemplateId::system(a, DocumentType::Invoice),
            TemplateId::system(a, DocumentType::Invoice)
        );
        assert_ne!(
            TemplateId::system(a, DocumentType::Invoice),
            TemplateId::system(a, DocumentType::Estimate)
        );
        assert_ne!(
            TemplateId::system(a, DocumentType::Invoice),
            TemplateId::system(b, DocumentType::Invoice)
        );
    }
}
