use gestiona_core::{AggregateId, AggregateKind, TenantId};
use gestiona_inventory::{StockLevel, Transfer};
use gestiona_invoicing::{DeliveryNote, Invoice};
use gestiona_machinery::Machine;
use gestiona_personnel::Employee;
use gestiona_projects::Project;
use gestiona_restaurant::{Salon, Table};
use gestiona_templates::DocumentTemplate;
use gestiona_treasury::{PaymentMethod, Receipt, Remittance};

use crate::event_store::StoredEvent;

use super::projection::{Projection, ProjectionError};

/// Aggregate types that have a current-state read model.
pub trait Projected: AggregateKind + Clone + Send + Sync + 'static {
    fn projection(models: &ReadModels) -> &Projection<Self>;
}

macro_rules! read_models {
    ($($field:ident: $agg:ty),* $(,)?) => {
        /// Current state of every aggregate type of one tenant.
        #[derive(Debug)]
        pub struct ReadModels {
            tenant_id: TenantId,
            $(pub $field: Projection<$agg>,)*
        }

        impl ReadModels {
            pub fn new(tenant_id: TenantId) -> Self {
                Self {
                    tenant_id,
                    $($field: Projection::new(tenant_id),)*
                }
            }

            /// Route a committed event to the projection of its aggregate type.
            pub fn apply(&self, stored: &StoredEvent) -> Result<bool, ProjectionError> {
                if stored.tenant_id != self.tenant_id {
                    return Err(ProjectionError::TenantMismatch {
                        expected: self.tenant_id,
                        found: stored.tenant_id,
                    });
                }
                $(
                    if stored.aggregate_type == <$agg as AggregateKind>::AGGREGATE_TYPE {
                        return self.$field.apply(stored);
                    }
                )*
                Err(ProjectionError::UnknownAggregateType(stored.aggregate_type.clone()))
            }

            pub fn clear(&self) {
                $(self.$field.clear();)*
            }
        }

        $(
            impl Projected for $agg {
                fn projection(models: &ReadModels) -> &Projection<Self> {
                    &models.$field
                }
            }
        )*
    };
}

read_models! {
    salons: Salon,
    tables: Table,
    templates: DocumentTemplate,
    stock: StockLevel,
    transfers: Transfer,
    payment_methods: PaymentMethod,
    receipts: Receipt,
    remittances: Remittance,
    employees: Employee,
    machines: Machine,
    projects: Project,
    delivery_notes: DeliveryNote,
    invoices: Invoice,
}

impl ReadModels {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn get<A: Projected>(&self, id: AggregateId) -> Option<A> {
        A::projection(self).get(id)
    }

    pub fn list<A: Projected>(&self) -> Vec<(AggregateId, A)> {
        A::projection(self).list()
    }

    /// Replay a tenant's history. Events that fail to project are logged and skipped.
    pub fn rebuild(&self, events: &[StoredEvent]) -> usize {
        self.clear();
        let mut applied = 0;
        for stored in events {
            match self.apply(stored) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!(
                    tenant_id = %self.tenant_id,
                    aggregate_id = %stored.aggregate_id,
                    event_type = %stored.event_type,
                    error = %err,
                    "skipping event during read model rebuild"
                ),
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use gestiona_core::Aggregate;
    use gestiona_personnel::{
        CreateEmployee, DeleteEmployee, EmployeeCommand, EmployeeDetails, EmployeeId,
    };
    use uuid::Uuid;

    use crate::event_store::UncommittedEvent;

    fn stored(tenant_id: TenantId, id: EmployeeId, seq: u64, command: EmployeeCommand) -> StoredEvent {
        let mut employee = Employee::empty(id);
        if seq > 1 {
            let create = create_cmd(tenant_id, id);
            for e in employee.handle(&create).unwrap() {
                employee.apply(&e);
            }
        }
        let event = employee.handle(&command).unwrap().remove(0);
        let u = UncommittedEvent::from_typed(
            tenant_id,
            id.aggregate_id(),
            Employee::AGGREGATE_TYPE,
            Uuid::now_v7(),
            &event,
        )
        .unwrap();
        StoredEvent {
            event_id: u.event_id,
            tenant_id,
            aggregate_id: u.aggregate_id,
            aggregate_type: u.aggregate_type,
            sequence_number: seq,
            event_type: u.event_type,
            event_version: u.event_version,
            occurred_at: u.occurred_at,
            payload: u.payload,
        }
    }

    fn create_cmd(tenant_id: TenantId, id: EmployeeId) -> EmployeeCommand {
        EmployeeCommand::Create(CreateEmployee {
            tenant_id,
            employee_id: id,
            details: EmployeeDetails {
                code: "E1".to_string(),
                first_name: "Ana".to_string(),
                last_name: "Ruiz".to_string(),
                tax_id: "12345678Z".to_string(),
                email: None,
                phone: None,
                position: None,
                department: None,
                hire_date: NaiveDate::from_ymd_opt(2023, 3, 1).unwrap(),
                hourly_cost: 0,
                notes: None,
            },
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn created_aggregates_are_listed_and_deleted_ones_dropped() {
        let tenant = TenantId::new();
        let models = ReadModels::new(tenant);
        let id = EmployeeId::generate();

        let created = stored(tenant, id, 1, create_cmd(tenant, id));
        assert_eq!(models.apply(&created), Ok(true));
        assert_eq!(models.apply(&created), Ok(false));
        assert_eq!(models.list::<Employee>().len(), 1);

        let deleted = stored(
            tenant,
            id,
            2,
            EmployeeCommand::Delete(DeleteEmployee {
                tenant_id: tenant,
                employee_id: id,
                occurred_at: Utc::now(),
            }),
        );
        assert_eq!(models.apply(&deleted), Ok(true));
        assert!(models.get::<Employee>(id.aggregate_id()).is_none());
    }

    #[test]
    fn foreign_tenant_and_unknown_types_are_rejected() {
        let tenant = TenantId::new();
        let models = ReadModels::new(tenant);
        let other = TenantId::new();
        let id = EmployeeId::generate();

        let foreign = stored(other, id, 1, create_cmd(other, id));
        assert!(matches!(models.apply(&foreign), Err(ProjectionError::TenantMismatch { .. })));

        let mut unknown = stored(tenant, id, 1, create_cmd(tenant, id));
        unknown.aggregate_type = "sales.order".to_string();
        assert_eq!(
            models.apply(&unknown),
            Err(ProjectionError::UnknownAggregateType("sales.order".to_string()))
        );
    }

    #[test]
    fn gaps_in_a_stream_are_reported() {
        let tenant = TenantId::new();
        let models = ReadModels::new(tenant);
        let id = EmployeeId::generate();

        let mut late = stored(tenant, id, 1, create_cmd(tenant, id));
        late.sequence_number = 3;
        assert!(matches!(models.apply(&late), Err(ProjectionError::OutOfOrder { expected: 1, .. })));
        assert_eq!(models.rebuild(&[late]), 0);
    }
}
