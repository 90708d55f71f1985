use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, MutexGuard};

use chrono::Utc;
use gestiona_core::{AggregateId, DomainError, TenantId};
use gestiona_templates::{
    CreateTemplate, DocumentTemplate, DocumentType, TemplateCommand, TemplateDetails, TemplateId,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_bus::RealtimeBus;
use crate::event_store::{EventStore, InMemoryEventStore, PostgresEventStore, StoredEvent};
use crate::read_model::{Projected, ReadModels};

use super::config::{CompanyProfile, DatabaseKind, TenantConfig};
use super::directory::TenancyError;

type Dispatcher = CommandDispatcher<Arc<dyn EventStore>, Arc<RealtimeBus>>;

/// Everything needed to serve one tenant.
pub struct TenantRuntime {
    config: TenantConfig,
    dispatcher: Dispatcher,
    read_models: ReadModels,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for TenantRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRuntime")
            .field("tenant_id", &self.config.id)
            .field("name", &self.config.name)
            .finish_non_exhaustive()
    }
}

impl TenantRuntime {
    /// Open the tenant's store and rebuild its read models from history.
    pub async fn open(config: TenantConfig, bus: Arc<RealtimeBus>) -> Result<Self, TenancyError> {
        let store: Arc<dyn EventStore> = match config.database.kind {
            DatabaseKind::Memory => Arc::new(InMemoryEventStore::new()),
            DatabaseKind::Postgres => {
                let url = config.database.url.as_deref().ok_or_else(|| TenancyError::Misconfigured {
                    tenant_id: config.id,
                    message: "postgres database requires a url".to_string(),
                })?;
                Arc::new(PostgresEventStore::connect(url, config.database.max_connections).await?)
            }
        };
        Self::with_store(config, store, bus).await
    }

    pub async fn with_store(
        config: TenantConfig,
        store: Arc<dyn EventStore>,
        bus: Arc<RealtimeBus>,
    ) -> Result<Self, TenancyError> {
        let read_models = ReadModels::new(config.id);
        let history = store.load_tenant(config.id).await?;
        let applied = read_models.rebuild(&history);
        tracing::info!(
            tenant_id = %config.id,
            tenant = %config.name,
            events = history.len(),
            applied,
            "tenant runtime ready"
        );

        let runtime = Self {
            config,
            dispatcher: CommandDispatcher::new(store, bus),
            read_models,
            write_lock: Mutex::new(()),
        };
        runtime.seed_system_templates().await?;
        Ok(runtime)
    }

    /// Create the built-in template of every document type the tenant lacks.
    async fn seed_system_templates(&self) -> Result<(), TenancyError> {
        let tenant_id = self.tenant_id();
        let uow = self.begin().await;
        for document_type in DocumentType::ALL {
            let template_id = TemplateId::system(tenant_id, document_type);
            if uow.read().get::<DocumentTemplate>(template_id.aggregate_id()).is_some() {
                continue;
            }
            let cmd = TemplateCommand::Create(CreateTemplate {
                tenant_id,
                template_id,
                details: TemplateDetails::builtin(document_type),
                is_system: true,
                occurred_at: Utc::now(),
            });
            uow.execute::<DocumentTemplate>(template_id.aggregate_id(), cmd)
                .await
                .map_err(|err| match err {
                    DispatchError::Store(e) => TenancyError::Store(e),
                    other => TenancyError::Misconfigured {
                        tenant_id,
                        message: format!("system template {}: {other}", document_type.as_str()),
                    },
                })?;
            tracing::debug!(tenant_id = %tenant_id, document_type = document_type.as_str(), "system template seeded");
        }
        Ok(())
    }

    pub fn tenant_id(&self) -> TenantId {
        self.config.id
    }

    pub fn config(&self) -> &TenantConfig {
        &self.config
    }

    pub fn company(&self) -> &CompanyProfile {
        &self.config.company
    }

    pub fn read(&self) -> &ReadModels {
        &self.read_models
    }

    /// Take the tenant's write lock. Writes of one tenant run one at a time.
    pub async fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork {
            runtime: self,
            _guard: self.write_lock.lock().await,
        }
    }
}

/// Serialized write scope of a tenant.
///
/// Lookups made through [`UnitOfWork::read`] cannot be invalidated by another
/// writer of the same tenant until the unit of work is dropped.
pub struct UnitOfWork<'a> {
    runtime: &'a TenantRuntime,
    _guard: MutexGuard<'a, ()>,
}

impl UnitOfWork<'_> {
    pub fn tenant_id(&self) -> TenantId {
        self.runtime.tenant_id()
    }

    pub fn read(&self) -> &ReadModels {
        &self.runtime.read_models
    }

    /// Dispatch a command and project the committed events.
    pub async fn execute<A>(
        &self,
        aggregate_id: AggregateId,
        command: A::Command,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Projected<Error = DomainError>,
        A::Command: Send,
        A::Event: gestiona_events::Event + Serialize + DeserializeOwned,
    {
        let committed = self
            .runtime
            .dispatcher
            .dispatch::<A>(self.tenant_id(), aggregate_id, command)
            .await?;

        for stored in &committed {
            if let Err(err) = self.runtime.read_models.apply(stored) {
                tracing::warn!(
                    tenant_id = %stored.tenant_id,
                    aggregate_id = %stored.aggregate_id,
                    event_type = %stored.event_type,
                    error = %err,
                    "failed to project committed event"
                );
            }
        }
        Ok(committed)
    }
}
