use std::collections::HashMap;

use axum::response::Response;
use serde::Serialize;
use serde_json::Value;

use gestiona_auth::{CommandAuthorization, Permission};
use gestiona_core::AggregateId;
use gestiona_infra::read_model::{Projected, ReadModels};

use crate::app::dto::{self, ListQuery, ListSpec};
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, permission: &'static str) -> Self {
        Self {
            inner,
            required: vec![Permission::new(permission)],
        }
    }

    /// Check the caller's permissions and release the command.
    pub fn authorize(self, tenant: &TenantContext, principal: &PrincipalContext) -> Result<C, ApiError> {
        authz::authorize_command(tenant, principal, &self)?;
        Ok(self.inner)
    }
}

pub fn parse_id(raw: &str, what: &str) -> Result<AggregateId, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::InvalidId(format!("invalid {what} id '{raw}'")))
}

/// Live entity or 404.
pub fn find<A: Projected>(read: &ReadModels, id: AggregateId, what: &str) -> Result<A, ApiError> {
    read.get::<A>(id).ok_or_else(|| ApiError::not_found(what))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(format!("serialization failed: {e}")))
}

/// Paginated list of every live `A`, decorated by `view`.
pub fn list_response<A, F>(
    read: &ReadModels,
    params: HashMap<String, String>,
    spec: &ListSpec,
    view: F,
) -> Result<Response, ApiError>
where
    A: Projected,
    F: Fn(&A) -> Result<Value, ApiError>,
{
    let query = ListQuery::parse(params)?;
    let items = read
        .list::<A>()
        .iter()
        .map(|(_, a)| view(a))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dto::paginated(query.apply(spec, items)?))
}

pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}
