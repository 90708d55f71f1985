//! Response envelope, list querying and request bodies shared by several routes.

use std::cmp::Ordering;
use std::collections::HashMap;

use axum::{
    Json,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::errors::ApiError;

pub const DEFAULT_LIMIT: usize = 25;
pub const MAX_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn envelope<T: Serialize>(
    status: StatusCode,
    data: T,
    pagination: Option<Pagination>,
    message: Option<String>,
) -> Response {
    (
        status,
        Json(Envelope {
            success: true,
            data,
            pagination,
            message,
        }),
    )
        .into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::OK, data, None, None)
}

pub fn created<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::CREATED, data, None, None)
}

pub fn ok_message<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    envelope(StatusCode::OK, data, None, Some(message.into()))
}

pub fn paginated(page: Page) -> Response {
    envelope(StatusCode::OK, page.items, Some(page.pagination), None)
}

/// JSON body whose rejection uses the API error envelope.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
        }
    }
}

/// Which fields of a resource can be searched and filtered.
///
/// Fields are JSON pointers into the serialized entity.
#[derive(Debug, Clone, Copy)]
pub struct ListSpec {
    pub search: &'static [&'static str],
    pub filters: &'static [(&'static str, &'static str)],
}

impl ListSpec {
    fn filter_pointer(&self, key: &str) -> Option<&'static str> {
        self.filters.iter().find(|(k, _)| *k == key).map(|(_, p)| *p)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub pointer: String,
    pub descending: bool,
}

/// `?page=&limit=&sort=&q=` plus resource filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: usize,
    pub limit: usize,
    pub sort: Option<SortKey>,
    pub q: Option<String>,
    pub filters: Vec<(String, String)>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            sort: None,
            q: None,
            filters: Vec::new(),
        }
    }
}

impl ListQuery {
    pub fn parse(params: HashMap<String, String>) -> Result<Self, ApiError> {
        let mut query = ListQuery::default();
        let mut filters: Vec<(String, String)> = Vec::new();

        for (key, value) in params {
            match key.as_str() {
                "page" => {
                    query.page = value
                        .parse()
                        .ok()
                        .filter(|p| *p >= 1)
                        .ok_or_else(|| ApiError::validation("page must be a positive integer"))?;
                }
                "limit" => {
                    let limit: usize = value
                        .parse()
                        .ok()
                        .filter(|l| *l >= 1)
                        .ok_or_else(|| ApiError::validation("limit must be a positive integer"))?;
                    query.limit = limit.min(MAX_LIMIT);
                }
                "sort" => {
                    let value = value.trim();
                    let (field, descending) = match value.strip_prefix('-') {
                        Some(field) => (field, true),
                        None => (value, false),
                    };
                    if field.is_empty() {
                        return Err(ApiError::validation("sort needs a field name"));
                    }
                    query.sort = Some(SortKey {
                        pointer: field_pointer(field),
                        descending,
                    });
                }
                "q" => {
                    let q = value.trim().to_lowercase();
                    query.q = (!q.is_empty()).then_some(q);
                }
                _ => filters.push((key, value)),
            }
        }

        filters.sort();
        query.filters = filters;
        Ok(query)
    }

    /// Filter, search, sort and cut one page out of `items`.
    pub fn apply(&self, spec: &ListSpec, items: Vec<Value>) -> Result<Page, ApiError> {
        let mut selected = Vec::with_capacity(items.len());
        let mut filters = Vec::with_capacity(self.filters.len());
        for (key, expected) in &self.filters {
            let pointer = spec
                .filter_pointer(key)
                .ok_or_else(|| ApiError::validation(format!("unknown filter '{key}'")))?;
            filters.push((pointer, expected.as_str()));
        }

        for item in items {
            let passes_filters = filters
                .iter()
                .all(|(pointer, expected)| matches_exact(item.pointer(pointer), expected));
            let passes_search = match &self.q {
                None => true,
                Some(q) => spec.search.iter().any(|pointer| {
                    item.pointer(pointer)
                        .and_then(Value::as_str)
                        .is_some_and(|text| text.to_lowercase().contains(q.as_str()))
                }),
            };
            if passes_filters && passes_search {
                selected.push(item);
            }
        }

        if let Some(sort) = &self.sort {
            selected.sort_by(|a, b| {
                let ord = compare(a.pointer(&sort.pointer), b.pointer(&sort.pointer));
                if sort.descending { ord.reverse() } else { ord }
            });
        }

        let total = selected.len();
        let total_pages = total.div_ceil(self.limit);
        let items = selected
            .into_iter()
            .skip((self.page - 1).saturating_mul(self.limit))
            .take(self.limit)
            .collect();

        Ok(Page {
            items,
            pagination: Pagination {
                page: self.page,
                limit: self.limit,
                total,
                total_pages,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Value>,
    pub pagination: Pagination,
}

/// `customer.name` → `/customer/name`.
fn field_pointer(field: &str) -> String {
    field.split('.').fold(String::new(), |mut acc, part| {
        acc.push('/');
        acc.push_str(part);
        acc
    })
}

fn matches_exact(value: Option<&Value>, expected: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        Some(Value::Null) | None => expected == "null",
        Some(Value::Array(items)) => items.iter().any(|v| matches_exact(Some(v), expected)),
        Some(Value::Object(_)) => false,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Body of the operations that only take a reason (anular, cancelar).
#[derive(Debug, Clone, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

/// Body with an optional effective date; defaults to today.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRequest {
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPEC: ListSpec = ListSpec {
        search: &["/name", "/customer/name"],
        filters: &[("status", "/status"), ("customer_id", "/customer/id")],
    };

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn items() -> Vec<Value> {
        vec![
            json!({"name": "Terraza", "status": "free", "seats": 4, "customer": {"id": "a", "name": "Bar Pepe"}}),
            json!({"name": "Barra", "status": "occupied", "seats": 2, "customer": {"id": "b", "name": "Obras Norte"}}),
            json!({"name": "Comedor", "status": "free", "seats": 10, "customer": null}),
        ]
    }

    #[test]
    fn defaults_and_limit_cap() {
        let q = ListQuery::parse(params(&[("limit", "5000")])).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, MAX_LIMIT);
        assert!(ListQuery::parse(params(&[("page", "0")])).is_err());
    }

    #[test]
    fn filters_search_and_sorts() {
        let q = ListQuery::parse(params(&[("status", "free"), ("sort", "-seats")])).unwrap();
        let page = q.apply(&SPEC, items()).unwrap();
        let names: Vec<_> = page.items.iter().map(|i| i["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Comedor", "Terraza"]);
        assert_eq!(page.pagination.total, 2);

        let q = ListQuery::parse(params(&[("q", "norte")])).unwrap();
        assert_eq!(q.apply(&SPEC, items()).unwrap().items[0]["name"], "Barra");

        let q = ListQuery::parse(params(&[("customer_id", "a")])).unwrap();
        assert_eq!(q.apply(&SPEC, items()).unwrap().pagination.total, 1);
    }

    #[test]
    fn pages_are_cut_after_filtering() {
        let q = ListQuery::parse(params(&[("limit", "2"), ("page", "2"), ("sort", "name")])).unwrap();
        let page = q.apply(&SPEC, items()).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0]["name"], "Terraza");
        assert_eq!(
            page.pagination,
            Pagination { page: 2, limit: 2, total: 3, total_pages: 2 }
        );
    }

    #[test]
    fn page_far_past_the_end_is_empty() {
        let page = usize::MAX.to_string();
        let q = ListQuery::parse(params(&[("page", page.as_str()), ("limit", "200")])).unwrap();
        let page = q.apply(&SPEC, items()).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.pagination.page, usize::MAX);
    }

    #[test]
    fn unknown_filters_are_rejected() {
        let q = ListQuery::parse(params(&[("colour", "red")])).unwrap();
        assert!(matches!(q.apply(&SPEC, items()), Err(ApiError::Validation(_))));
    }
}
