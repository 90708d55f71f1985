//! Counterparty references embedded in commercial documents.

use serde::{Deserialize, Serialize};

use crate::error::DomainResult;
use crate::id::AggregateId;
use crate::validation::{optional_text, required_text};

/// Customer as printed on a document. `id` is absent for walk-in customers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    #[serde(default)]
    pub id: Option<AggregateId>,
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl CustomerRef {
    pub fn normalized(self) -> DomainResult<Self> {
        Ok(Self {
            id: self.id,
            name: required_text("customer name", &self.name)?,
            tax_id: optional_text(self.tax_id.as_deref()).map(|t| t.to_uppercase()),
            address: optional_text(self.address.as_deref()),
        })
    }

    /// Same customer: equal ids, or equal names (case-insensitive) when neither has an id.
    pub fn same_as(&self, other: &CustomerRef) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name.trim().eq_ignore_ascii_case(other.name.trim()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> CustomerRef {
        CustomerRef {
            id: None,
            name: name.into(),
            tax_id: None,
            address: None,
        }
    }

    #[test]
    fn identity() {
        let id = AggregateId::new();
        let a = CustomerRef { id: Some(id), ..named("Bar Pepe") };
        let b = CustomerRef { id: Some(id), ..named("Bar Pepe S.L.") };
        assert!(a.same_as(&b));
        assert!(named("bar pepe").same_as(&named("Bar Pepe ")));
        assert!(!a.same_as(&named("Bar Pepe")));
    }

    #[test]
    fn tax_id_is_uppercased() {
        let c = CustomerRef {
            tax_id: Some(" b12345678 ".into()),
            ..named("Obras Norte")
        }
        .normalized()
        .unwrap();
        assert_eq!(c.tax_id.as_deref(), Some("B12345678"));
    }
}
