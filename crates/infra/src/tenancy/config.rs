use serde::{Deserialize, Serialize};

use gestiona_core::TenantId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Give unknown tenants from valid tokens an in-memory runtime.
    #[serde(default = "default_true")]
    pub auto_provision: bool,
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            auto_provision: true,
            tenants: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: TenantId,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub company: CompanyProfile,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_true() -> bool {
    true
}

impl TenantConfig {
    /// Placeholder profile for auto-provisioned tenants.
    pub fn provisional(id: TenantId) -> Self {
        let short = id.to_string().chars().take(8).collect::<String>();
        Self {
            id,
            name: format!("Empresa {short}"),
            active: true,
            company: CompanyProfile {
                legal_name: format!("Empresa {short}"),
                ..CompanyProfile::default()
            },
            database: DatabaseConfig::default(),
        }
    }
}

/// Issuer data printed on documents and used as SEPA creditor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    #[serde(default)]
    pub legal_name: String,
    #[serde(default)]
    pub tax_id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub bic: Option<String>,
    #[serde(default)]
    pub sepa_creditor_id: Option<String>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseKind {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub kind: DatabaseKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: DatabaseKind::Memory,
            url: None,
            max_connections: default_max_connections(),
        }
    }
}
