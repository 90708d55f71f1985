//! Process configuration.
//!
//! Merge order (later wins): built-in defaults, `config/default.toml`,
//! `config/{APP_ENV}.toml`, then `GESTIONA_*` environment variables with `__`
//! separating nested keys (`GESTIONA_SERVER__PORT=9000`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gestiona_infra::tenancy::TenancyConfig;
use gestiona_observability::TelemetryConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer.
    pub jwt_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub tenancy: TenancyConfig,
}

impl AppConfig {
    /// Load from `config_dir` and the process environment. Reads `.env` first if present.
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        Self::figment(config_dir, &env)
            .merge(Env::prefixed("GESTIONA_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Defaults plus the TOML files, without the environment layer.
    pub fn figment(config_dir: &str, env: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(format!("{config_dir}/default.toml")))
            .merge(Toml::file(format!("{config_dir}/{env}.toml")))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn is_default_secret(&self) -> bool {
        self.auth.jwt_secret == AuthConfig::default().jwt_secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gestiona_infra::tenancy::DatabaseKind;

    #[test]
    fn defaults_apply_without_files() {
        let config: AppConfig = AppConfig::figment("/nonexistent", "test").extract().unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.tenancy.auto_provision);
        assert!(config.is_default_secret());
    }

    #[test]
    fn toml_layers_override_defaults() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [auth]
            jwt_secret = "s3cret"

            [tenancy]
            auto_provision = false

            [[tenancy.tenants]]
            id = "0190b2a4-7a1e-7cc0-8d2e-3f1a2b3c4d5e"
            name = "Bar Pepe"

            [tenancy.tenants.company]
            legal_name = "Bar Pepe S.L."
            tax_id = "B12345678"
            sepa_creditor_id = "ES12000B12345678"

            [tenancy.tenants.database]
            kind = "postgres"
            url = "postgres://localhost/barpepe"
        "#;
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert!(!config.is_default_secret());
        assert!(!config.tenancy.auto_provision);
        let tenant = &config.tenancy.tenants[0];
        assert!(tenant.active);
        assert_eq!(tenant.company.legal_name, "Bar Pepe S.L.");
        assert_eq!(tenant.database.kind, DatabaseKind::Postgres);
        assert_eq!(tenant.database.max_connections, 5);
    }
}
