use anyhow::Context;

use gestiona_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = std::env::var("GESTIONA_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config = AppConfig::load(&config_dir).context("loading configuration")?;

    gestiona_observability::init(&config.telemetry);

    if config.is_default_secret() {
        tracing::warn!("auth.jwt_secret not set; using insecure dev default");
    }

    let app = gestiona_api::app::build_app(&config);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        tenants = config.tenancy.tenants.len(),
        auto_provision = config.tenancy.auto_provision,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
