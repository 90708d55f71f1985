use axum::{Router, routing::get};

pub mod common;
pub mod delivery_notes;
pub mod invoices;
pub mod machinery;
pub mod payment_methods;
pub mod personnel;
pub mod projects;
pub mod receipts;
pub mod remittances;
pub mod salons;
pub mod stock;
pub mod system;
pub mod tables;
pub mod templates;
pub mod transfers;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/salones", salons::router())
        .nest("/mesas", tables::router())
        .nest("/plantillas-documento", templates::router())
        .nest("/traspasos", transfers::router())
        .nest("/stock", stock::router())
        .nest("/formas-pago", payment_methods::router())
        .nest("/recibos", receipts::router())
        .nest("/remesas", remittances::router())
        .nest("/personal", personnel::router())
        .nest("/maquinaria", machinery::router())
        .nest("/proyectos", projects::router())
        .nest("/albaranes", delivery_notes::router())
        .nest("/facturas", invoices::router())
}
