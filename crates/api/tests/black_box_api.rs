use chrono::{Duration as ChronoDuration, Utc};
use gestiona_api::config::AppConfig;
use gestiona_auth::{JwtClaims, PrincipalId, Role};
use gestiona_core::TenantId;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory tenants, ephemeral port.
        let mut config = AppConfig::default();
        config.auth.jwt_secret = SECRET.to_string();
        let app = gestiona_api::app::build_app(&config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, roles: &[&'static str]) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        tenant_id,
        roles: roles.iter().map(|r| Role::new(*r)).collect(),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn send(req: reqwest::RequestBuilder) -> (StatusCode, Value) {
    let res = req.send().await.unwrap();
    let status = res.status();
    let body = res.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_or_forged_token_is_unauthorized() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = send(client.get(server.url("/api/salones"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(
        client
            .get(server.url("/api/salones"))
            .bearer_auth("not-a-token"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reports_tenant_and_roles() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = TenantId::new();
    let token = mint_jwt(tenant, &["manager"]);

    let (status, body) = send(client.get(server.url("/api/whoami")).bearer_auth(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tenant_id"], tenant.to_string());
    assert_eq!(body["data"]["roles"], json!(["manager"]));
}

#[tokio::test]
async fn salon_with_tables_round_trip() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let (status, body) = send(
        client
            .post(server.url("/api/salones"))
            .bearer_auth(&token)
            .json(&json!({ "name": "Terraza" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    let salon_id = body["data"]["id"].as_str().unwrap().to_string();

    for (number, max) in [(1, 4), (2, 6)] {
        let (status, body) = send(
            client
                .post(server.url("/api/mesas"))
                .bearer_auth(&token)
                .json(&json!({
                    "salon_id": salon_id,
                    "number": number,
                    "position": { "x": 100 * number, "y": 50 },
                    "capacity": { "min": 1, "max": max },
                })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    // Same number in the same salon.
    let (status, body) = send(
        client
            .post(server.url("/api/mesas"))
            .bearer_auth(&token)
            .json(&json!({ "salon_id": salon_id, "number": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = send(
        client
            .get(server.url(&format!("/api/salones/{salon_id}/mesas")))
            .bearer_auth(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tables = body["data"].as_array().unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0]["number"], 1);

    let (_, body) = send(
        client
            .get(server.url(&format!("/api/salones/{salon_id}")))
            .bearer_auth(&token),
    )
    .await;
    assert_eq!(body["data"]["table_count"], 2);
    assert_eq!(body["data"]["total_capacity"], 10);

    let (status, body) = send(
        client
            .get(server.url("/api/salones?q=terr"))
            .bearer_auth(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["page"], 1);

    // A salon with tables cannot be deleted.
    let (status, body) = send(
        client
            .delete(server.url(&format!("/api/salones/{salon_id}")))
            .bearer_auth(&token),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
}

#[tokio::test]
async fn waiter_can_seat_guests_but_not_edit_salons() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = TenantId::new();
    let manager = mint_jwt(tenant, &["manager"]);
    let waiter = mint_jwt(tenant, &["waiter"]);

    let (_, body) = send(
        client
            .post(server.url("/api/salones"))
            .bearer_auth(&manager)
            .json(&json!({ "name": "Comedor" })),
    )
    .await;
    let salon_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        client
            .post(server.url("/api/salones"))
            .bearer_auth(&waiter)
            .json(&json!({ "name": "Barra" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = send(
        client
            .post(server.url("/api/mesas"))
            .bearer_auth(&waiter)
            .json(&json!({ "salon_id": salon_id, "number": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let table_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/mesas/{table_id}/estado")))
            .bearer_auth(&waiter)
            .json(&json!({ "status": "occupied" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "occupied");

    let (status, _) = send(
        client
            .get(server.url(&format!("/api/mesas/{}", Uuid::now_v7())))
            .bearer_auth(&waiter),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let a = mint_jwt(TenantId::new(), &["admin"]);
    let b = mint_jwt(TenantId::new(), &["admin"]);

    let (status, _) = send(
        client
            .post(server.url("/api/salones"))
            .bearer_auth(&a)
            .json(&json!({ "name": "Solo A" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(client.get(server.url("/api/salones")).bearer_auth(&b)).await;
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn transfer_moves_stock_between_warehouses() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["warehouse"]);

    let origin = Uuid::now_v7().to_string();
    let destination = Uuid::now_v7().to_string();
    let product = Uuid::now_v7().to_string();

    let (status, body) = send(
        client
            .post(server.url("/api/stock/ajustes"))
            .bearer_auth(&token)
            .json(&json!({
                "warehouse_id": origin,
                "product_id": product,
                "product_name": "Cerveza barril 30L",
                "delta": 10,
            })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = send(
        client
            .post(server.url("/api/traspasos"))
            .bearer_auth(&token)
            .json(&json!({
                "origin_warehouse_id": origin,
                "destination_warehouse_id": destination,
                "lines": [{ "product_id": product, "product_name": "Cerveza barril 30L", "requested": 4 }],
            })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "draft");
    assert!(body["data"]["number"].as_str().unwrap().starts_with("TRA"));
    let transfer_id = body["data"]["id"].as_str().unwrap().to_string();

    for (step, expected) in [
        ("confirmar", "pending_shipment"),
        ("confirmar-salida", "in_transit"),
        ("confirmar-recepcion", "received"),
    ] {
        let (status, body) = send(
            client
                .post(server.url(&format!("/api/traspasos/{transfer_id}/{step}")))
                .bearer_auth(&token),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
        assert_eq!(body["data"]["status"], expected);
    }

    let on_hand = |warehouse: String| {
        let client = client.clone();
        let url = server.url(&format!("/api/stock?warehouse_id={warehouse}&product_id={product}"));
        let token = token.clone();
        async move {
            let (_, body) = send(client.get(url).bearer_auth(&token)).await;
            body["data"][0]["on_hand"].as_i64().unwrap()
        }
    };
    assert_eq!(on_hand(origin).await, 6);
    assert_eq!(on_hand(destination).await, 4);

    // Received transfers are final.
    let (status, body) = send(
        client
            .post(server.url(&format!("/api/traspasos/{transfer_id}/anular")))
            .bearer_auth(&token)
            .json(&json!({ "reason": "error" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
}

#[tokio::test]
async fn shipping_more_than_on_hand_is_rejected() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["warehouse"]);

    let (_, body) = send(
        client
            .post(server.url("/api/traspasos"))
            .bearer_auth(&token)
            .json(&json!({
                "origin_warehouse_id": Uuid::now_v7(),
                "destination_warehouse_id": Uuid::now_v7(),
                "lines": [{ "product_id": Uuid::now_v7(), "product_name": "Vino", "requested": 2 }],
            })),
    )
    .await;
    let transfer_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        client
            .post(server.url(&format!("/api/traspasos/{transfer_id}/confirmar")))
            .bearer_auth(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/traspasos/{transfer_id}/confirmar-salida")))
            .bearer_auth(&token),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invariant_violation");
}

#[tokio::test]
async fn delivery_notes_are_invoiced_and_released_on_void() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["accountant"]);

    let (status, body) = send(
        client
            .post(server.url("/api/albaranes"))
            .bearer_auth(&token)
            .json(&json!({
                "customer": { "name": "Construcciones Ruiz", "tax_id": "b11111111" },
                "date": "2026-03-02",
                "lines": [{ "description": "Menú del día", "quantity": 2000, "unit_price": 1200 }],
            })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["number"], "ALB2026-00001");
    assert_eq!(body["data"]["totals"]["total"], 2904);
    let note_id = body["data"]["id"].as_str().unwrap().to_string();

    // Drafts cannot be invoiced.
    let (status, _) = send(
        client
            .post(server.url("/api/albaranes/facturar"))
            .bearer_auth(&token)
            .json(&json!({ "delivery_note_ids": [note_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        client
            .post(server.url(&format!("/api/albaranes/{note_id}/entregar")))
            .bearer_auth(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        client
            .post(server.url("/api/albaranes/facturar"))
            .bearer_auth(&token)
            .json(&json!({ "delivery_note_ids": [note_id], "issue_date": "2026-03-10" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["number"], "FAC2026-00001");
    assert_eq!(body["data"]["status"], "issued");
    assert_eq!(body["data"]["due_date"], "2026-03-10");
    assert_eq!(body["data"]["totals"]["total"], 2904);
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(
        client
            .get(server.url(&format!("/api/albaranes/{note_id}")))
            .bearer_auth(&token),
    )
    .await;
    assert_eq!(body["data"]["status"], "invoiced");

    let res = client
        .get(server.url(&format!("/api/facturas/{invoice_id}/pdf")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert!(res.bytes().await.unwrap().starts_with(b"%PDF"));

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/facturas/{invoice_id}/anular")))
            .bearer_auth(&token)
            .json(&json!({ "reason": "datos fiscales erróneos" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "void");

    let (_, body) = send(
        client
            .get(server.url(&format!("/api/albaranes/{note_id}")))
            .bearer_auth(&token),
    )
    .await;
    assert_eq!(body["data"]["status"], "delivered");

    let (status, _) = send(
        client
            .post(server.url(&format!("/api/facturas/{invoice_id}/pagos")))
            .bearer_auth(&token)
            .json(&json!({ "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

async fn post(client: &reqwest::Client, url: String, token: &str, body: Value) -> (StatusCode, Value) {
    send(client.post(url).bearer_auth(token).json(&body)).await
}

async fn get(client: &reqwest::Client, url: String, token: &str) -> (StatusCode, Value) {
    send(client.get(url).bearer_auth(token)).await
}

fn id_of(body: &Value) -> String {
    body["data"]["id"].as_str().unwrap().to_string()
}

const IBAN: &str = "ES9121000418450200051332";

async fn issue_invoice(server: &TestServer, client: &reqwest::Client, token: &str, body: Value) -> Value {
    let (status, body) = post(client, server.url("/api/facturas"), token, body).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

#[tokio::test]
async fn remittance_moves_its_receipts_and_pays_the_invoice() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let invoice = issue_invoice(
        &server,
        &client,
        &token,
        json!({
            "customer": { "name": "Bar Lucía", "tax_id": "b22222222" },
            "issue_date": "2026-03-10",
            "lines": [{ "description": "Mantenimiento cámara", "quantity": 1000, "unit_price": 10000 }],
        }),
    )
    .await;
    assert_eq!(invoice["totals"]["total"], 12100);
    let invoice_id = invoice["id"].as_str().unwrap().to_string();

    let (status, body) = post(
        &client,
        server.url(&format!("/api/recibos/desde-factura/{invoice_id}")),
        &token,
        json!({ "debtor_iban": IBAN, "mandate": { "reference": "MAND-0001", "signed_on": "2025-01-15" } }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let receipts = body["data"].as_array().unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0]["amount"], 12100);
    let receipt_id = receipts[0]["id"].as_str().unwrap().to_string();
    let receipt_url = server.url(&format!("/api/recibos/{receipt_id}"));

    let collection_date = (Utc::now().date_naive() + ChronoDuration::days(7)).to_string();
    let (status, body) = post(
        &client,
        server.url("/api/remesas"),
        &token,
        json!({ "receipt_ids": [receipt_id], "collection_date": collection_date }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "draft");
    let remittance_id = id_of(&body);
    let remittance_url = server.url(&format!("/api/remesas/{remittance_id}"));

    // A remitted receipt only moves with its remittance.
    for step in ["enviar", "cobrar"] {
        let (status, body) = post(&client, format!("{receipt_url}/{step}"), &token, json!({})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{step}: {body}");
    }
    let (_, body) = get(&client, receipt_url.clone(), &token).await;
    assert_eq!(body["data"]["status"], "issued");
    let (_, body) = get(&client, remittance_url.clone(), &token).await;
    assert_eq!(body["data"]["status"], "draft");

    let (status, body) = post(&client, format!("{remittance_url}/enviar"), &token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "sent");
    let (_, body) = get(&client, receipt_url.clone(), &token).await;
    assert_eq!(body["data"]["status"], "sent");
    assert_eq!(body["data"]["remittance_id"], remittance_id);

    let (status, _) = post(&client, format!("{receipt_url}/cobrar"), &token, json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = post(&client, format!("{remittance_url}/cobrar"), &token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "settled");
    let (_, body) = get(&client, receipt_url.clone(), &token).await;
    assert_eq!(body["data"]["status"], "collected");

    let invoice_url = server.url(&format!("/api/facturas/{invoice_id}"));
    let (_, body) = get(&client, invoice_url.clone(), &token).await;
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["total_paid"], 12100);
    assert_eq!(body["data"]["outstanding_amount"], 0);

    // The bank returns the debit: the payment comes off the invoice.
    let (status, body) = post(
        &client,
        format!("{receipt_url}/devolver"),
        &token,
        json!({ "reason": "AM04 fondos insuficientes", "bank_fee": 300 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "returned");
    assert_eq!(body["data"]["remittance_id"], Value::Null);

    let (_, body) = get(&client, invoice_url, &token).await;
    assert_eq!(body["data"]["status"], "issued");
    assert_eq!(body["data"]["total_paid"], 0);
    assert_eq!(body["data"]["outstanding_amount"], 12100);

    // Returned receipts can be remitted again; cancelling hands them back.
    let (status, body) = post(
        &client,
        server.url("/api/remesas"),
        &token,
        json!({ "receipt_ids": [receipt_id], "collection_date": collection_date }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let second = id_of(&body);
    let (status, body) = post(
        &client,
        server.url(&format!("/api/remesas/{second}/anular")),
        &token,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");
    let (_, body) = get(&client, receipt_url, &token).await;
    assert_eq!(body["data"]["status"], "returned");
    assert_eq!(body["data"]["remittance_id"], Value::Null);
}

#[tokio::test]
async fn receipts_follow_the_payment_method_schedule() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let (status, body) = post(
        &client,
        server.url("/api/formas-pago"),
        &token,
        json!({
            "code": "30-60",
            "name": "Giro 30/60 días",
            "kind": "direct_debit",
            "installments": [{ "days": 30, "share_bp": 5000 }, { "days": 60, "share_bp": 5000 }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let method_id = id_of(&body);

    let invoice = issue_invoice(
        &server,
        &client,
        &token,
        json!({
            "customer": { "name": "Hostal Mar" },
            "issue_date": "2026-04-01",
            "payment_method_id": method_id,
            "lines": [{ "description": "Lote menaje", "quantity": 1000, "unit_price": 10000 }],
        }),
    )
    .await;
    let invoice_id = invoice["id"].as_str().unwrap().to_string();
    let from_invoice = server.url(&format!("/api/recibos/desde-factura/{invoice_id}"));

    let (status, body) = post(&client, from_invoice.clone(), &token, json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let receipts = body["data"].as_array().unwrap();
    assert_eq!(receipts.len(), 2);
    assert_eq!(receipts[0]["amount"], 6050);
    assert_eq!(receipts[0]["due_date"], "2026-05-01");
    assert_eq!(receipts[1]["amount"], 6050);
    assert_eq!(receipts[1]["due_date"], "2026-05-31");
    assert!(receipts[1]["concept"].as_str().unwrap().ends_with("(2/2)"));

    // Already covered.
    let (status, _) = post(&client, from_invoice, &token, json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // One cent cannot be split in two: no empty receipt is issued.
    let tiny = issue_invoice(
        &server,
        &client,
        &token,
        json!({
            "customer": { "name": "Hostal Mar" },
            "issue_date": "2026-04-01",
            "payment_method_id": method_id,
            "lines": [{ "description": "Redondeo", "quantity": 1000, "unit_price": 1, "tax_rate_bp": 0 }],
        }),
    )
    .await;
    assert_eq!(tiny["totals"]["total"], 1);
    let (status, body) = post(
        &client,
        server.url(&format!("/api/recibos/desde-factura/{}", tiny["id"].as_str().unwrap())),
        &token,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let receipts = body["data"].as_array().unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0]["amount"], 1);

    let (_, body) = get(&client, server.url("/api/recibos"), &token).await;
    assert_eq!(body["pagination"]["total"], 3);
}

#[tokio::test]
async fn oversized_numbers_are_rejected_not_wrapped() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let (status, body) = post(
        &client,
        server.url("/api/stock/ajustes"),
        &token,
        json!({
            "warehouse_id": Uuid::now_v7(),
            "product_id": Uuid::now_v7(),
            "product_name": "Harina",
            "delta": i64::MAX,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "validation_error");

    let (status, body) = post(
        &client,
        server.url("/api/formas-pago"),
        &token,
        json!({
            "code": "WRAP",
            "name": "Reparto imposible",
            "kind": "bank_transfer",
            "installments": [{ "days": 0, "share_bp": u32::MAX }, { "days": 30, "share_bp": 10_001 }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = post(
        &client,
        server.url("/api/facturas"),
        &token,
        json!({
            "customer": { "name": "Cliente" },
            "lines": [{ "description": "Todo", "quantity": i64::MAX, "unit_price": u64::MAX }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (_, body) = post(&client, server.url("/api/salones"), &token, json!({ "name": "Patio" })).await;
    let salon_id = id_of(&body);
    let (status, _) = post(
        &client,
        server.url("/api/mesas"),
        &token,
        json!({ "salon_id": salon_id, "number": 1, "capacity": { "min": 1, "max": u32::MAX } }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(
        &client,
        server.url(&format!("/api/salones?page={}&limit=100", usize::MAX)),
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["pagination"]["total"], 1);
}

async fn table(server: &TestServer, client: &reqwest::Client, token: &str, salon_id: &str, number: u32, max: u32) -> String {
    let (status, body) = post(
        client,
        server.url("/api/mesas"),
        token,
        json!({ "salon_id": salon_id, "number": number, "capacity": { "min": 1, "max": max } }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    id_of(&body)
}

#[tokio::test]
async fn tables_group_within_one_salon() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let (_, body) = post(&client, server.url("/api/salones"), &token, json!({ "name": "Comedor" })).await;
    let dining = id_of(&body);
    let (_, body) = post(&client, server.url("/api/salones"), &token, json!({ "name": "Terraza" })).await;
    let terrace = id_of(&body);

    let t1 = table(&server, &client, &token, &dining, 1, 4).await;
    let t2 = table(&server, &client, &token, &dining, 2, 6).await;
    let t3 = table(&server, &client, &token, &terrace, 3, 2).await;
    let group_url = server.url("/api/mesas/agrupar");

    let (status, body) = post(&client, group_url.clone(), &token, json!({ "table_ids": [t1, t3], "main_table_id": t1 })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    let (status, body) = post(&client, group_url.clone(), &token, json!({ "table_ids": [t1, t2], "main_table_id": t3 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = post(&client, group_url.clone(), &token, json!({ "table_ids": [t1, t2], "main_table_id": t1 })).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["capacity"], 10);
    let group_id = body["data"]["group_id"].clone();

    let (_, body) = get(&client, server.url(&format!("/api/mesas/{t2}")), &token).await;
    assert_eq!(body["data"]["group"]["group_id"], group_id);
    assert_eq!(body["data"]["group"]["main_table_id"], t1.as_str());

    let (status, body) = post(&client, group_url, &token, json!({ "table_ids": [t2, t1], "main_table_id": t2 })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    let (status, body) = post(&client, server.url(&format!("/api/mesas/{t2}/desagrupar")), &token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["tables"].as_array().unwrap().len(), 2);
    for id in [&t1, &t2] {
        let (_, body) = get(&client, server.url(&format!("/api/mesas/{id}")), &token).await;
        assert_eq!(body["data"]["group"], Value::Null);
    }

    let (status, _) = post(&client, server.url(&format!("/api/mesas/{t1}/desagrupar")), &token, json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn floor_plan_only_places_own_tables_on_the_canvas() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let (_, body) = post(&client, server.url("/api/salones"), &token, json!({ "name": "Comedor" })).await;
    let dining = id_of(&body);
    let (_, body) = post(&client, server.url("/api/salones"), &token, json!({ "name": "Barra" })).await;
    let bar = id_of(&body);
    let t1 = table(&server, &client, &token, &dining, 1, 4).await;
    let t2 = table(&server, &client, &token, &bar, 2, 2).await;
    let plan_url = server.url(&format!("/api/salones/{dining}/plano"));

    let put = |body: Value| {
        let req = client.put(plan_url.clone()).bearer_auth(&token).json(&body);
        send(req)
    };

    let (status, body) = put(json!({ "tables": [{ "table_id": t2, "position": { "x": 10, "y": 10 } }] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = put(json!({
        "tables": [
            { "table_id": t1, "position": { "x": 200, "y": 300 } },
            { "table_id": t1, "position": { "x": 5000, "y": 10 } },
        ],
    }))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    let (_, body) = get(&client, server.url(&format!("/api/mesas/{t1}")), &token).await;
    assert_ne!(body["data"]["position"]["x"], 200);

    let (status, body) = put(json!({
        "floor_plan": { "width": 6000, "height": 1500 },
        "tables": [{ "table_id": t1, "position": { "x": 5000, "y": 1200, "rotation": 450 } }],
    }))
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["salon"]["floor_plan"]["width"], 6000);
    let placed = &body["data"]["tables"][0];
    assert_eq!(placed["position"]["x"], 5000);
    assert_eq!(placed["position"]["rotation"], 90);
}

#[tokio::test]
async fn system_templates_are_read_only_but_duplicable() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let (status, body) = get(&client, server.url("/api/plantillas-documento?limit=100"), &token).await;
    assert_eq!(status, StatusCode::OK);
    let templates = body["data"].as_array().unwrap();
    assert_eq!(templates.len(), 5);
    assert!(templates.iter().all(|t| t["is_system"] == true));
    let invoice_template = templates
        .iter()
        .find(|t| t["document_type"] == "invoice")
        .unwrap();
    let system_id = invoice_template["id"].as_str().unwrap().to_string();
    let system_url = server.url(&format!("/api/plantillas-documento/{system_id}"));

    let (status, body) = send(
        client
            .put(system_url.clone())
            .bearer_auth(&token)
            .json(&json!({ "name": "Mía", "document_type": "invoice" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    let (status, _) = send(client.delete(system_url.clone()).bearer_auth(&token)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = post(&client, format!("{system_url}/duplicar"), &token, json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["is_system"], false);
    assert!(body["data"]["name"].as_str().unwrap().ends_with("(copia)"));
    let copy = id_of(&body);

    let (status, body) = send(
        client
            .put(server.url(&format!("/api/plantillas-documento/{copy}")))
            .bearer_auth(&token)
            .json(&json!({ "name": "Factura propia", "document_type": "invoice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["name"], "Factura propia");
}

#[tokio::test]
async fn new_default_template_replaces_the_previous_one() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["manager"]);
    let templates = server.url("/api/plantillas-documento");

    let (status, body) = post(
        &client,
        templates.clone(),
        &token,
        json!({ "name": "Clásica", "document_type": "invoice", "is_default": true }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["is_default"], true);
    let classic = id_of(&body);

    let (_, body) = post(
        &client,
        templates.clone(),
        &token,
        json!({ "name": "Moderna", "document_type": "invoice" }),
    )
    .await;
    let modern = id_of(&body);
    assert_eq!(body["data"]["is_default"], false);

    let (status, body) = post(
        &client,
        format!("{templates}/{modern}/predeterminada"),
        &token,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["is_default"], true);

    let (_, body) = get(&client, format!("{templates}/{classic}"), &token).await;
    assert_eq!(body["data"]["is_default"], false);

    let (status, body) = get(&client, format!("{templates}/predeterminada/invoice"), &token).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["id"], modern.as_str());

    // The default cannot be deleted; the old one now can.
    let (status, _) = send(client.delete(format!("{templates}/{modern}")).bearer_auth(&token)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = send(client.delete(format!("{templates}/{classic}")).bearer_auth(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn project_cost_report_adds_machinery_and_deliveries() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let (status, body) = post(
        &client,
        server.url("/api/proyectos"),
        &token,
        json!({ "code": "ob-12", "name": "Reforma local", "start_date": "2026-01-10", "budget": 100000 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["code"], "OB-12");
    let project_id = id_of(&body);

    let (status, body) = post(
        &client,
        server.url("/api/maquinaria"),
        &token,
        json!({ "code": "EXC-01", "name": "Excavadora", "kind": "vehicle", "hourly_cost": 4500 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let machine_id = id_of(&body);
    for (hours, project) in [(25, Some(project_id.as_str())), (40, None)] {
        let (status, body) = post(
            &client,
            server.url(&format!("/api/maquinaria/{machine_id}/usos")),
            &token,
            json!({ "date": "2026-02-01", "hours": hours, "project_id": project }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let (status, body) = post(
        &client,
        server.url("/api/albaranes"),
        &token,
        json!({
            "customer": { "name": "Comunidad Sol" },
            "date": "2026-02-03",
            "project_id": project_id,
            "lines": [{ "description": "Azulejo", "quantity": 1000, "unit_price": 20000 }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let note_id = id_of(&body);

    let costs_url = server.url(&format!("/api/proyectos/{project_id}/costes"));
    let (_, body) = get(&client, costs_url.clone(), &token).await;
    // Draft notes do not count yet.
    assert_eq!(body["data"]["machinery"], 11250);
    assert_eq!(body["data"]["delivered"], 0);

    let (status, _) = post(&client, server.url(&format!("/api/albaranes/{note_id}/entregar")), &token, json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&client, costs_url, &token).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let report = &body["data"];
    assert_eq!(report["project_id"], project_id.as_str());
    assert_eq!(report["budget"], 100000);
    assert_eq!(report["machinery"], 11250);
    assert_eq!(report["delivered"], 20000);
    assert_eq!(report["total"], 31250);
    assert_eq!(report["deviation"], -68750);
    assert_eq!(report["consumed_bp"], 3125);
    assert_eq!(report["over_budget"], false);
}
