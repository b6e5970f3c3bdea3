use std::sync::Arc;

use expenseflow_api::app::{self, AppServices};
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over the in-memory store, bound to an ephemeral port.
        let app = app::router(Arc::new(AppServices::in_memory()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn open_account(&self, number: &str, balance: &str) -> String {
        let (status, body) = self
            .post(
                "/api/accounts",
                json!({ "name": "BBVA Principal", "account_number": number, "balance": balance }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn approved_expense(&self, amount: &str) -> String {
        let (status, body) = self
            .post(
                "/api/expenses",
                json!({ "description": "Boletos de avión", "amount": amount, "category": "Viáticos" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["id"].as_str().unwrap().to_string();
        for action in ["send", "approve"] {
            let (status, body) = self
                .post(&format!("/api/expenses/{id}/transition"), json!({ "action": action }))
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
        }
        id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "in_memory");
}

#[tokio::test]
async fn prepare_and_confirm_settles_expense() {
    let srv = TestServer::spawn().await;
    let account_id = srv.open_account("0001", "1000").await;
    let expense_id = srv.approved_expense("1000").await;

    let (status, body) = srv
        .post(
            &format!("/api/expenses/{expense_id}/payments"),
            json!({ "account_id": account_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["reference_code"].as_str().unwrap().starts_with("PAY-"));
    assert_eq!(body["status"], "pending");
    let payment_id = body["payment_id"].as_str().unwrap().to_string();

    let (_, expense) = srv.get(&format!("/api/expenses/{expense_id}")).await;
    assert_eq!(expense["status"], "in_payment");

    let (status, body) = srv
        .post(&format!("/api/payments/{payment_id}/confirm"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "paid");
    assert!(body["payment_date"].is_string());

    let (_, account) = srv.get(&format!("/api/accounts/{account_id}")).await;
    assert_eq!(account["balance"], "0.00");
    let (_, expense) = srv.get(&format!("/api/expenses/{expense_id}")).await;
    assert_eq!(expense["status"], "paid");

    // Second confirm is a business-rule violation.
    let (status, body) = srv
        .post(&format!("/api/payments/{payment_id}/confirm"), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn insufficient_funds_is_bad_request_and_changes_nothing() {
    let srv = TestServer::spawn().await;
    let account_id = srv.open_account("0002", "500").await;
    let expense_id = srv.approved_expense("1000").await;

    let (status, body) = srv
        .post(
            &format!("/api/expenses/{expense_id}/payments"),
            json!({ "account_id": account_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "insufficient_funds");

    let (_, expense) = srv.get(&format!("/api/expenses/{expense_id}")).await;
    assert_eq!(expense["status"], "approved");
    let (_, payments) = srv.get(&format!("/api/expenses/{expense_id}/payments")).await;
    assert_eq!(payments.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn transitions_are_validated() {
    let srv = TestServer::spawn().await;
    let (_, body) = srv
        .post(
            "/api/expenses",
            json!({ "description": "Comida con cliente", "amount": 350.5, "category": "Representación" }),
        )
        .await;
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "draft");

    let (status, body) = srv
        .post(&format!("/api/expenses/{id}/transition"), json!({ "action": "approve" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_transition");

    let (status, body) = srv
        .post(&format!("/api/expenses/{id}/transition"), json!({ "action": "begin_payment" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = srv
        .post(&format!("/api/expenses/{id}/transition"), json!({ "action": "send" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn cancel_releases_expense_for_a_new_payment() {
    let srv = TestServer::spawn().await;
    let account_id = srv.open_account("0003", "300").await;
    let expense_id = srv.approved_expense("100").await;
    let path = format!("/api/expenses/{expense_id}/payments");

    let (_, first) = srv.post(&path, json!({ "account_id": account_id })).await;
    let first_id = first["payment_id"].as_str().unwrap().to_string();

    let (status, body) = srv
        .post(&format!("/api/payments/{first_id}/cancel"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, second) = srv.post(&path, json!({ "account_id": account_id })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(second["payment_id"], first["payment_id"]);

    let (_, history) = srv.get(&path).await;
    let statuses: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["cancelled", "pending"]);
}

#[tokio::test]
async fn concurrent_prepares_over_http_commit_once() {
    let srv = Arc::new(TestServer::spawn().await);
    let account_id = srv.open_account("0004", "5000").await;
    let expense_id = srv.approved_expense("1200").await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let srv = srv.clone();
        let (e, a) = (expense_id.clone(), account_id.clone());
        handles.push(tokio::spawn(async move {
            srv.post(&format!("/api/expenses/{e}/payments"), json!({ "account_id": a }))
                .await
        }));
    }

    let mut codes = Vec::new();
    for h in handles {
        let (status, body) = h.await.unwrap();
        codes.push((status, body["error"].as_str().map(str::to_string)));
    }
    codes.sort_by_key(|(s, _)| s.as_u16());
    assert_eq!(codes[0].0, StatusCode::CREATED);
    assert_eq!(codes[1], (StatusCode::BAD_REQUEST, Some("not_approved".to_string())));
}

#[tokio::test]
async fn error_statuses() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get("/api/expenses/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, body) = srv
        .get("/api/payments/0192a4f0-0000-7000-8000-000000000000")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    srv.open_account("DUP-1", "0").await;
    let (status, body) = srv
        .post("/api/accounts", json!({ "name": "Otra", "account_number": "DUP-1" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = srv
        .post(
            "/api/expenses",
            json!({ "description": "x", "amount": "-5", "category": "y" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = srv.post("/api/expenses", json!({ "amount": "5" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_body");
}

#[tokio::test]
async fn account_defaults_to_zero_balance_in_mxn() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv
        .post("/api/accounts", json!({ "name": "Caja chica", "account_number": "CC-01" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap();

    let (_, account) = srv.get(&format!("/api/accounts/{id}")).await;
    assert_eq!(account["balance"], "0.00");
    assert_eq!(account["currency"], "MXN");

    let (_, all) = srv.get("/api/accounts").await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}
