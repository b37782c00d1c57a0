use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use finmock_core::{FixtureGateway, GatewayError, MemoryFixtures, QueryVariant};
use finmock_server::http::router_with_gateway;
use finmock_server::routes::RouteCatalog;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const ROUTES: &str = r#"{
    "routes": [
        {
            "method": "GET",
            "uri": "/v1/bank/accounts",
            "parameters": [{ "in": "header", "name": "x-api-id" }]
        },
        {
            "method": "GET",
            "uri": "/v1/bank/accounts/{account_num}/transactions",
            "parameters": [
                { "in": "header", "name": "x-api-id" },
                { "in": "query", "name": "org_code" }
            ]
        },
        {
            "method": "POST",
            "uri": "/v1/insu/insurances/basic",
            "status": 201
        },
        {
            "method": "GET",
            "uri": "/v1/insu/insurances/{insu_num}/contracts",
            "status": [200, 203],
            "parameters": [{ "in": "cookie", "name": "session" }]
        }
    ]
}"#;

struct FailingGateway;

#[async_trait]
impl FixtureGateway for FailingGateway {
    async fn lookup(
        &self,
        _variant: QueryVariant,
        _params: &[String],
    ) -> Result<Option<serde_json::Value>, GatewayError> {
        Err(GatewayError::new("ERR_DB_UNAVAILABLE", "connection refused"))
    }

    async fn ready(&self) -> Result<(), GatewayError> {
        Err(GatewayError::new("ERR_DB_UNAVAILABLE", "connection refused"))
    }
}

fn transactions() -> serde_json::Value {
    json!({
        "rsp_code": "00000",
        "rsp_msg": "success",
        "trans_cnt": "5",
        "trans_list": [
            { "trans_dtime": "20210103093000", "trans_amt": "300" },
            { "trans_dtime": "20210105093000", "trans_amt": "500" },
            { "trans_dtime": "20210101093000", "trans_amt": "100" },
            { "trans_dtime": "20210104093000", "trans_amt": "400" },
            { "trans_dtime": "20210102093000", "trans_amt": "200" },
        ],
    })
}

fn seeded_fixtures() -> MemoryFixtures {
    let fixtures = MemoryFixtures::new();
    fixtures.insert(
        ["bank-001", "A1AAER0000", "0000000000"],
        json!({ "rsp_code": "00000", "account_cnt": "0", "account_list": [] }),
    );
    fixtures.insert(
        ["bank-004", "A1AAER0000", "B2BBBB0000", "100-200"],
        transactions(),
    );
    fixtures.insert(
        ["insu-002", "A1AAER0000", "0000000000", "I-777"],
        json!({ "rsp_code": "00000", "insu_type": "05" }),
    );
    fixtures.insert(
        ["insu-003", "A1AAER0000", "0000000000", "I-777"],
        json!({ "rsp_code": "00000", "contract_cnt": "1" }),
    );
    fixtures
}

async fn spawn_mock(gateway: Arc<dyn FixtureGateway>) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let catalog = RouteCatalog::from_json(ROUTES, &[]).expect("routes should parse");
    spawn_server(router_with_gateway(catalog, gateway)).await
}

async fn spawn_server(
    app: Router,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local_addr should succeed");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    (addr, shutdown_tx, handle)
}

async fn get_json(
    client: &reqwest::Client,
    url: String,
    api_id: Option<&str>,
) -> (reqwest::StatusCode, serde_json::Value) {
    let mut request = client.get(url).header("x-own-org-cd", "A1AAER0000");
    if let Some(api_id) = api_id {
        request = request.header("x-api-id", api_id);
    }
    let response = request.send().await.expect("request should succeed");
    let status = response.status();
    let body = response
        .json::<serde_json::Value>()
        .await
        .expect("response should be valid JSON");
    (status, body)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transaction_pages_follow_next_page_cursor() {
    let (addr, shutdown, task) = spawn_mock(Arc::new(seeded_fixtures())).await;
    let client = reqwest::Client::new();
    let base = format!(
        "http://{}/v1/bank/accounts/100-200/transactions?org_code=B2BBBB0000&limit=2",
        addr
    );

    let (status, first) = get_json(&client, base.clone(), Some("bank-004")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(first["trans_cnt"], json!("2"));
    assert_eq!(first["next_page"], json!("2"));
    assert_eq!(first["trans_list"][0]["trans_amt"], json!("500"));
    assert_eq!(first["trans_list"][1]["trans_amt"], json!("400"));

    let (_, second) = get_json(&client, format!("{}&next_page=2", base), Some("bank-004")).await;
    assert_eq!(second["next_page"], json!("4"));
    assert_eq!(second["trans_list"][0]["trans_amt"], json!("300"));
    assert_eq!(second["trans_list"][1]["trans_amt"], json!("200"));

    let (_, third) = get_json(&client, format!("{}&next_page=4", base), Some("bank-004")).await;
    assert_eq!(third["trans_cnt"], json!("1"));
    assert_eq!(third["trans_list"][0]["trans_amt"], json!("100"));
    assert!(third.get("next_page").is_none());

    let _ = shutdown.send(());
    let _ = task.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_outcomes_use_rsp_codes() {
    let (addr, shutdown, task) = spawn_mock(Arc::new(seeded_fixtures())).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, format!("http://{}/v1/unknown", addr), Some("x")).await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({ "rsp_code": "40401", "rsp_msg": "path not found: /v1/unknown" })
    );

    let (status, body) = get_json(
        &client,
        format!("http://{}/v1/bank/accounts/100-200/transactions", addr),
        None,
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body["rsp_code"], json!("40001"));
    assert_eq!(
        body["rsp_msg"],
        json!("missing required header parameter 'x-api-id', missing required query parameter 'org_code'")
    );

    let (status, body) = get_json(
        &client,
        format!("http://{}/v1/bank/accounts/999/transactions?org_code=B2BBBB0000", addr),
        Some("bank-004"),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
    assert_eq!(body["rsp_code"], json!("40402"));

    let _ = shutdown.send(());
    let _ = task.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn three_field_lookup_and_body_asset_lookup() {
    let (addr, shutdown, task) = spawn_mock(Arc::new(seeded_fixtures())).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(
        &client,
        format!("http://{}/v1/bank/accounts?limit=10", addr),
        Some("bank-001"),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["account_cnt"], json!("0"));
    assert_eq!(body["account_list"], json!([]));

    let response = client
        .post(format!("http://{}/v1/insu/insurances/basic", addr))
        .header("x-api-id", "insu-002")
        .header("x-own-org-cd", "A1AAER0000")
        .json(&json!({ "insu_num": "I-777" }))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    assert_eq!(
        response
            .headers()
            .get("x-powered-by")
            .and_then(|v| v.to_str().ok()),
        Some("finmock")
    );
    let body = response
        .json::<serde_json::Value>()
        .await
        .expect("response should be valid JSON");
    assert_eq!(body, json!({ "rsp_code": "00000", "insu_type": "05" }));

    let _ = shutdown.send(());
    let _ = task.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn gateway_failure_is_500_and_not_ready() {
    let (addr, shutdown, task) = spawn_mock(Arc::new(FailingGateway)).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(
        &client,
        format!("http://{}/v1/bank/accounts", addr),
        Some("bank-001"),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "rsp_code": "50001", "rsp_msg": "internal server error" })
    );

    let health = client
        .get(format!("http://{}/healthz", addr))
        .send()
        .await
        .expect("healthz should respond");
    assert!(health.status().is_success());

    let ready = client
        .get(format!("http://{}/readyz", addr))
        .send()
        .await
        .expect("readyz should respond");
    assert_eq!(ready.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let metrics = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .expect("metrics should respond")
        .text()
        .await
        .expect("metrics body should be text");
    assert!(metrics.contains("finmock_http_requests_total"));

    let _ = shutdown.send(());
    let _ = task.await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prefer_header_and_cookie_parameters() {
    let (addr, shutdown, task) = spawn_mock(Arc::new(seeded_fixtures())).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/insu/insurances/I-777/contracts", addr);

    let (status, body) = get_json(&client, url.clone(), Some("insu-003")).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(
        body["rsp_msg"],
        json!("missing required cookie parameter 'session'")
    );

    let send = |prefer: Option<&'static str>| {
        let mut request = client
            .get(url.clone())
            .header("x-api-id", "insu-003")
            .header("x-own-org-cd", "A1AAER0000")
            .header("cookie", "session=abc");
        if let Some(prefer) = prefer {
            request = request.header("prefer", prefer);
        }
        request.send()
    };

    let response = send(None).await.expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let response = send(Some("statusCode=203"))
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::NON_AUTHORITATIVE_INFORMATION);
    let body = response
        .json::<serde_json::Value>()
        .await
        .expect("response should be valid JSON");
    assert_eq!(body["contract_cnt"], json!("1"));

    let response = send(Some("statusCode=418"))
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let _ = shutdown.send(());
    let _ = task.await;
}
