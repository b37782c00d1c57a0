use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use finmock_core::{FixtureGateway, MockResponse, Outcome, RequestContext};
use finmock_store::PgFixtureStore;
use serde::Serialize;
use tracing::Instrument;
use ulid::Ulid;

use crate::config::{MockConfig, StartupError};
use crate::routes::RouteCatalog;

mod body;

use self::body::{parse_body, parse_query};

const POWERED_BY: &str = "finmock";
const UNMATCHED_ROUTE: &str = "unmatched";

#[derive(Clone)]
pub struct AppState {
    catalog: Arc<RouteCatalog>,
    gateway: Arc<dyn FixtureGateway>,
}

pub async fn router(config: MockConfig) -> Result<Router, StartupError> {
    let catalog = RouteCatalog::load(&config.routes_path, &config.base_paths)?;

    let store = PgFixtureStore::connect(&config.db_url, config.pool_settings())
        .await
        .map_err(|err| StartupError {
            code: "ERR_DB_UNAVAILABLE",
            message: format!("failed to initialize fixture store: {}", err),
        })?;

    if config.db_migrate {
        store.migrate().await.map_err(|err| StartupError {
            code: "ERR_DB_MIGRATE",
            message: format!("failed to migrate fixture store: {}", err),
        })?;
    }

    Ok(router_with_gateway(catalog, Arc::new(store)))
}

pub fn router_with_gateway(catalog: RouteCatalog, gateway: Arc<dyn FixtureGateway>) -> Router {
    if catalog.is_empty() {
        tracing::warn!("route catalog is empty; every request will answer 40401");
    } else {
        tracing::info!(routes = catalog.len(), "route catalog loaded");
    }
    for path in catalog.paths() {
        tracing::debug!(route = %path, "handling route");
    }

    let state = AppState {
        catalog: Arc::new(catalog),
        gateway,
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .fallback(mock)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();

    let fixtures_ready = tokio::time::timeout(Duration::from_secs(2), state.gateway.ready())
        .await
        .is_ok_and(|res| res.is_ok());
    checks.insert("fixtures", fixtures_ready);

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn mock(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = extract_request_id(&headers);
    let path = uri.path().to_string();

    let span = tracing::info_span!(
        "mock.request",
        request_id = %request_id,
        method = %method,
        path = %path,
        route = tracing::field::Empty,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    async move {
        let started = Instant::now();
        let (route, resp) = handle_mock(&state, method.clone(), &uri, headers, &body).await;

        let status = resp.status.as_u16();
        let elapsed = started.elapsed();
        tracing::Span::current().record("route", route.as_str());
        tracing::Span::current().record("status", status);
        tracing::Span::current().record("latency_ms", elapsed.as_millis() as u64);
        crate::metrics::observe_http_request(&route, method.as_str(), status, elapsed);

        if status < 400 {
            tracing::info!("mock response sent");
        } else {
            tracing::info!(rsp_code = %resp.body["rsp_code"], "mock error response sent");
        }

        mock_response(resp, &request_id)
    }
    .instrument(span)
    .await
}

async fn handle_mock(
    state: &AppState,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: &Bytes,
) -> (String, MockResponse) {
    let path = uri.path();

    let Some(matched) = state.catalog.match_route(&method, path) else {
        return (
            UNMATCHED_ROUTE.to_string(),
            MockResponse::assemble(Outcome::RouteNotFound(path.to_string()), StatusCode::OK),
        );
    };
    let route = matched.route;

    if !method_is_read(&method) && !body.is_empty() && !headers.contains_key(header::CONTENT_TYPE)
    {
        tracing::warn!("missing content-type header");
    }

    let mut ctx = RequestContext::new(method, path, route.template.clone());
    ctx.query = parse_query(uri.query());
    ctx.body = parse_body(&headers, body);
    ctx.headers = headers;

    let errors = route.validate(&ctx, &matched.path_params);
    if !errors.is_empty() {
        return (
            route.template.clone(),
            MockResponse::assemble(Outcome::ValidationFailed(errors), route.default_status()),
        );
    }

    let success_status = route.response_status(ctx.header("prefer"));
    if success_status != route.default_status() {
        tracing::debug!(status = success_status.as_u16(), "using preferred response status");
    }

    let resolution = finmock_core::resolve(&ctx, success_status, state.gateway.as_ref()).await;
    crate::metrics::observe_fixture_lookup(resolution.variant.as_str(), resolution.outcome);

    (route.template.clone(), resolution.response)
}

fn method_is_read(method: &Method) -> bool {
    finmock_core::context::is_read_method(method)
}

fn mock_response(resp: MockResponse, request_id: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-powered-by"),
        HeaderValue::from_static(POWERED_BY),
    );
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static("x-request-id"), value);
    }

    (resp.status, headers, Json(resp.body)).into_response()
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

/// First value wins for repeated keys.
fn first_values(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    let mut out = HashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        out.entry(key).or_insert(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_sanitized_or_generated() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req 01/<x>"));
        assert_eq!(extract_request_id(&headers), "req01x");

        headers.insert("x-request-id", HeaderValue::from_static("  "));
        let generated = extract_request_id(&headers);
        assert!(generated.parse::<Ulid>().is_ok());
    }

    #[test]
    fn repeated_keys_keep_first_value() {
        let out = first_values(vec![
            ("a".to_string(), "1".to_string()),
            ("a".to_string(), "2".to_string()),
            ("b".to_string(), "3".to_string()),
        ]);
        assert_eq!(out.get("a").map(String::as_str), Some("1"));
        assert_eq!(out.get("b").map(String::as_str), Some("3"));
    }

    #[test]
    fn mock_response_sets_powered_by_and_request_id() {
        let resp = mock_response(
            MockResponse::assemble(Outcome::NotFound, StatusCode::OK),
            "req-1",
        );
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get("x-powered-by").and_then(|v| v.to_str().ok()),
            Some(POWERED_BY)
        );
        assert_eq!(
            resp.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
            Some("req-1")
        );
    }
}
