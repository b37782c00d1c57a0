use std::time::Instant;

use http::StatusCode;
use tracing::Instrument;

use crate::context::RequestContext;
use crate::gateway::FixtureGateway;
use crate::key::{QueryVariant, ResolvedKey};
use crate::response::{MockResponse, Outcome};
use crate::shape::{PaginationRequest, shape};

/// What one pipeline run produced, plus the labels callers report on.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub response: MockResponse,
    pub variant: QueryVariant,
    pub outcome: &'static str,
}

/// Resolves the fixture for `ctx`, shapes it and maps the result to a response.
///
/// Never fails: lookup and shaping errors are logged and surface as a 500
/// payload. The gateway lookup is the only await point.
pub async fn resolve_and_shape(
    ctx: &RequestContext,
    success_status: StatusCode,
    gateway: &dyn FixtureGateway,
) -> MockResponse {
    resolve(ctx, success_status, gateway).await.response
}

pub async fn resolve(
    ctx: &RequestContext,
    success_status: StatusCode,
    gateway: &dyn FixtureGateway,
) -> Resolution {
    let key = ResolvedKey::resolve(ctx);
    let variant = QueryVariant::select(&key);
    let params = key.lookup_params();

    let span = tracing::info_span!(
        "fixture.resolve",
        api_id = %key.api_id.as_deref().unwrap_or(""),
        org_code = %key.org_code,
        variant = variant.as_str(),
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    async move {
        let started = Instant::now();
        let outcome = lookup_and_shape(ctx, variant, &params, gateway).await;
        let label = outcome.as_str();

        tracing::Span::current().record("latency_ms", started.elapsed().as_millis() as u64);
        tracing::Span::current().record("outcome", label);

        Resolution {
            response: MockResponse::assemble(outcome, success_status),
            variant,
            outcome: label,
        }
    }
    .instrument(span)
    .await
}

async fn lookup_and_shape(
    ctx: &RequestContext,
    variant: QueryVariant,
    params: &[String],
    gateway: &dyn FixtureGateway,
) -> Outcome {
    let document = match gateway.lookup(variant, params).await {
        Ok(Some(document)) => document,
        Ok(None) => return Outcome::NotFound,
        Err(err) => {
            tracing::error!(error = %err, "fixture lookup failed");
            return Outcome::DownstreamFailure;
        }
    };

    match shape(document, &PaginationRequest::from_context(ctx)) {
        Ok(document) => Outcome::Found(document),
        Err(err) => {
            tracing::error!(error = %err, "fixture shaping failed");
            Outcome::DownstreamFailure
        }
    }
}
