use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static FIXTURE_LOOKUPS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("finmock_http_requests_total", "Mock HTTP request count."),
                &["route", "method", "status"],
            )
            .expect("create finmock_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "finmock_http_request_duration_seconds",
                    "Mock HTTP request duration in seconds.",
                )
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create finmock_http_request_duration_seconds"),
        )
    })
}

fn fixture_lookups_total() -> &'static IntCounterVec {
    FIXTURE_LOOKUPS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "finmock_fixture_lookups_total",
                    "Fixture lookups by query variant and outcome.",
                ),
                &["variant", "outcome"],
            )
            .expect("create finmock_fixture_lookups_total"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_fixture_lookup(variant: &str, outcome: &str) {
    fixture_lookups_total()
        .with_label_values(&[variant, outcome])
        .inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = http_requests_total();
    let _ = fixture_lookups_total();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_metrics_include_observed_series() {
        observe_http_request("/v1/bank/accounts", "GET", 200, Duration::from_millis(3));
        observe_fixture_lookup("three_field", "found");

        let (body, content_type) = render().expect("render should succeed");
        let text = String::from_utf8(body).expect("metrics are utf-8");
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("finmock_http_requests_total"));
        assert!(text.contains("finmock_fixture_lookups_total"));
    }
}
