use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::{HeaderMap, header};
use serde_json::{Map, Value};

use super::first_values;

pub(super) fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    let Some(raw) = raw.filter(|q| !q.is_empty()) else {
        return HashMap::new();
    };

    match serde_urlencoded::from_str::<Vec<(String, String)>>(raw) {
        Ok(pairs) => first_values(pairs),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unparseable query string");
            HashMap::new()
        }
    }
}

/// Body fields for write methods: JSON objects and urlencoded forms.
pub(super) fn parse_body(headers: &HeaderMap, body: &Bytes) -> Map<String, Value> {
    if body.is_empty() {
        return Map::new();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        return match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
            Ok(pairs) => first_values(pairs)
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unparseable form body");
                Map::new()
            }
        };
    }

    if content_type.is_empty() || content_type.contains("json") {
        return match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => Map::new(),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unparseable JSON body");
                Map::new()
            }
        };
    }

    Map::new()
}
