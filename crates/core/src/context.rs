use std::collections::HashMap;

use http::{HeaderMap, Method, header};

/// One inbound request as seen by the resolution pipeline.
///
/// Built by the HTTP layer after the path matcher picked a route; read-only
/// from here on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub query: HashMap<String, String>,
    pub body: serde_json::Map<String, serde_json::Value>,
    pub headers: HeaderMap,
    pub path_template: String,
    pub path: String,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self {
            method,
            query: HashMap::new(),
            body: serde_json::Map::new(),
            headers: HeaderMap::new(),
            path_template: path_template.into(),
            path: path.into(),
        }
    }

    pub fn is_read(&self) -> bool {
        is_read_method(&self.method)
    }

    /// Trimmed, non-empty header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Trimmed, non-empty cookie value; every `Cookie` header is searched.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
    }

    /// Reads `name` from the query for read methods and from the body otherwise.
    pub fn field(&self, name: &str) -> Option<String> {
        if self.is_read() {
            self.query
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        } else {
            self.body.get(name).and_then(body_value_as_string)
        }
    }
}

pub fn is_read_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

fn body_value_as_string(value: &serde_json::Value) -> Option<String> {
    let raw = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!raw.is_empty()).then_some(raw)
}
