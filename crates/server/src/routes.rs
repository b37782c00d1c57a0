use std::collections::{BTreeSet, HashMap};

use axum::http::{Method, StatusCode};
use finmock_core::RequestContext;
use serde::Deserialize;

use crate::config::StartupError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteFile {
    routes: Vec<RouteSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteSpec {
    method: String,
    uri: String,
    #[serde(default = "default_status")]
    status: DeclaredStatus,
    #[serde(default)]
    parameters: Vec<ParamSpec>,
}

/// A single status, or every status the route can answer with (first is the
/// default).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeclaredStatus {
    One(u16),
    Many(Vec<u16>),
}

impl DeclaredStatus {
    fn into_codes(self) -> Vec<u16> {
        match self {
            DeclaredStatus::One(code) => vec![code],
            DeclaredStatus::Many(codes) => codes,
        }
    }
}

fn default_status() -> DeclaredStatus {
    DeclaredStatus::One(200)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSpec {
    #[serde(rename = "in")]
    pub location: ParamLocation,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Header,
    Body,
    Path,
    Cookie,
}

impl ParamLocation {
    fn as_str(self) -> &'static str {
        match self {
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Body => "body",
            ParamLocation::Path => "path",
            ParamLocation::Cookie => "cookie",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub template: String,
    pub statuses: Vec<StatusCode>,
    pub parameters: Vec<ParamSpec>,
    segments: Vec<Segment>,
}

#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub path_params: HashMap<String, String>,
}

impl Route {
    pub fn default_status(&self) -> StatusCode {
        self.statuses.first().copied().unwrap_or(StatusCode::OK)
    }

    /// Status for a found fixture: `Prefer: statusCode=<n>` when the route
    /// declares `n`, the default otherwise.
    pub fn response_status(&self, prefer: Option<&str>) -> StatusCode {
        prefer
            .and_then(preferred_status)
            .and_then(|code| self.statuses.iter().copied().find(|s| s.as_u16() == code))
            .unwrap_or_else(|| self.default_status())
    }

    /// Required-parameter check; one message per missing parameter.
    pub fn validate(&self, ctx: &RequestContext, path_params: &HashMap<String, String>) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|param| !is_present(param, ctx, path_params))
            .map(|param| {
                format!(
                    "missing required {} parameter '{}'",
                    param.location.as_str(),
                    param.name
                )
            })
            .collect()
    }

    fn matches(&self, method: &Method, segments: &[&str]) -> Option<HashMap<String, String>> {
        if self.method != *method || self.segments.len() != segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (expected, actual) in self.segments.iter().zip(segments) {
            match expected {
                Segment::Literal(lit) if lit == actual => {}
                Segment::Param(name) if !actual.is_empty() => {
                    params.insert(name.clone(), (*actual).to_string());
                }
                _ => return None,
            }
        }
        Some(params)
    }
}

fn is_present(
    param: &ParamSpec,
    ctx: &RequestContext,
    path_params: &HashMap<String, String>,
) -> bool {
    let name = param.name.as_str();
    match param.location {
        ParamLocation::Query => ctx.query.get(name).is_some_and(|v| !v.trim().is_empty()),
        ParamLocation::Header => ctx.header(name).is_some(),
        ParamLocation::Body => match ctx.body.get(name) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        },
        ParamLocation::Path => path_params.get(name).is_some_and(|v| !v.is_empty()),
        ParamLocation::Cookie => ctx.cookie(name).is_some(),
    }
}

/// `statusCode` preference from a `Prefer` header such as
/// `statusCode=201, example=created`.
fn preferred_status(prefer: &str) -> Option<u16> {
    prefer
        .split([',', ';'])
        .filter_map(|token| token.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("statuscode"))
        .and_then(|(_, value)| value.trim().trim_matches('"').parse::<u16>().ok())
}

/// Declared routes the mock answers, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RouteCatalog {
    routes: Vec<Route>,
}

impl RouteCatalog {
    pub fn load(path: &str, base_paths: &[String]) -> Result<Self, StartupError> {
        let raw = std::fs::read_to_string(path).map_err(|_| StartupError {
            code: "ERR_ROUTES_FILE_READ",
            message: format!("failed to read routes file at {}", path),
        })?;
        Self::from_json(&raw, base_paths)
    }

    pub fn from_json(raw: &str, base_paths: &[String]) -> Result<Self, StartupError> {
        let file: RouteFile = serde_json::from_str(raw).map_err(|err| StartupError {
            code: "ERR_ROUTES_FILE_PARSE",
            message: format!("invalid routes file: {}", err),
        })?;

        let base_paths = normalize_base_paths(base_paths);
        let mut routes = Vec::with_capacity(file.routes.len() * base_paths.len());

        for spec in file.routes {
            let method = Method::from_bytes(spec.method.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| StartupError {
                    code: "ERR_ROUTES_FILE_PARSE",
                    message: format!("invalid method {:?} for {}", spec.method, spec.uri),
                })?;
            let codes = spec.status.into_codes();
            if codes.is_empty() {
                return Err(StartupError {
                    code: "ERR_ROUTES_FILE_PARSE",
                    message: format!("no status declared for {}", spec.uri),
                });
            }
            let statuses = codes
                .into_iter()
                .map(|code| {
                    StatusCode::from_u16(code).map_err(|_| StartupError {
                        code: "ERR_ROUTES_FILE_PARSE",
                        message: format!("invalid status {} for {}", code, spec.uri),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let uri = format!("/{}", spec.uri.trim().trim_start_matches('/'));
            for base in &base_paths {
                let template = format!("{}{}", base, uri);
                routes.push(Route {
                    method: method.clone(),
                    segments: parse_segments(&template),
                    template,
                    statuses: statuses.clone(),
                    parameters: spec.parameters.clone(),
                });
            }
        }

        Ok(Self { routes })
    }

    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let trimmed = trim_trailing_slash(path);
        let segments = trimmed.split('/').collect::<Vec<_>>();
        self.routes.iter().find_map(|route| {
            route
                .matches(method, &segments)
                .map(|path_params| RouteMatch { route, path_params })
        })
    }

    /// `"METHOD template"` for every route.
    pub fn paths(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|route| format!("{} {}", route.method, route.template))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn normalize_base_paths(base_paths: &[String]) -> Vec<String> {
    let unique = base_paths
        .iter()
        .map(|p| p.trim().trim_end_matches('/').to_string())
        .filter(|p| !p.is_empty())
        .map(|p| if p.starts_with('/') { p } else { format!("/{}", p) })
        .collect::<BTreeSet<_>>();

    if unique.is_empty() {
        vec![String::new()]
    } else {
        unique.into_iter().collect()
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

fn parse_segments(template: &str) -> Vec<Segment> {
    trim_trailing_slash(template)
        .split('/')
        .map(|seg| {
            match seg
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
            {
                Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                _ => Segment::Literal(seg.to_string()),
            }
        })
        .collect()
}
