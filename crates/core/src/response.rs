use http::StatusCode;
use serde::{Deserialize, Serialize};

pub const RSP_INVALID_PARAMS: &str = "40001";
pub const RSP_PATH_NOT_FOUND: &str = "40401";
pub const RSP_FIXTURE_NOT_FOUND: &str = "40402";
pub const RSP_INTERNAL: &str = "50001";

const FIXTURE_NOT_FOUND_MSG: &str = "no fixture found for the requested key";
const INTERNAL_MSG: &str = "internal server error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub rsp_code: String,
    pub rsp_msg: String,
}

/// Terminal state of one mock request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Found(serde_json::Value),
    NotFound,
    DownstreamFailure,
    ValidationFailed(Vec<String>),
    RouteNotFound(String),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Found(_) => "found",
            Outcome::NotFound => "not_found",
            Outcome::DownstreamFailure => "downstream_failure",
            Outcome::ValidationFailed(_) => "validation_failed",
            Outcome::RouteNotFound(_) => "route_not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl MockResponse {
    /// `success_status` is the status the matched route declares for a hit.
    pub fn assemble(outcome: Outcome, success_status: StatusCode) -> Self {
        match outcome {
            Outcome::Found(document) => Self {
                status: success_status,
                body: document,
            },
            Outcome::NotFound => error(
                StatusCode::NOT_FOUND,
                RSP_FIXTURE_NOT_FOUND,
                FIXTURE_NOT_FOUND_MSG,
            ),
            Outcome::DownstreamFailure => {
                error(StatusCode::INTERNAL_SERVER_ERROR, RSP_INTERNAL, INTERNAL_MSG)
            }
            Outcome::ValidationFailed(errors) => {
                error(StatusCode::BAD_REQUEST, RSP_INVALID_PARAMS, errors.join(", "))
            }
            Outcome::RouteNotFound(path) => error(
                StatusCode::NOT_FOUND,
                RSP_PATH_NOT_FOUND,
                format!("path not found: {}", path),
            ),
        }
    }
}

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> MockResponse {
    let body = ErrorBody {
        rsp_code: code.to_string(),
        rsp_msg: message.into(),
    };
    MockResponse {
        status,
        body: serde_json::to_value(body).unwrap_or_else(|_| serde_json::json!({})),
    }
}
