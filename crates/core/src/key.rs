use std::sync::OnceLock;

use regex::Regex;

use crate::context::RequestContext;

pub const ORG_CODE_SENTINEL: &str = "0000000000";

/// Fields consulted, in order, before falling back to the path.
const ASSET_ID_FIELDS: [&str; 3] = ["insu_num", "sub_key", "account_num"];

/// Index into `path.split('/')` holding the asset id for placeholder routes.
const PATH_ASSET_SEGMENT: usize = 4;

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"/\{[A-Za-z0-9_-]+\}").expect("placeholder pattern must compile")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub api_id: Option<String>,
    pub owning_org_code: String,
    pub org_code: String,
    pub asset_id: Option<String>,
}

impl ResolvedKey {
    pub fn resolve(ctx: &RequestContext) -> Self {
        let api_id = ctx.header("x-api-id").map(|v| v.to_string());
        if api_id.is_none() {
            tracing::warn!(path = %ctx.path, "request carries no x-api-id header; using empty api id");
        }

        let owning_org_code = ctx
            .header("x-own-org-cd")
            .map(|v| v.to_string())
            .unwrap_or_default();

        let org_code = ctx
            .field("org_code")
            .unwrap_or_else(|| ORG_CODE_SENTINEL.to_string());

        Self {
            api_id,
            owning_org_code,
            org_code,
            asset_id: resolve_asset_id(ctx),
        }
    }

    /// Gateway bind order: api id, owning org, org, then asset id if any.
    pub fn lookup_params(&self) -> Vec<String> {
        let mut params = Vec::with_capacity(4);
        params.push(self.api_id.clone().unwrap_or_default());
        params.push(self.owning_org_code.clone());
        params.push(self.org_code.clone());
        if let Some(asset_id) = &self.asset_id {
            params.push(asset_id.clone());
        }
        params
    }
}

fn resolve_asset_id(ctx: &RequestContext) -> Option<String> {
    for name in ASSET_ID_FIELDS {
        if let Some(value) = ctx.field(name) {
            return Some(value);
        }
    }

    if ctx.is_read() && placeholder().is_match(&ctx.path_template) {
        return path_segment(&ctx.path, PATH_ASSET_SEGMENT);
    }

    None
}

fn path_segment(path: &str, idx: usize) -> Option<String> {
    path.split('/')
        .nth(idx)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryVariant {
    ThreeField,
    FourField,
}

impl QueryVariant {
    pub fn select(key: &ResolvedKey) -> Self {
        if key.asset_id.is_some() {
            QueryVariant::FourField
        } else {
            QueryVariant::ThreeField
        }
    }

    pub fn param_count(self) -> usize {
        match self {
            QueryVariant::ThreeField => 3,
            QueryVariant::FourField => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryVariant::ThreeField => "three_field",
            QueryVariant::FourField => "four_field",
        }
    }
}
