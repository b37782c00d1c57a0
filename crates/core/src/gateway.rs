use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::key::QueryVariant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub code: &'static str,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

/// Source of fixture documents.
///
/// `Ok(None)` means no row matched the key; `Err` is reserved for transport
/// or execution failures. Implementations own their connection handling and
/// must release whatever they acquire before returning.
#[async_trait]
pub trait FixtureGateway: Send + Sync {
    async fn lookup(
        &self,
        variant: QueryVariant,
        params: &[String],
    ) -> Result<Option<serde_json::Value>, GatewayError>;

    async fn ready(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// In-process fixture table keyed by the exact lookup parameter list.
#[derive(Clone, Default)]
pub struct MemoryFixtures {
    rows: Arc<RwLock<HashMap<Vec<String>, serde_json::Value>>>,
}

impl MemoryFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&self, params: I, document: serde_json::Value)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = params.into_iter().map(Into::into).collect::<Vec<_>>();
        let mut rows = match self.rows.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rows.insert(key, document);
    }
}

#[async_trait]
impl FixtureGateway for MemoryFixtures {
    async fn lookup(
        &self,
        variant: QueryVariant,
        params: &[String],
    ) -> Result<Option<serde_json::Value>, GatewayError> {
        if params.len() != variant.param_count() {
            return Err(GatewayError::new(
                "ERR_PARAM_COUNT",
                format!(
                    "{} lookup expects {} params, got {}",
                    variant.as_str(),
                    variant.param_count(),
                    params.len()
                ),
            ));
        }

        let rows = match self.rows.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(rows.get(params).cloned())
    }
}
