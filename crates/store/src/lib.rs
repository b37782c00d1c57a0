use std::time::Duration;

use async_trait::async_trait;
use finmock_core::{FixtureGateway, GatewayError, QueryVariant};
use sqlx::Row;
use sqlx::postgres::PgPoolOptions;

const LOOKUP_THREE_FIELD: &str = "SELECT res_data FROM tb_test_data WHERE api_id = $1 AND own_org_cd = $2 AND org_cd = $3 ORDER BY id LIMIT 1";
const LOOKUP_FOUR_FIELD: &str = "SELECT res_data FROM tb_test_data WHERE api_id = $1 AND own_org_cd = $2 AND org_cd = $3 AND ast_id = $4 ORDER BY id LIMIT 1";

pub fn lookup_sql(variant: QueryVariant) -> &'static str {
    match variant {
        QueryVariant::ThreeField => LOOKUP_THREE_FIELD,
        QueryVariant::FourField => LOOKUP_FOUR_FIELD,
    }
}

#[derive(Debug)]
pub enum StoreError {
    Timeout,
    ParamCount { expected: usize, got: usize },
    Sqlx(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Timeout => write!(f, "fixture store operation timed out"),
            StoreError::ParamCount { expected, got } => {
                write!(f, "lookup expects {} params, got {}", expected, got)
            }
            StoreError::Sqlx(err) => write!(f, "fixture store sql error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        StoreError::Sqlx(value)
    }
}

impl From<StoreError> for GatewayError {
    fn from(value: StoreError) -> Self {
        let code = match &value {
            StoreError::Timeout => "ERR_DB_TIMEOUT",
            StoreError::ParamCount { .. } => "ERR_PARAM_COUNT",
            StoreError::Sqlx(sqlx::Error::PoolTimedOut) => "ERR_DB_TIMEOUT",
            StoreError::Sqlx(sqlx::Error::PoolClosed) => "ERR_DB_UNAVAILABLE",
            StoreError::Sqlx(_) => "ERR_DB_QUERY",
        };
        GatewayError::new(code, value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            idle_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// One row of `tb_test_data`.
pub struct FixtureRecord<'a> {
    pub api_id: &'a str,
    pub own_org_cd: &'a str,
    pub org_cd: &'a str,
    pub ast_id: Option<&'a str>,
    pub res_data: &'a serde_json::Value,
}

/// Postgres-backed fixture table.
///
/// Each lookup checks one connection out of the pool and hands it back when
/// the connection guard drops, whatever the outcome.
#[derive(Clone)]
pub struct PgFixtureStore {
    pool: sqlx::PgPool,
    query_timeout: Duration,
}

impl PgFixtureStore {
    pub async fn connect(db_url: &str, settings: PoolSettings) -> Result<Self, StoreError> {
        let pool = tokio::time::timeout(
            settings.acquire_timeout.max(Duration::from_secs(2)),
            PgPoolOptions::new()
                .max_connections(settings.max_connections.max(1))
                .idle_timeout(Some(settings.idle_timeout))
                .acquire_timeout(settings.acquire_timeout)
                .connect(db_url),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(Self::from_pool(pool, settings.query_timeout))
    }

    pub fn from_pool(pool: sqlx::PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tokio::time::timeout(Duration::from_secs(10), migrate(&self.pool))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }

    pub async fn fetch(
        &self,
        variant: QueryVariant,
        params: &[String],
    ) -> Result<Option<serde_json::Value>, StoreError> {
        if params.len() != variant.param_count() {
            return Err(StoreError::ParamCount {
                expected: variant.param_count(),
                got: params.len(),
            });
        }

        let mut conn = self.pool.acquire().await?;

        let mut query = sqlx::query(lookup_sql(variant));
        for value in params {
            query = query.bind(value.as_str());
        }

        let row = tokio::time::timeout(self.query_timeout, query.fetch_optional(&mut *conn))
            .await
            .map_err(|_| StoreError::Timeout)??;

        let Some(row) = row else {
            return Ok(None);
        };
        let document: serde_json::Value = row.try_get("res_data")?;
        Ok(Some(document))
    }

    pub async fn insert_fixture(&self, record: FixtureRecord<'_>) -> Result<(), StoreError> {
        tokio::time::timeout(
            self.query_timeout,
            sqlx::query(
                "INSERT INTO tb_test_data (api_id, own_org_cd, org_cd, ast_id, res_data) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(record.api_id)
            .bind(record.own_org_cd)
            .bind(record.org_cd)
            .bind(record.ast_id)
            .bind(record.res_data)
            .execute(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        tokio::time::timeout(
            self.query_timeout,
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl FixtureGateway for PgFixtureStore {
    async fn lookup(
        &self,
        variant: QueryVariant,
        params: &[String],
    ) -> Result<Option<serde_json::Value>, GatewayError> {
        self.fetch(variant, params).await.map_err(GatewayError::from)
    }

    async fn ready(&self) -> Result<(), GatewayError> {
        self.ping().await.map_err(GatewayError::from)
    }
}

pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_sql_binds_match_variant_arity() {
        for variant in [QueryVariant::ThreeField, QueryVariant::FourField] {
            let sql = lookup_sql(variant);
            let binds = (1..=4).filter(|n| sql.contains(&format!("${}", n))).count();
            assert_eq!(binds, variant.param_count());
        }
        assert!(lookup_sql(QueryVariant::FourField).contains("ast_id = $4"));
        assert!(!lookup_sql(QueryVariant::ThreeField).contains("ast_id"));
    }

    #[test]
    fn store_errors_map_to_gateway_codes() {
        let err = GatewayError::from(StoreError::Timeout);
        assert_eq!(err.code, "ERR_DB_TIMEOUT");

        let err = GatewayError::from(StoreError::Sqlx(sqlx::Error::PoolClosed));
        assert_eq!(err.code, "ERR_DB_UNAVAILABLE");

        let err = GatewayError::from(StoreError::ParamCount {
            expected: 4,
            got: 3,
        });
        assert_eq!(err.code, "ERR_PARAM_COUNT");
        assert_eq!(err.message, "lookup expects 4 params, got 3");
    }
}
