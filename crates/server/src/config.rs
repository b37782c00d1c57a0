use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use finmock_store::PoolSettings;

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub bind_addr: SocketAddr,
    pub db_url: String,
    pub db_max_connections: u32,
    pub db_idle_timeout_ms: u64,
    pub db_acquire_timeout_ms: u64,
    pub db_query_timeout_ms: u64,
    pub db_migrate: bool,
    pub routes_path: String,
    pub base_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl MockConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("FINMOCK_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("FINMOCK_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            "FINMOCK_BIND_ADDR",
        )?;

        let db_url = require_nonempty(kv, "FINMOCK_DB_URL")?;

        let db_max_connections = parse_number(kv, "FINMOCK_DB_MAX_CONNECTIONS", 20u32)?;
        if db_max_connections == 0 {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "FINMOCK_DB_MAX_CONNECTIONS must be >= 1".to_string(),
            });
        }

        let db_idle_timeout_ms = parse_number(kv, "FINMOCK_DB_IDLE_TIMEOUT_MS", 30_000u64)?;
        let db_acquire_timeout_ms = parse_number(kv, "FINMOCK_DB_ACQUIRE_TIMEOUT_MS", 2_000u64)?;
        let db_query_timeout_ms = parse_number(kv, "FINMOCK_DB_QUERY_TIMEOUT_MS", 5_000u64)?;

        let db_migrate = match kv.get("FINMOCK_DB_MIGRATE").map(|v| v.trim()) {
            None | Some("") => false,
            Some(raw) => parse_bool(raw).ok_or_else(|| StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "FINMOCK_DB_MIGRATE must be a boolean".to_string(),
            })?,
        };

        let routes_path = kv
            .get("FINMOCK_ROUTES_PATH")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or("fixtures/routes.json")
            .to_string();

        let base_paths = kv
            .get("FINMOCK_BASE_PATHS")
            .map(|s| s.as_str())
            .unwrap_or("")
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect::<Vec<_>>();

        Ok(Self {
            bind_addr,
            db_url,
            db_max_connections,
            db_idle_timeout_ms,
            db_acquire_timeout_ms,
            db_query_timeout_ms,
            db_migrate,
            routes_path,
            base_paths,
        })
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.db_max_connections,
            idle_timeout: Duration::from_millis(self.db_idle_timeout_ms),
            acquire_timeout: Duration::from_millis(self.db_acquire_timeout_ms),
            query_timeout: Duration::from_millis(self.db_query_timeout_ms),
        }
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    parse_env_lines(&contents)
}

fn parse_env_lines(contents: &str) -> Result<HashMap<String, String>, StartupError> {
    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(value: &str) -> String {
    ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value)
        .to_string()
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    kv.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        })
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

/// Unset or blank keys take `default`.
fn parse_number<T: std::str::FromStr>(
    kv: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T, StartupError> {
    match kv.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a non-negative integer, got {:?}", key, raw),
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
