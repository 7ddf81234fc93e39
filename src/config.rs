// Explicit configuration, built once at start-up and handed to each sink.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";
pub const SHEETS_ID_ENV_VAR: &str = "GOOGLE_SHEETS_ID";
pub const SERVICE_ACCOUNT_FILE_ENV_VAR: &str = "GOOGLE_SERVICE_ACCOUNT_FILE";
pub const SHEETS_API_BASE_ENV_VAR: &str = "SHEETS_API_BASE";
pub const PDF_DIR_ENV_VAR: &str = "PIPELINE_PDF_DIR";
pub const BIND_ADDR_ENV_VAR: &str = "PIPELINE_BIND_ADDR";
pub const HTTP_TIMEOUT_ENV_VAR: &str = "PIPELINE_HTTP_TIMEOUT_SECS";

pub const DEFAULT_DATABASE_URL: &str = "sqlite:///./pipeline.db";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_PDF_DIR: &str = "/tmp";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Spreadsheet key. Only needed by the sheet operation.
    pub google_sheets_id: Option<String>,
    /// Service-account JSON. Only needed by the sheet operation.
    pub google_service_account_file: Option<PathBuf>,
    pub sheets_api_base: String,
    pub pdf_output_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub http_timeout: Duration,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env is normal outside development
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get(DATABASE_URL_ENV_VAR).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        // Reject unusable URLs at start-up rather than on the first request
        sqlite_path(&database_url)?;

        let bind_raw = get(BIND_ADDR_ENV_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: BIND_ADDR_ENV_VAR,
                message: format!("'{}': {}", bind_raw, e),
            })?;

        let http_timeout = match get(HTTP_TIMEOUT_ENV_VAR) {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                    key: HTTP_TIMEOUT_ENV_VAR,
                    message: format!("'{}': {}", raw, e),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Config {
            database_url,
            google_sheets_id: get(SHEETS_ID_ENV_VAR),
            google_service_account_file: get(SERVICE_ACCOUNT_FILE_ENV_VAR).map(PathBuf::from),
            sheets_api_base: get(SHEETS_API_BASE_ENV_VAR)
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
            pdf_output_dir: get(PDF_DIR_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PDF_DIR)),
            bind_addr,
            http_timeout,
        })
    }

    /// Resolved SQLite location for `database_url`.
    pub fn database_path(&self) -> Result<SqlitePath, ConfigError> {
        sqlite_path(&self.database_url)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            google_sheets_id: None,
            google_service_account_file: None,
            sheets_api_base: DEFAULT_SHEETS_API_BASE.to_string(),
            pdf_output_dir: PathBuf::from(DEFAULT_PDF_DIR),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlitePath {
    Memory,
    File(PathBuf),
}

/// Accepts `sqlite:///rel`, `sqlite:////abs`, `sqlite://`, `sqlite::memory:`
/// or a bare path.
fn sqlite_path(url: &str) -> Result<SqlitePath, ConfigError> {
    if url == "sqlite://" || url == "sqlite::memory:" || url == ":memory:" {
        return Ok(SqlitePath::Memory);
    }
    if let Some(rest) = url.strip_prefix("sqlite:///") {
        if rest.is_empty() || rest == ":memory:" {
            return Ok(SqlitePath::Memory);
        }
        return Ok(SqlitePath::File(PathBuf::from(rest)));
    }
    if url.contains("://") {
        return Err(ConfigError::UnsupportedDatabaseUrl(url.to_string()));
    }
    Ok(SqlitePath::File(PathBuf::from(url)))
}
