//!
//! src/config.rs
//!
//! Reads every runtime setting from the environment (and .env) into typed
//! sections, rejecting malformed values at startup
//!

use std::{net::SocketAddr, str::FromStr, time};

use url::Url;

use crate::errors::EtlError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 4;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

/// Catalog search accepts at most 100 records per page
pub const MAX_FETCH_LIMIT: u32 = 100;
pub const DEFAULT_FETCH_LIMIT: u32 = 50;

/// Wrapper over env::var that treats blank values as unset
fn env_opt(s: &str) -> Option<String> {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None
    }
}

/// Parses an env var, falling back to default when unset. A value that
/// is set but does not parse is a config error rather than a silent default
fn env_parse<T: FromStr>(s: &str, default: T) -> Result<T, EtlError> {
    match env_opt(s) {
        Some(v) => v.parse::<T>()
            .map_err(|_| EtlError::Config(format!("{s} invalid: {v}"))),
        None => Ok(default)
    }
}

fn env_bool(s: &str, default: bool) -> Result<bool, EtlError> {
    match env_opt(s).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(EtlError::Config(format!("{s} invalid: {other}")))
    }
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

/// Url::join drops the last path segment unless the base ends in '/'
fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

/// Callers decide whether a bad limit is a config or a request error
pub fn validate_limit(limit: u32) -> Result<u32, String> {
    if (1..=MAX_FETCH_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(format!("limit must be within 1..={MAX_FETCH_LIMIT}, got {limit}"))
    }
}

/// A zero duration would fire or expire immediately, so it is rejected
fn positive_secs(name: &str, secs: u64) -> Result<time::Duration, EtlError> {
    if secs == 0 {
        return Err(EtlError::Config(format!("{name} must be positive")));
    }
    Ok(time::Duration::from_secs(secs))
}

///
/// Configuration for the public catalog the pipeline extracts from
///
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub api_base: Url,        // https://api.deezer.com/
    pub default_limit: u32    // default 50
}

impl CatalogConfig {
    /// Parses the base url and limit. The https check lives in
    /// build_catalog so local mock servers can be targeted directly
    pub fn with_base(api_base: &str, default_limit: u32) -> Result<Self, EtlError> {
        let mut api_base = Url::parse(api_base)
            .map_err(|e| EtlError::Config(format!("catalog base invalid {e}")))?;
        ensure_trailing_slash(&mut api_base);
        let default_limit = validate_limit(default_limit).map_err(EtlError::Config)?;
        Ok( Self { api_base, default_limit } )
    }
}

fn build_catalog() -> Result<CatalogConfig, EtlError> {
    let api_base = env_opt("DEEZER_API_BASE")
        .unwrap_or_else(|| "https://api.deezer.com/".to_string());

    let default_limit = env_parse("ETL_DEFAULT_LIMIT", DEFAULT_FETCH_LIMIT)?;

    let catalog = CatalogConfig::with_base(&api_base, default_limit)?;
    ensure_https(&catalog.api_base).map_err(EtlError::Config)?;

    Ok(catalog)
}

///
/// Configuration for Http timeouts, pools, etc.
///
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS
        }
    }
}

///
/// Configuration for persistent storage in sqlite db or in compressed .json
///
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub db_url: String,
    pub busy_timeout: time::Duration,
    pub raw_archive_root: Option<String>,
    pub raw_archive_level: i32
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite:./data/tracks.db".to_string(),
            busy_timeout: time::Duration::from_millis(5000),
            raw_archive_root: None,
            raw_archive_level: 3
        }
    }
}

fn build_persistence() -> Result<PersistenceConfig, EtlError> {
    let defaults = PersistenceConfig::default();
    Ok( PersistenceConfig {
        db_url: env_opt("DATABASE_URL").unwrap_or(defaults.db_url),
        busy_timeout: time::Duration::from_millis(
            env_parse("DB_BUSY_TIMEOUT_MS", 5000_u64)?
        ),
        raw_archive_root: env_opt("ETL_RAW_ARCHIVE_DIR"),
        raw_archive_level: env_parse("ETL_RAW_ARCHIVE_LEVEL", defaults.raw_archive_level)?
    })
}

///
/// Configuration for a single pipeline run
///
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub genre_label: Option<String>,  // pins genre for every run when set
    pub run_timeout: time::Duration
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            genre_label: None,
            run_timeout: time::Duration::from_secs(120)
        }
    }
}

fn build_etl() -> Result<EtlConfig, EtlError> {
    Ok( EtlConfig {
        genre_label: env_opt("ETL_GENRE_LABEL"),
        run_timeout: positive_secs(
            "ETL_RUN_TIMEOUT_SECS", env_parse("ETL_RUN_TIMEOUT_SECS", 120_u64)?
        )?
    })
}

///
/// Configuration for the periodic trigger
///
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval: time::Duration,
    pub category: String,
    pub limit: u32
}

fn build_scheduler(catalog: &CatalogConfig) -> Result<SchedulerConfig, EtlError> {
    let interval = positive_secs(
        "ETL_SCHEDULE_SECS", env_parse("ETL_SCHEDULE_SECS", 60_u64)?
    )?;

    Ok( SchedulerConfig {
        enabled: env_bool("ETL_SCHEDULE_ENABLED", true)?,
        interval,
        category: env_opt("ETL_SCHEDULE_CATEGORY").unwrap_or_else(|| "pop".to_string()),
        limit: catalog.default_limit
    })
}

///
/// Configuration for the inbound http surface
///
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>
}

fn build_server() -> Result<ServerConfig, EtlError> {
    let bind_addr = env_opt("BIND_ADDR")
        .unwrap_or_else(|| "0.0.0.0:8000".to_string());
    let bind_addr = bind_addr.parse::<SocketAddr>()
        .map_err(|e| EtlError::Config(format!("BIND_ADDR invalid {e}")))?;

    let cors_origins = env_opt("CORS_ORIGINS")
        .unwrap_or_else(|| "http://localhost:5173".to_string())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    Ok( ServerConfig { bind_addr, cors_origins } )
}

///
/// Configuration for Logger
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,track_etl=debug,reqwest=warn,sqlx=warn".to_string(),
            format: LogFormat::Json,
            with_ansi: true,
            include_file_line: true,
            include_target: true
        }
    }
}

fn build_logging() -> Result<LoggingConfig, EtlError> {
    let format = match env_opt("LOG_FORMAT").as_deref() {
        None | Some("json") => LogFormat::Json,
        Some("pretty") => LogFormat::Pretty,
        Some(other) => return Err(EtlError::Config(format!("LOG_FORMAT invalid: {other}")))
    };
    Ok( LoggingConfig { format, ..LoggingConfig::default() } )
}

///
/// AppConfig which holds every section the service reads at startup
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub http: HttpConfig,
    pub persistence: PersistenceConfig,
    pub etl: EtlConfig,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, EtlError> {
    dotenvy::dotenv().ok();

    let catalog     = build_catalog()?;
    let http        = HttpConfig::default();
    let persistence = build_persistence()?;
    let etl         = build_etl()?;
    let scheduler   = build_scheduler(&catalog)?;
    let server      = build_server()?;
    let logging     = build_logging()?;

    Ok( AppConfig {
        catalog, http, persistence, etl, scheduler, server, logging
    } )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_base_gets_trailing_slash() {
        let cfg = CatalogConfig::with_base("http://127.0.0.1:1234/v1", 50).unwrap();
        assert_eq!(cfg.api_base.as_str(), "http://127.0.0.1:1234/v1/");
        assert_eq!(cfg.api_base.join("search").unwrap().path(), "/v1/search");
    }

    #[test]
    fn limit_bounds_are_enforced() {
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(101).is_err());
        assert_eq!(validate_limit(1).unwrap(), 1);
        assert_eq!(validate_limit(100).unwrap(), 100);
    }

    #[test]
    fn zero_durations_are_rejected() {
        let err = positive_secs("ETL_RUN_TIMEOUT_SECS", 0).unwrap_err();
        assert!(matches!(err, EtlError::Config(ref m) if m.contains("ETL_RUN_TIMEOUT_SECS")));
        assert!(positive_secs("ETL_SCHEDULE_SECS", 0).is_err());
        assert_eq!(
            positive_secs("ETL_RUN_TIMEOUT_SECS", 120).unwrap(),
            time::Duration::from_secs(120)
        );
    }

    #[test]
    fn zero_default_limit_is_config_error() {
        let err = CatalogConfig::with_base("http://127.0.0.1:1234/", 0).unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn https_is_required_for_catalog() {
        let url = Url::parse("http://api.deezer.com/").unwrap();
        assert!(ensure_https(&url).is_err());
        let url = Url::parse("https://api.deezer.com/").unwrap();
        assert!(ensure_https(&url).is_ok());
    }
}
