use std::time;
use url::Url;

use crate::ResolverError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 16;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 3;
pub const RETRY_BASE_BACKOFF: u64 = 500;

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

/// Configuration for the metadata/search proxy all lookups go through
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub base_url: Url,
}

fn build_proxy() -> Result<ProxyConfig, ResolverError> {
    let base_url = std::env::var("PROXY_BASE_URL")
        .unwrap_or_else(|_| "https://spotify-proxy-1.onrender.com/".to_string());

    let mut base_url = Url::parse(&base_url)
        .map_err(|e| ResolverError::Config(
            format!("PROXY_BASE_URL invalid {e}")
        ))?;

    ensure_https(&base_url).map_err(ResolverError::Config)?;
    ensure_trailing_slash(&mut base_url);

    Ok( ProxyConfig { base_url } )
}

/// Configuration for the public iTunes Search API used when the proxy
/// cannot serve an Apple Music search
#[derive(Debug, Clone)]
pub struct ItunesConfig {
    pub base_url: Url,
    pub entity: String,
}

fn build_itunes() -> Result<ItunesConfig, ResolverError> {
    let base_url = std::env::var("ITUNES_BASE_URL")
        .unwrap_or_else(|_| "https://itunes.apple.com/".to_string());

    let mut base_url = Url::parse(&base_url)
        .map_err(|e| ResolverError::Config(
            format!("ITUNES_BASE_URL invalid {e}")
        ))?;

    ensure_https(&base_url).map_err(ResolverError::Config)?;
    ensure_host(&base_url, "itunes.apple.com").map_err(ResolverError::Config)?;
    ensure_trailing_slash(&mut base_url);

    let entity = std::env::var("ITUNES_ENTITY")
        .unwrap_or_else(|_| "song".to_string());

    Ok( ItunesConfig { base_url, entity } )
}

///
/// Configuration for match acceptance and the strategy fallback loop.
/// Thresholds and region order were hand-tuned historically, so both stay
/// externally tunable instead of hard-coded.
///
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub threshold: f64,
    pub regions: Vec<String>,
    pub attempt_delay: time::Duration,
    pub limit: u32,
}

fn build_search() -> SearchConfig {
    let env_to_uint = |s: &str, default: u32| -> u32 {
        match std::env::var(s) {
            Ok(s) => {
                match s.parse::<u32>() {
                    Ok(value) => value,
                    _ => default
                }
            },
            Err(_) => {
                default
            }
        }
    };

    let env_to_float = |s: &str, default: f64| -> f64 {
        match std::env::var(s) {
            Ok(s) => {
                match s.parse::<f64>() {
                    Ok(value) => value,
                    _ => default
                }
            },
            Err(_) => {
                default
            }
        }
    };

    let threshold = env_to_float("MATCH_THRESHOLD", 0.75);

    let regions = std::env::var("SEARCH_REGIONS")
        .unwrap_or_else(|_| "jp".to_string())
        .split(',')
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect();

    let attempt_delay = time::Duration::from_millis(
        env_to_uint("SEARCH_ATTEMPT_DELAY_MS", 500) as u64
    );
    let limit = env_to_uint("SEARCH_LIMIT", 5);

    SearchConfig { threshold, regions, attempt_delay, limit }
}

///
/// Configuration for Http timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_backoff: time::Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            retry: RetryConfig::default()
        }
    }
}

///
/// Configuration for Logger
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,track_resolver=debug,reqwest=warn".to_string(),
            format: LogFormat::Json,
            with_ansi: false,
            include_file_line: true,
            include_target: true,
        }
    }
}

fn build_logging() -> LoggingConfig {
    let format = match std::env::var("LOG_FORMAT").ok().as_deref() {
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::Json,
    };
    LoggingConfig { format, ..LoggingConfig::default() }
}

///
/// AppConfig which holds everything the client and resolver need
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub proxy: ProxyConfig,
    pub itunes: ItunesConfig,
    pub search: SearchConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, ResolverError> {
    dotenvy::dotenv().ok();

    let proxy   = build_proxy()?;
    let itunes  = build_itunes()?;
    let search  = build_search();
    let http    = HttpConfig::default();
    let logging = build_logging();

    Ok( AppConfig { proxy, itunes, search, http, logging } )
}
