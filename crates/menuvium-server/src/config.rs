use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BACKEND: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: SocketAddr,
    pub backend_base: String,
    pub prefs_dir: Option<PathBuf>,
    pub catalog_cache_ttl: Duration,
    pub dashboard_cache_ttl: Duration,
    pub upstream_timeout: Duration,
    pub api_token: Option<String>,
    pub admin_key: Option<String>,
    pub otlp_endpoint: Option<String>,
    pub tls: Option<(PathBuf, PathBuf)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backend_base: DEFAULT_BACKEND.to_string(),
            prefs_dir: None,
            catalog_cache_ttl: Duration::from_millis(30_000),
            dashboard_cache_ttl: Duration::from_millis(30_000),
            upstream_timeout: Duration::from_secs(10),
            api_token: None,
            admin_key: None,
            otlp_endpoint: None,
            tls: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let non_empty = |k: &str| get(k).filter(|v| !v.trim().is_empty());

        let http_addr = match non_empty("HTTP_ADDR") {
            Some(raw) => raw.parse::<SocketAddr>().unwrap_or_else(|e| {
                tracing::warn!(value = %raw, error = %e, "bad HTTP_ADDR, using default");
                defaults.http_addr
            }),
            None => defaults.http_addr,
        };
        let duration = |k: &str, unit: fn(u64) -> Duration, fallback: Duration| {
            non_empty(k)
                .map(|raw| match raw.trim().parse::<u64>() {
                    Ok(n) => unit(n),
                    Err(_) => {
                        tracing::warn!(key = k, value = %raw, "not a number, using default");
                        fallback
                    }
                })
                .unwrap_or(fallback)
        };
        let tls = match (non_empty("TLS_CERT_PATH"), non_empty("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            _ => None,
        };

        Self {
            http_addr,
            backend_base: backend_base(
                non_empty("API_INTERNAL_URL").or_else(|| non_empty("NEXT_PUBLIC_API_URL")),
            ),
            prefs_dir: non_empty("PREFS_DIR").map(PathBuf::from),
            catalog_cache_ttl: duration(
                "CATALOG_CACHE_TTL_MS",
                Duration::from_millis,
                defaults.catalog_cache_ttl,
            ),
            dashboard_cache_ttl: duration(
                "DASHBOARD_CACHE_TTL_MS",
                Duration::from_millis,
                defaults.dashboard_cache_ttl,
            ),
            upstream_timeout: duration(
                "UPSTREAM_TIMEOUT_SECS",
                Duration::from_secs,
                defaults.upstream_timeout,
            ),
            api_token: non_empty("API_TOKEN"),
            admin_key: non_empty("ADMIN_KEY"),
            otlp_endpoint: non_empty("OTLP_ENDPOINT"),
            tls,
        }
    }
}

/// Backend base URL without a trailing slash. Anything that is not an
/// http(s) URL falls back to the local default.
pub fn backend_base(configured: Option<String>) -> String {
    match configured {
        Some(base) if base.starts_with("http://") || base.starts_with("https://") => {
            base.trim_end_matches('/').to_string()
        }
        _ => DEFAULT_BACKEND.to_string(),
    }
}
