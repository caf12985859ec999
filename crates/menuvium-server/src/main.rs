use anyhow::Context;
use menuvium_storage::{DashboardCache, FilePrefs, InMemoryPrefs, PrefStore};
use opentelemetry_otlp::WithExportConfig;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

mod auth;
mod backend;
mod config;
mod metrics;
mod proxy;
mod routes;
mod session;

use backend::ApiClient;
use config::Config;
use proxy::Proxy;
use routes::AppState;
use session::{StaticSession, TokenCache};

fn init_tracing(otlp: Option<&str>) {
    if let Some(endpoint) = otlp {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .ok();
        if let Some(tracer) = tracer {
            let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
            let subscriber = tracing_subscriber::registry()
                .with(tracing_subscriber::EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .with(telemetry);
            tracing::subscriber::set_global_default(subscriber).ok();
            return;
        }
    }
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter("info")
        .init();
}

fn open_prefs(config: &Config) -> Arc<dyn PrefStore> {
    match &config.prefs_dir {
        Some(dir) => match FilePrefs::open(dir) {
            Ok(store) => {
                info!(path = %store.path().display(), "preferences on disk");
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "falling back to in-memory preferences");
                Arc::new(InMemoryPrefs::new())
            }
        },
        None => Arc::new(InMemoryPrefs::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing(config.otlp_endpoint.as_deref());

    let tokens = Arc::new(TokenCache::new(Arc::new(StaticSession(
        config.api_token.clone(),
    ))));
    let api = Arc::new(ApiClient::new(
        config.backend_base.clone(),
        config.upstream_timeout,
        tokens,
    ));
    info!(backend = %api.base_url(), "menu backend");

    let state = AppState {
        catalogs: api.clone(),
        catalog_cache: DashboardCache::new(config.catalog_cache_ttl),
        prefs: open_prefs(&config),
        api,
        org_cache: DashboardCache::new(config.dashboard_cache_ttl),
        menu_list_cache: DashboardCache::new(config.dashboard_cache_ttl),
        proxy: Proxy::new(config.backend_base.clone(), config.upstream_timeout)
            .with_tls(config.tls.is_some()),
        admin_key: config.admin_key.clone(),
    };
    if state.admin_key.is_none() {
        tracing::warn!("ADMIN_KEY unset; admin routes are open");
    }
    let app = routes::router(state);

    let http_addr = config.http_addr;
    match &config.tls {
        Some((cert_path, key_path)) => {
            let cert = std::fs::read(cert_path)
                .with_context(|| format!("read cert {}", cert_path.display()))?;
            let key = std::fs::read(key_path)
                .with_context(|| format!("read key {}", key_path.display()))?;
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem(cert, key)
                .await
                .context("tls config")?;
            info!(%http_addr, "listening (https)");
            axum_server::bind_rustls(http_addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(%http_addr, "listening (http)");
            axum_server::bind(http_addr)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}
