//! Client for the menu backend's REST API.

use crate::metrics;
use crate::session::TokenCache;
use menuvium_core::{Menu, MenuError, MenuSummary, Organization, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Where published menus come from. The server talks to the backend through
/// this seam so tests can serve catalogs from memory.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync + 'static {
    async fn fetch_menu(&self, menu_id: &str) -> Result<Menu>;
}

#[derive(Debug, Clone)]
pub enum Auth {
    /// Public endpoint, no header.
    Anonymous,
    /// Token from the configured session provider.
    Session,
    /// Token supplied by the caller.
    Bearer(String),
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, tokens: Arc<TokenCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Drops the cached session token after the backend rejected it.
    pub fn forget_session(&self) {
        self.tokens.forget();
    }

    async fn get_json<T: DeserializeOwned + Default>(&self, op: &str, path: &str, auth: Auth) -> Result<T> {
        let _timer = metrics::UPSTREAM_SECONDS
            .with_label_values(&[op])
            .start_timer();
        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        let token = match auth {
            Auth::Anonymous => None,
            Auth::Session => Some(self.tokens.token().await?),
            Auth::Bearer(t) => Some(t),
        };
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| MenuError::Upstream(e.to_string()))?;
        handle_response(resp).await
    }

    pub async fn public_menu(&self, menu_id: &str) -> Result<Menu> {
        self.get_json("public_menu", &format!("/menus/public/{menu_id}"), Auth::Anonymous)
            .await
    }

    pub async fn organizations(&self, auth: Auth) -> Result<Vec<Organization>> {
        self.get_json("organizations", "/organizations/", auth).await
    }

    pub async fn org_menus(&self, org_id: &str, auth: Auth) -> Result<Vec<MenuSummary>> {
        self.get_json("org_menus", &format!("/organizations/{org_id}/menus"), auth)
            .await
    }
}

#[async_trait::async_trait]
impl CatalogSource for ApiClient {
    async fn fetch_menu(&self, menu_id: &str) -> Result<Menu> {
        let res = self.public_menu(menu_id).await;
        let label = if res.is_ok() { "ok" } else { "error" };
        metrics::CATALOG_FETCH_TOTAL.with_label_values(&[label]).inc();
        res
    }
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

async fn handle_response<T: DeserializeOwned + Default>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let body = resp
        .bytes()
        .await
        .map_err(|e| MenuError::Upstream(e.to_string()))?;
    if !status.is_success() {
        let detail = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.detail)
            .map(|d| match d {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(?detail, "backend returned 404");
        }
        return Err(MenuError::Api {
            status: status.as_u16(),
            detail,
        });
    }
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(&body).map_err(|e| MenuError::Upstream(format!("bad payload: {e}")))
}
