//! Bearer tokens for calls to the backend's authenticated API.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as b64, Engine};
use menuvium_core::{MenuError, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How long a fetched token is reused without asking the provider again.
pub const TOKEN_CACHE_WINDOW: Duration = Duration::from_secs(10);
/// A token expiring sooner than this is treated as already expired.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

#[async_trait::async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    async fn id_token(&self) -> Result<String>;
}

/// Provider backed by a token configured at startup (`API_TOKEN`).
pub struct StaticSession(pub Option<String>);

#[async_trait::async_trait]
impl SessionProvider for StaticSession {
    async fn id_token(&self) -> Result<String> {
        self.0.clone().ok_or(MenuError::Unauthenticated)
    }
}

pub struct TokenCache {
    provider: Arc<dyn SessionProvider>,
    cached: Mutex<Option<(String, Instant)>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String> {
        let cached = self.cached.lock().clone();
        if let Some((token, fetched_at)) = cached {
            if fetched_at.elapsed() < TOKEN_CACHE_WINDOW && valid_soon(&token, unix_now()) {
                return Ok(token);
            }
        }
        let token = self.provider.id_token().await?;
        if token.is_empty() {
            return Err(MenuError::Unauthenticated);
        }
        *self.cached.lock() = Some((token.clone(), Instant::now()));
        Ok(token)
    }

    pub fn forget(&self) {
        *self.cached.lock() = None;
    }
}

#[derive(serde::Deserialize, Default)]
pub struct Claims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub sub: Option<String>,
}

/// Decodes a JWT's payload segment without checking the signature.
pub fn decode_jwt_payload<T: DeserializeOwned>(token: &str) -> Option<T> {
    let payload = token.split('.').nth(1)?;
    let bytes = b64.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// True when the token's `exp` is more than the margin away. No `exp`, no trust.
pub fn valid_soon(token: &str, now: i64) -> bool {
    decode_jwt_payload::<Claims>(token)
        .and_then(|c| c.exp)
        .is_some_and(|exp| exp > now + EXPIRY_MARGIN_SECS)
}

pub fn subject(token: &str) -> Option<String> {
    decode_jwt_payload::<Claims>(token).and_then(|c| c.sub)
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
pub(crate) fn fake_jwt(claims: serde_json::Value) -> String {
    format!(
        "{}.{}.sig",
        b64.encode(br#"{"alg":"none"}"#),
        b64.encode(serde_json::to_vec(&claims).unwrap())
    )
}
