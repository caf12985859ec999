use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

pub type Rejection = (StatusCode, Json<serde_json::Value>);

// Admin token enforcement (HMAC signed JSON). Token format: payload.sig,
// both base64url without padding. With no key configured the routes are open.
pub fn enforce_admin(
    headers: &HeaderMap,
    admin_key: Option<&str>,
) -> Result<serde_json::Value, Rejection> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD as b64, Engine};
    let Some(secret) = admin_key else {
        return Ok(json!({}));
    };
    let token = match bearer(headers) {
        Some(t) => t,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error":"missing token"})),
            ))
        }
    };
    let (payload_b64, sig_b64) = token
        .split_once('.')
        .ok_or((StatusCode::UNAUTHORIZED, Json(json!({"error":"bad token"}))))?;
    let payload = b64
        .decode(payload_b64)
        .map_err(|_| (StatusCode::UNAUTHORIZED, Json(json!({"error":"bad b64"}))))?;
    let sig_bytes = b64
        .decode(sig_b64)
        .map_err(|_| (StatusCode::UNAUTHORIZED, Json(json!({"error":"bad b64"}))))?;
    let mut mac = <Hmac<Sha256>>::new_from_slice(secret.as_bytes()).map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error":"bad key"})),
        )
    })?;
    mac.update(&payload);
    if mac.verify_slice(&sig_bytes).is_err() {
        return Err((StatusCode::UNAUTHORIZED, Json(json!({"error":"bad sig"}))));
    }
    let claims: serde_json::Value = serde_json::from_slice(&payload).map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"bad claims"})),
        )
    })?;
    if let Some(arr) = claims.get("verbs").and_then(|v| v.as_array()) {
        if !arr.iter().any(|v| v.as_str() == Some("admin")) {
            return Err((StatusCode::FORBIDDEN, Json(json!({"error":"verb denied"}))));
        }
    }
    if let Some(exp) = claims.get("exp").and_then(|v| v.as_i64()) {
        if exp < chrono::Utc::now().timestamp() {
            return Err((StatusCode::UNAUTHORIZED, Json(json!({"error":"expired"}))));
        }
    }
    Ok(claims)
}

pub fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
pub(crate) fn sign_admin_token(secret: &str, claims: &serde_json::Value) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD as b64, Engine};
    let payload = serde_json::to_vec(claims).unwrap();
    let mut mac = <Hmac<Sha256>>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(&payload);
    let sig = mac.finalize().into_bytes();
    format!("{}.{}", b64.encode(&payload), b64.encode(sig))
}
