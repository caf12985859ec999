//! `/api/*` pass-through to the backend.

use crate::metrics;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::json;
use std::time::Duration;

pub const PUBLIC_PREFIX: &str = "/api";

// Everything but `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

// Collection roots the backend only serves with a trailing slash.
const SLASHED_ROOTS: &[&str] = &["organizations", "menus", "items", "categories"];

#[derive(Clone)]
pub struct Proxy {
    backend_base: String,
    http: reqwest::Client,
    // scheme this server is reached on, used when no proxy in front set one
    scheme: &'static str,
}

impl Proxy {
    pub fn new(backend_base: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            backend_base: backend_base.into().trim_end_matches('/').to_string(),
            http,
            scheme: "http",
        }
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.scheme = if tls { "https" } else { "http" };
        self
    }

    /// Backend URL for a request path below [`PUBLIC_PREFIX`], still in its
    /// raw percent-encoded form. Segments are decoded and re-encoded one by
    /// one, so an escaped `/` stays inside its segment.
    pub fn target_url(&self, raw_path: &str, query: Option<&str>) -> String {
        let parts: Vec<String> = raw_path
            .split('/')
            .filter(|p| !p.is_empty())
            .map(|p| percent_decode_str(p).decode_utf8_lossy().into_owned())
            .collect();
        let mut url = format!("{}/", self.backend_base);
        url.push_str(
            &parts
                .iter()
                .map(|p| encode_component(p))
                .collect::<Vec<_>>()
                .join("/"),
        );
        if parts.len() == 1 && SLASHED_ROOTS.contains(&parts[0].as_str()) {
            url.push('/');
        }
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }

    pub async fn forward(&self, method: Method, uri: &Uri, headers: &HeaderMap, body: Bytes) -> Response {
        let path = uri.path();
        let url = self.target_url(path.strip_prefix(PUBLIC_PREFIX).unwrap_or(path), uri.query());
        let mut req = self
            .http
            .request(method.clone(), &url)
            .headers(forwarded_headers(headers, self.scheme));
        if method != Method::GET && method != Method::HEAD {
            req = req.body(body);
        }
        let upstream = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%url, error = %e, "proxy upstream failed");
                metrics::PROXY_REQUESTS_TOTAL
                    .with_label_values(&["error"])
                    .inc();
                return (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({"error": "upstream unavailable"})),
                )
                    .into_response();
            }
        };
        let status = upstream.status();
        metrics::PROXY_REQUESTS_TOTAL
            .with_label_values(&[metrics::status_class(status.as_u16())])
            .inc();
        let mut out_headers = upstream.headers().clone();
        out_headers.remove(header::CONTENT_ENCODING);
        out_headers.remove(header::CONTENT_LENGTH);

        let mut resp = Response::new(Body::from_stream(upstream.bytes_stream()));
        *resp.status_mut() = status;
        *resp.headers_mut() = out_headers;
        resp
    }
}

/// Copies request headers minus hop-specific ones and adds the
/// `x-forwarded-*` set the backend uses to build absolute URLs. An incoming
/// `x-forwarded-proto` wins over `scheme`.
pub fn forwarded_headers(incoming: &HeaderMap, scheme: &'static str) -> HeaderMap {
    let mut headers = incoming.clone();
    headers.remove(header::HOST);
    headers.remove(header::CONNECTION);
    headers.remove(header::CONTENT_LENGTH);

    if let Some(host) = incoming.get(header::HOST) {
        headers.insert("x-forwarded-host", host.clone());
    }
    let proto = incoming
        .get("x-forwarded-proto")
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(scheme));
    headers.insert("x-forwarded-proto", proto);
    headers.insert("x-forwarded-prefix", HeaderValue::from_static(PUBLIC_PREFIX));
    headers
}

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}
