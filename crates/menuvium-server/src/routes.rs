use crate::auth::{self, enforce_admin};
use crate::backend::{ApiClient, Auth, CatalogSource};
use crate::metrics;
use crate::proxy::Proxy;
use crate::session;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{
    extract::{Path, Query, State},
    routing::{any, get, post, put},
    Json, Router,
};
use menuvium_core::presets::{TagGroup, TagLabels, TAG_PRESETS};
use menuvium_core::{Menu, MenuError, MenuQuery, MenuSummary, MenuView, Organization, SoldOutMode};
use menuvium_storage::{ClientPreferences, DashboardCache, PrefStore};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shown to guests for every public-menu load failure.
pub const MENU_LOAD_ERROR: &str = "Could not load menu. Please try again later.";

#[derive(Clone)]
pub struct AppState {
    pub catalogs: Arc<dyn CatalogSource>,
    pub catalog_cache: DashboardCache<Menu>,
    pub prefs: Arc<dyn PrefStore>,
    pub api: Arc<ApiClient>,
    pub org_cache: DashboardCache<Vec<Organization>>,
    pub menu_list_cache: DashboardCache<Vec<MenuSummary>>,
    pub proxy: Proxy,
    pub admin_key: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route("/v1/menus/:menu_id", get(get_catalog))
        .route("/v1/menus/:menu_id/view", get(view_menu))
        .route("/v1/menus/:menu_id/query", post(query_menu))
        .route("/v1/menus/:menu_id/facets", get(menu_facets))
        .route("/v1/preferences", get(get_preferences))
        .route("/v1/preferences/sold-out", put(put_sold_out))
        .route("/v1/preferences/tag-labels", put(put_tag_labels))
        .route("/v1/preferences/tag-groups", put(put_tag_groups))
        .route("/v1/tag-presets", get(tag_presets))
        .route("/v1/dashboard/organizations", get(dashboard_orgs))
        .route(
            "/v1/dashboard/organizations/:org_id/menus",
            get(dashboard_org_menus),
        )
        .route("/admin/cache/invalidate", post(admin_invalidate))
        .route("/api/*path", any(proxy_api))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_text() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    let _ = encoder.encode(&metric_families, &mut buf);
    (StatusCode::OK, String::from_utf8(buf).unwrap_or_default())
}

fn error_response(e: &MenuError) -> Response {
    let status = match e {
        MenuError::Unauthenticated => StatusCode::UNAUTHORIZED,
        MenuError::Invalid(_) => StatusCode::BAD_REQUEST,
        MenuError::Api { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        MenuError::Upstream(_) => StatusCode::BAD_GATEWAY,
        MenuError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = match e {
        MenuError::Api {
            detail: Some(detail),
            ..
        } => json!({"error": e.to_string(), "detail": detail}),
        _ => json!({"error": e.to_string()}),
    };
    (status, Json(body)).into_response()
}

// Public menu

async fn load_catalog(app: &AppState, menu_id: &str) -> Result<Menu, Response> {
    let source = app.catalogs.clone();
    let id = menu_id.to_string();
    let key = format!("public-menu:{menu_id}");
    match app
        .catalog_cache
        .get_or_fetch(&key, move || async move { source.fetch_menu(&id).await })
        .await
    {
        Ok(fetched) => {
            metrics::record_cache("catalog", fetched.from_cache);
            Ok(fetched.value)
        }
        Err(e) => {
            tracing::warn!(menu_id, error = %e, "public menu fetch failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": MENU_LOAD_ERROR })),
            )
                .into_response())
        }
    }
}

#[derive(Serialize)]
struct ViewResponse {
    #[serde(flatten)]
    view: MenuView,
    tag_labels: TagLabels,
}

fn render_view(menu: &Menu, query: &MenuQuery, prefs: ClientPreferences) -> Response {
    let _timer = metrics::VIEW_QUERY_SECONDS.start_timer();
    let view = query.run(menu, &prefs.tag_groups);
    (
        StatusCode::OK,
        Json(ViewResponse {
            view,
            tag_labels: prefs.tag_labels,
        }),
    )
        .into_response()
}

fn parse_sold_out(raw: Option<&str>, fallback: SoldOutMode) -> Result<SoldOutMode, Response> {
    match raw.filter(|s| !s.is_empty()) {
        None => Ok(fallback),
        Some(s) => s.parse().map_err(|e: MenuError| error_response(&e)),
    }
}

async fn get_catalog(State(app): State<AppState>, Path(menu_id): Path<String>) -> Response {
    match load_catalog(&app, &menu_id).await {
        Ok(menu) => (StatusCode::OK, Json(menu)).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ViewParams {
    q: Option<String>,
    // comma separated tag keys, e.g. d:t-1,a:a-2
    tags: Option<String>,
    sold_out: Option<String>,
}

async fn view_menu(
    State(app): State<AppState>,
    Path(menu_id): Path<String>,
    Query(params): Query<ViewParams>,
) -> Response {
    let prefs = ClientPreferences::load(app.prefs.as_ref());
    let sold_out = match parse_sold_out(params.sold_out.as_deref(), prefs.sold_out_display) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let tags = params
        .tags
        .map(|t| {
            t.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let query = MenuQuery {
        search: params.q.unwrap_or_default(),
        tags,
        sold_out,
    };
    match load_catalog(&app, &menu_id).await {
        Ok(menu) => render_view(&menu, &query, prefs),
        Err(resp) => resp,
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct QueryBody {
    search: String,
    tags: Vec<String>,
    sold_out: Option<SoldOutMode>,
}

async fn query_menu(
    State(app): State<AppState>,
    Path(menu_id): Path<String>,
    Json(body): Json<QueryBody>,
) -> Response {
    let prefs = ClientPreferences::load(app.prefs.as_ref());
    let query = MenuQuery {
        search: body.search,
        tags: body.tags,
        sold_out: body.sold_out.unwrap_or(prefs.sold_out_display),
    };
    match load_catalog(&app, &menu_id).await {
        Ok(menu) => render_view(&menu, &query, prefs),
        Err(resp) => resp,
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FacetParams {
    sold_out: Option<String>,
}

async fn menu_facets(
    State(app): State<AppState>,
    Path(menu_id): Path<String>,
    Query(params): Query<FacetParams>,
) -> Response {
    let prefs = ClientPreferences::load(app.prefs.as_ref());
    let sold_out = match parse_sold_out(params.sold_out.as_deref(), prefs.sold_out_display) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    match load_catalog(&app, &menu_id).await {
        Ok(menu) => {
            let facets = menuvium_core::compute_facets(&menu, sold_out, &prefs.tag_groups);
            (StatusCode::OK, Json(facets)).into_response()
        }
        Err(resp) => resp,
    }
}

// Preferences

async fn get_preferences(State(app): State<AppState>) -> impl IntoResponse {
    Json(ClientPreferences::load(app.prefs.as_ref()))
}

#[derive(Deserialize)]
struct SoldOutBody {
    value: SoldOutMode,
}

async fn put_sold_out(State(app): State<AppState>, Json(body): Json<SoldOutBody>) -> Response {
    match ClientPreferences::save_sold_out_display(app.prefs.as_ref(), body.value) {
        Ok(()) => Json(ClientPreferences::load(app.prefs.as_ref())).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn put_tag_labels(
    State(app): State<AppState>,
    Json(body): Json<BTreeMap<String, String>>,
) -> Response {
    let res = ClientPreferences::update_tag_labels(app.prefs.as_ref(), |labels| {
        for (bucket, label) in body {
            labels.set(&bucket, label)?;
        }
        Ok(())
    });
    match res {
        Ok(labels) => Json(labels).into_response(),
        Err(e) => error_response(&e),
    }
}

// null moves a tag back to its preset bucket
async fn put_tag_groups(
    State(app): State<AppState>,
    Json(body): Json<BTreeMap<String, Option<TagGroup>>>,
) -> Response {
    match ClientPreferences::assign_tag_groups(app.prefs.as_ref(), body) {
        Ok(groups) => Json(groups).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn tag_presets() -> impl IntoResponse {
    Json(TAG_PRESETS)
}

// Dashboard reads

// Cache entries are scoped per user; a caller token without `sub` skips the cache.
fn caller_auth(headers: &HeaderMap) -> (Auth, Option<String>) {
    match auth::bearer(headers) {
        Some(token) => (Auth::Bearer(token.to_string()), session::subject(token)),
        None => (Auth::Session, Some("service".to_string())),
    }
}

fn dashboard_error(app: &AppState, auth: &Auth, e: &MenuError) -> Response {
    if matches!(auth, Auth::Session) && matches!(e, MenuError::Api { status: 401, .. }) {
        app.api.forget_session();
    }
    tracing::warn!(error = %e, "dashboard read failed");
    error_response(e)
}

async fn dashboard_orgs(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let (auth, scope) = caller_auth(&headers);
    let res = match scope {
        Some(scope) => {
            let api = app.api.clone();
            let fetch_auth = auth.clone();
            app.org_cache
                .get_or_fetch(&format!("dashboard:orgs:{scope}"), move || async move {
                    api.organizations(fetch_auth).await
                })
                .await
                .map(|f| {
                    metrics::record_cache("dashboard", f.from_cache);
                    f.value
                })
        }
        None => app.api.organizations(auth.clone()).await,
    };
    match res {
        Ok(orgs) => Json(orgs).into_response(),
        Err(e) => dashboard_error(&app, &auth, &e),
    }
}

async fn dashboard_org_menus(
    State(app): State<AppState>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let (auth, scope) = caller_auth(&headers);
    let res = match scope {
        Some(scope) => {
            let api = app.api.clone();
            let fetch_auth = auth.clone();
            let org = org_id.clone();
            app.menu_list_cache
                .get_or_fetch(
                    &format!("dashboard:menus:{org_id}:{scope}"),
                    move || async move { api.org_menus(&org, fetch_auth).await },
                )
                .await
                .map(|f| {
                    metrics::record_cache("dashboard", f.from_cache);
                    f.value
                })
        }
        None => app.api.org_menus(&org_id, auth.clone()).await,
    };
    match res {
        Ok(menus) => Json(menus).into_response(),
        Err(e) => dashboard_error(&app, &auth, &e),
    }
}

// Admin

#[derive(Deserialize, Default)]
#[serde(default)]
struct InvalidateParams {
    prefix: String,
}

async fn admin_invalidate(
    State(app): State<AppState>,
    Query(InvalidateParams { prefix }): Query<InvalidateParams>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = enforce_admin(&headers, app.admin_key.as_deref()) {
        return resp.into_response();
    }
    if prefix.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error":"missing prefix"})),
        )
            .into_response();
    }
    let removed = app.catalog_cache.invalidate_prefix(&prefix)
        + app.org_cache.invalidate_prefix(&prefix)
        + app.menu_list_cache.invalidate_prefix(&prefix);
    tracing::info!(%prefix, removed, "cache invalidated");
    (StatusCode::OK, Json(json!({ "removed": removed }))).into_response()
}

// Reverse proxy

// The raw URI is used instead of the decoded `*path` so escaped slashes survive.
async fn proxy_api(
    State(app): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    app.proxy.forward(method, &uri, &headers, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{fake_jwt, StaticSession, TokenCache};
    use anyhow::{Context, Result};
    use axum::body::Body;
    use axum::http::Request;
    use menuvium_core::{Allergen, Category, DietaryTag, Item};
    use menuvium_storage::InMemoryPrefs;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct FakeCatalogs {
        menus: HashMap<String, Menu>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CatalogSource for FakeCatalogs {
        async fn fetch_menu(&self, menu_id: &str) -> menuvium_core::Result<Menu> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.menus
                .get(menu_id)
                .cloned()
                .ok_or(MenuError::Api {
                    status: 404,
                    detail: Some("Menu not found".into()),
                })
        }
    }

    fn item(id: &str, name: &str, sold_out: bool, tags: &[(&str, &str)]) -> Item {
        let mut item = Item::new(id, name, 9.0);
        item.is_sold_out = sold_out;
        item.dietary_tags = tags.iter().map(|(i, n)| DietaryTag::new(*i, *n)).collect();
        item
    }

    fn sample_menu() -> Menu {
        let mut satay = item("4", "Satay", false, &[]);
        satay.allergens.push(Allergen::new("a-nuts", "Peanuts"));
        Menu {
            id: "m-1".into(),
            name: "Dinner".into(),
            slug: "dinner".into(),
            categories: vec![
                Category {
                    id: "c-1".into(),
                    name: "Appetizers".into(),
                    items: vec![
                        item("1", "Spring Rolls", false, &[("t-vegan", "Vegan")]),
                        item("2", "Soup", false, &[("t-spicy", "Spicy")]),
                        satay,
                    ],
                    ..Default::default()
                },
                Category {
                    id: "c-2".into(),
                    name: "Specials".into(),
                    items: vec![item("3", "Lobster", true, &[("t-new", "New")])],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn state_with(catalogs: Arc<FakeCatalogs>, backend: &str, admin_key: Option<&str>) -> AppState {
        let tokens = Arc::new(TokenCache::new(Arc::new(StaticSession(None))));
        AppState {
            catalogs,
            catalog_cache: DashboardCache::new(Duration::from_secs(30)),
            prefs: Arc::new(InMemoryPrefs::new()),
            api: Arc::new(ApiClient::new(backend, Duration::from_secs(5), tokens)),
            org_cache: DashboardCache::new(Duration::from_secs(30)),
            menu_list_cache: DashboardCache::new(Duration::from_secs(30)),
            proxy: Proxy::new(backend, Duration::from_secs(5)),
            admin_key: admin_key.map(String::from),
        }
    }

    fn fake_catalogs() -> Arc<FakeCatalogs> {
        Arc::new(FakeCatalogs {
            menus: HashMap::from([("m-1".to_string(), sample_menu())]),
            calls: AtomicUsize::new(0),
        })
    }

    async fn call(app: &Router, req: Request<Body>) -> Result<(StatusCode, serde_json::Value)> {
        let response = app
            .clone()
            .oneshot(req)
            .await
            .map_err(|err| -> anyhow::Error { match err {} })?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .context("read response body")?;
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(serde_json::Value::String(
                String::from_utf8_lossy(&body).into_owned(),
            ))
        };
        Ok((status, json))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn item_names(view: &serde_json::Value) -> Vec<String> {
        view["categories"]
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(|c| c["items"].as_array().cloned().unwrap_or_default())
            .filter_map(|i| i["name"].as_str().map(String::from))
            .collect()
    }

    #[tokio::test]
    async fn health_is_ok() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let (status, body) = call(&app, get_req("/health")).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("ok"));
        Ok(())
    }

    #[tokio::test]
    async fn search_narrows_view() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let (status, view) = call(&app, get_req("/v1/menus/m-1/view?q=spring")).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item_names(&view), vec!["Spring Rolls"]);
        assert_eq!(view["categories"][0]["name"], "Appetizers");
        assert_eq!(view["matched_items"], 1);
        assert_eq!(view["tag_labels"]["spice"], "Spice Level");
        assert_eq!(view["sold_out"], "dim");
        Ok(())
    }

    #[tokio::test]
    async fn hide_mode_drops_sold_out_category() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let (_, dim) = call(&app, get_req("/v1/menus/m-1/view")).await?;
        assert_eq!(dim["categories"].as_array().map(Vec::len), Some(2));

        let (_, hide) = call(&app, get_req("/v1/menus/m-1/view?sold_out=hide")).await?;
        assert_eq!(hide["categories"].as_array().map(Vec::len), Some(1));
        assert!(!item_names(&hide).contains(&"Lobster".to_string()));
        assert!(hide["facets"]["highlights"].as_array().is_some_and(|a| a.is_empty()));

        let (status, _) = call(&app, get_req("/v1/menus/m-1/view?sold_out=blur")).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn stored_sold_out_preference_is_default() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let (status, prefs) = call(
            &app,
            json_req("PUT", "/v1/preferences/sold-out", json!({"value": "hide"})),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(prefs["sold_out_display"], "hide");

        let (_, view) = call(&app, get_req("/v1/menus/m-1/view")).await?;
        assert_eq!(view["sold_out"], "hide");
        assert_eq!(view["categories"].as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn posted_query_uses_or_tag_semantics() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let (status, view) = call(
            &app,
            json_req(
                "POST",
                "/v1/menus/m-1/query",
                json!({"tags": ["d:t-vegan", "a:a-nuts"]}),
            ),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item_names(&view), vec!["Spring Rolls", "Satay"]);

        let (_, view) = call(
            &app,
            json_req(
                "POST",
                "/v1/menus/m-1/query",
                json!({"search": "soup", "tags": ["d:t-vegan"]}),
            ),
        )
        .await?;
        assert!(item_names(&view).is_empty());
        assert_eq!(view["categories"], json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn facets_follow_group_overrides() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let (_, facets) = call(&app, get_req("/v1/menus/m-1/facets")).await?;
        assert_eq!(facets["diet"][0]["name"], "Vegan");
        assert_eq!(facets["spice"][0]["name"], "Spicy");
        assert_eq!(facets["allergens"][0]["name"], "Peanuts");

        let (status, _) = call(
            &app,
            json_req("PUT", "/v1/preferences/tag-groups", json!({"t-vegan": "highlights"})),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        let (_, facets) = call(&app, get_req("/v1/menus/m-1/facets")).await?;
        assert_eq!(facets["diet"], json!([]));
        let highlights: Vec<_> = facets["highlights"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(highlights, vec!["New", "Vegan"]);

        call(
            &app,
            json_req("PUT", "/v1/preferences/tag-groups", json!({"t-vegan": null})),
        )
        .await?;
        let (_, facets) = call(&app, get_req("/v1/menus/m-1/facets")).await?;
        assert_eq!(facets["diet"][0]["name"], "Vegan");
        Ok(())
    }

    #[tokio::test]
    async fn tag_labels_merge_and_reject_unknown_bucket() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let (status, labels) = call(
            &app,
            json_req("PUT", "/v1/preferences/tag-labels", json!({"spice": "Heat"})),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(labels["spice"], "Heat");
        assert_eq!(labels["diet"], "Diet");

        let (status, _) = call(
            &app,
            json_req("PUT", "/v1/preferences/tag-labels", json!({"dessert": "Sweet"})),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, prefs) = call(&app, get_req("/v1/preferences")).await?;
        assert_eq!(prefs["tag_labels"]["spice"], "Heat");
        Ok(())
    }

    #[tokio::test]
    async fn missing_menu_gets_generic_error_and_is_not_cached() -> Result<()> {
        let catalogs = fake_catalogs();
        let app = router(state_with(catalogs.clone(), "http://127.0.0.1:9", None));
        for _ in 0..2 {
            let (status, body) = call(&app, get_req("/v1/menus/nope/view")).await?;
            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert_eq!(body["error"], MENU_LOAD_ERROR);
        }
        assert_eq!(catalogs.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn catalog_fetched_once_until_invalidated() -> Result<()> {
        let catalogs = fake_catalogs();
        let app = router(state_with(catalogs.clone(), "http://127.0.0.1:9", Some("k")));
        call(&app, get_req("/v1/menus/m-1")).await?;
        call(&app, get_req("/v1/menus/m-1/view?q=soup")).await?;
        call(&app, get_req("/v1/menus/m-1/facets")).await?;
        assert_eq!(catalogs.calls.load(Ordering::SeqCst), 1);

        let (status, _) = call(
            &app,
            Request::builder()
                .method("POST")
                .uri("/admin/cache/invalidate?prefix=public-menu:")
                .body(Body::empty())?,
        )
        .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = auth::sign_admin_token("k", &json!({"verbs": ["admin"]}));
        let (status, body) = call(
            &app,
            Request::builder()
                .method("POST")
                .uri("/admin/cache/invalidate?prefix=public-menu:")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())?,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 1);

        call(&app, get_req("/v1/menus/m-1")).await?;
        assert_eq!(catalogs.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    async fn spawn_backend(hits: Arc<AtomicUsize>) -> String {
        let echo = |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| async move {
            let seen: BTreeMap<String, String> = headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();
            (
                StatusCode::CREATED,
                [("x-backend", "yes")],
                Json(json!({
                    "method": method.as_str(),
                    "uri": uri.to_string(),
                    "headers": seen,
                    "body": String::from_utf8_lossy(&body),
                })),
            )
        };
        let orgs = move |headers: HeaderMap| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                if headers.get("authorization").is_none() {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                Ok(Json(json!([{"id": "o-1", "name": "Cafe", "slug": "cafe", "owner_id": "u-1"}])))
            }
        };
        let backend = Router::new()
            .route("/organizations/", get(orgs))
            .fallback(echo);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, backend).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn proxy_rewrites_path_and_headers() -> Result<()> {
        let backend = spawn_backend(Arc::new(AtomicUsize::new(0))).await;
        let app = router(state_with(fake_catalogs(), &backend, None));
        let (status, echoed) = call(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/menus?org_id=o-1")
                .header("host", "menu.example.com")
                .header("authorization", "Bearer abc")
                .body(Body::from("{\"name\":\"Brunch\"}"))?,
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["uri"], "/menus/?org_id=o-1");
        assert_eq!(echoed["body"], "{\"name\":\"Brunch\"}");
        assert_eq!(echoed["headers"]["authorization"], "Bearer abc");
        assert_eq!(echoed["headers"]["x-forwarded-host"], "menu.example.com");
        assert_eq!(echoed["headers"]["x-forwarded-prefix"], "/api");
        assert_eq!(echoed["headers"]["x-forwarded-proto"], "http");
        Ok(())
    }

    #[tokio::test]
    async fn proxy_keeps_escaped_slash_in_segment() -> Result<()> {
        let backend = spawn_backend(Arc::new(AtomicUsize::new(0))).await;
        let app = router(state_with(fake_catalogs(), &backend, None));
        let (status, echoed) = call(&app, get_req("/api/items/a%2Fb/photos")).await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(echoed["uri"], "/items/a%2Fb/photos");

        let (_, echoed) = call(&app, get_req("/api/items/caf%C3%A9%20au%20lait")).await?;
        assert_eq!(echoed["uri"], "/items/caf%C3%A9%20au%20lait");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_query_string_is_rejected() -> Result<()> {
        let catalogs = fake_catalogs();
        let app = router(state_with(catalogs.clone(), "http://127.0.0.1:9", None));
        let (status, _) = call(&app, get_req("/v1/menus/m-1/view?q=a&q=b")).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, get_req("/v1/menus/m-1/facets?sold_out=a&sold_out=b")).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(catalogs.calls.load(Ordering::SeqCst), 0);

        let (status, _) = call(&app, get_req("/v1/menus/m-1/view?unknown=1")).await?;
        assert_eq!(status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn tag_presets_list_every_bucket() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let (status, presets) = call(&app, get_req("/v1/tag-presets")).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(presets["allergens"][0], "Contains Nuts");
        assert_eq!(presets["highlights"][1], "Chef's Special");
        assert_eq!(presets["spice"].as_array().map(Vec::len), Some(3));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_group_updates_are_all_kept() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let mut tasks = Vec::new();
        for i in 0..16 {
            let app = app.clone();
            tasks.push(tokio::spawn(async move {
                call(
                    &app,
                    json_req("PUT", "/v1/preferences/tag-groups", json!({format!("t-{i}"): "spice"})),
                )
                .await
            }));
        }
        for task in tasks {
            let (status, _) = task.await??;
            assert_eq!(status, StatusCode::OK);
        }
        let (_, prefs) = call(&app, get_req("/v1/preferences")).await?;
        let groups = prefs["tag_groups"].as_object().context("tag_groups object")?;
        assert_eq!(groups.len(), 16);
        Ok(())
    }

    #[tokio::test]
    async fn proxy_reports_unreachable_backend() -> Result<()> {
        let app = router(state_with(fake_catalogs(), "http://127.0.0.1:9", None));
        let (status, _) = call(&app, get_req("/api/menus/public/m-1")).await?;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        Ok(())
    }

    #[tokio::test]
    async fn dashboard_orgs_cached_per_user() -> Result<()> {
        let hits = Arc::new(AtomicUsize::new(0));
        let backend = spawn_backend(hits.clone()).await;
        let app = router(state_with(fake_catalogs(), &backend, None));
        let token = fake_jwt(json!({"sub": "u-1", "exp": 4_000_000_000i64}));
        for _ in 0..2 {
            let (status, orgs) = call(
                &app,
                Request::builder()
                    .uri("/v1/dashboard/organizations")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())?,
            )
            .await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(orgs[0]["slug"], "cafe");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // no caller token and no API_TOKEN configured
        let (status, _) = call(&app, get_req("/v1/dashboard/organizations")).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
