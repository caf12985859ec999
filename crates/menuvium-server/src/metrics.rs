use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Histogram,
    HistogramVec,
};

pub static CATALOG_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "catalog_fetch_total",
        "Public menu fetches from the backend by result",
        &["result"]
    )
    .unwrap()
});

pub static CACHE_LOOKUPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cache_lookups_total",
        "Cache lookups by cache and outcome",
        &["cache", "outcome"]
    )
    .unwrap()
});

pub static VIEW_QUERY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "view_query_seconds",
        "Time to filter a menu and build its facets",
        vec![0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05]
    )
    .unwrap()
});

pub static PROXY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "proxy_requests_total",
        "Forwarded /api requests by status class",
        &["class"]
    )
    .unwrap()
});

pub static UPSTREAM_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!("upstream_seconds", "Backend call latency", &["op"]).unwrap()
});

pub fn record_cache(cache: &str, from_cache: bool) {
    let outcome = if from_cache { "hit" } else { "miss" };
    CACHE_LOOKUPS_TOTAL
        .with_label_values(&[cache, outcome])
        .inc();
}

pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
