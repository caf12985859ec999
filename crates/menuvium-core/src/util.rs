use std::cmp::Ordering;

/// Display-name ordering for facet lists: case-insensitive first, then the
/// raw string so the order is total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
