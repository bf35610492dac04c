//! API URL helpers
//!
//! Relative API paths (`/api/order/`) are resolved against the configured
//! base URL or, when it is empty, against the page origin.

/// Origin of the current page, e.g. "http://localhost:8080"
///
/// Empty string if window is not available.
pub fn page_origin() -> String {
    let window = match web_sys::window() {
        Some(w) => w,
        None => return String::new(),
    };
    window.location().origin().unwrap_or_default()
}

/// Base URL for API requests
///
/// # Example
/// ```rust,no_run
/// # use frontend::shared::api_utils::api_base;
/// let base = api_base("");            // "http://localhost:8080"
/// let base = api_base("http://erp/"); // "http://erp"
/// ```
pub fn api_base(configured: &str) -> String {
    let configured = configured.trim().trim_end_matches('/');
    if configured.is_empty() {
        page_origin()
    } else {
        configured.to_string()
    }
}

/// Full URL for an API path; absolute URLs are returned as is
pub fn api_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
