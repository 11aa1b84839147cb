//! Platform session cookie persistence: load/inject before the first navigation,
//! save back after a confirmed login.
//!
//! The cookie file is a JSON array of CDP `Network.Cookie` objects, which
//! deserialize directly into `CookieParam`s for `Network.setCookies`.

use std::path::Path;
use tracing::{info, warn};

/// Only cookies whose domain contains this are persisted.
pub const PLATFORM_COOKIE_DOMAIN: &str = "linkedin.com";

// ─────────────────────────────────────────────────────────────────────────────
// Expiry helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum finite cookie expiry (unix seconds). `-1` marks a session cookie and is skipped.
pub fn min_cookie_expiry(raw_cookies: &[serde_json::Value]) -> Option<f64> {
    raw_cookies
        .iter()
        .filter_map(|v| v.get("expires").and_then(|e| e.as_f64()))
        .filter(|&exp| exp > 0.0)
        .reduce(f64::min)
}

/// Whether a stored jar is still worth injecting at `now` (unix seconds).
///
/// A jar made only of session cookies is treated as fresh; a stale one just
/// lands on the login page, which the login step handles.
pub fn is_fresh(raw_cookies: &[serde_json::Value], now: f64) -> bool {
    if raw_cookies.is_empty() {
        return false;
    }
    match min_cookie_expiry(raw_cookies) {
        Some(exp) => exp > now,
        None => true,
    }
}

fn on_platform(cookie: &serde_json::Value) -> bool {
    cookie
        .get("domain")
        .and_then(|d| d.as_str())
        .map(|d| d.contains(PLATFORM_COOKIE_DOMAIN))
        .unwrap_or(false)
}

// ─────────────────────────────────────────────────────────────────────────────
// Load / save
// ─────────────────────────────────────────────────────────────────────────────

pub fn load_raw(path: &Path) -> Option<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path).ok()?;
    let cookies: Vec<serde_json::Value> = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("session_store: unreadable cookie file {}: {}", path.display(), e);
            return None;
        }
    };
    if cookies.is_empty() {
        return None;
    }
    info!(
        "session_store: 🍪 loaded {} cookies from {}",
        cookies.len(),
        path.display()
    );
    Some(cookies)
}

/// Persist the platform's cookies from a raw CDP cookie list. Returns how many were written.
pub fn save_raw(path: &Path, raw_cookies: &[serde_json::Value]) -> std::io::Result<usize> {
    let kept: Vec<&serde_json::Value> = raw_cookies.iter().filter(|c| on_platform(c)).collect();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let body = serde_json::to_vec_pretty(&kept).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(kept.len())
}

// ─────────────────────────────────────────────────────────────────────────────
// CDP glue
// ─────────────────────────────────────────────────────────────────────────────

/// Inject stored cookies into a live page. Call before `goto` so the first request carries them.
/// Malformed entries are skipped.
pub async fn inject_into_page(page: &chromiumoxide::Page, raw_cookies: &[serde_json::Value]) {
    use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};

    let cookie_params: Vec<CookieParam> = raw_cookies
        .iter()
        .filter_map(|v| serde_json::from_value::<CookieParam>(v.clone()).ok())
        .collect();

    if cookie_params.is_empty() {
        warn!("session_store: stored session JSON contained no valid CookieParams; skipping injection");
        return;
    }

    let count = cookie_params.len();
    match page.execute(SetCookiesParams::new(cookie_params)).await {
        Ok(_) => info!("session_store: 💉 injected {} session cookies", count),
        Err(e) => warn!("session_store: failed to inject session cookies: {}", e),
    }
}

/// Load the jar at `path` and inject it when still fresh. Returns `true` when cookies were injected.
pub async fn restore(page: &chromiumoxide::Page, path: &Path) -> bool {
    let Some(raw) = load_raw(path) else {
        return false;
    };
    let now = chrono::Utc::now().timestamp() as f64;
    if !is_fresh(&raw, now) {
        info!("session_store: stored session at {} has expired", path.display());
        return false;
    }
    inject_into_page(page, &raw).await;
    true
}

/// Read all cookies from the page and persist the platform's ones.
pub async fn save_from_page(page: &chromiumoxide::Page, path: &Path) {
    let cookies = match page.get_cookies().await {
        Ok(c) => c,
        Err(e) => {
            warn!("session_store: could not read cookies: {}", e);
            return;
        }
    };
    let raw: Vec<serde_json::Value> = cookies
        .iter()
        .filter_map(|c| serde_json::to_value(c).ok())
        .collect();
    match save_raw(path, &raw) {
        Ok(n) => info!("session_store: saved {} platform cookies to {}", n, path.display()),
        Err(e) => warn!("session_store: failed to save cookies to {}: {}", path.display(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_only_jar_is_fresh() {
        let cookies = vec![
            json!({"name": "li_at", "value": "abc", "domain": ".linkedin.com", "expires": -1.0}),
        ];
        assert!(min_cookie_expiry(&cookies).is_none());
        assert!(is_fresh(&cookies, 1_700_000_000.0));
    }

    #[test]
    fn test_expired_jar_is_stale() {
        let cookies = vec![
            json!({"name": "li_at", "value": "abc", "domain": ".linkedin.com", "expires": 1_600_000_000.0}),
            json!({"name": "JSESSIONID", "value": "x", "domain": ".www.linkedin.com", "expires": -1.0}),
        ];
        assert!(!is_fresh(&cookies, 1_700_000_000.0));
        assert!(is_fresh(&cookies, 1_500_000_000.0));
        assert!(!is_fresh(&[], 0.0));
    }

    #[test]
    fn test_save_keeps_only_platform_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_cookies.json");
        let cookies = vec![
            json!({"name": "li_at", "value": "abc", "domain": ".linkedin.com"}),
            json!({"name": "NID", "value": "g", "domain": ".google.com"}),
        ];
        assert_eq!(save_raw(&path, &cookies).unwrap(), 1);
        let loaded = load_raw(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0]["name"], "li_at");
    }

    #[test]
    fn test_missing_or_empty_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_cookies.json");
        assert!(load_raw(&path).is_none());
        std::fs::write(&path, "[]").unwrap();
        assert!(load_raw(&path).is_none());
    }
}
