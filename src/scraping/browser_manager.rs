//! Native browser management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * Launching the run's one persistent-profile browser session with stealth defaults.
//! * `wait_until_stable` for the platform's SPA pages.
//!
//! A run owns exactly one [`BrowserSession`] and drives a single page sequentially.

use crate::core::config::{BrowserSection, PathsConfig};
use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Hides the most common automation fingerprints before any page script runs.
const STEALTH_SCRIPT: &str = r#"
(() => {
    try {
        const proto = Object.getPrototypeOf(navigator);
        Object.defineProperty(proto, 'webdriver', { get: () => undefined, configurable: true });
    } catch (e) {}
    try { delete navigator.webdriver; } catch (e) {}
    try {
        Object.defineProperty(navigator, 'languages', { get: () => ['es-ES', 'es', 'en-US', 'en'] });
    } catch (e) {}
    if (!window.chrome) { window.chrome = { runtime: {} }; }
})();
"#;

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. Explicit override (config `browser.executable` / `CHROME_EXECUTABLE`)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable(explicit: Option<String>) -> Option<String> {
    if let Some(p) = explicit {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/bin/brave-browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch config ────────────────────────────────────────────────────────────

/// Build a `BrowserConfig` for the run session.
///
/// The profile dir persists between runs so the platform sees a returning
/// browser. `--disable-blink-features=AutomationControlled` hides the CDP
/// automation flag at process level; the page-level part is [`STEALTH_SCRIPT`].
pub fn build_session_config(
    exe: &str,
    headless: bool,
    profile_dir: &Path,
    width: u32,
    height: u32,
) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .user_data_dir(profile_dir)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-crash-reporter")
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--lang=es-ES");

    if !headless {
        builder = builder.with_head();
    } else {
        builder = builder.arg("--disable-gpu").arg("--no-sandbox");
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Session ──────────────────────────────────────────────────────────────────

/// The run's browser process, its CDP event pump and the single working page.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch the browser and open the working page with the stealth script installed.
    ///
    /// Fails when no browser executable can be found.
    pub async fn launch(browser_cfg: &BrowserSection, paths: &PathsConfig) -> Result<Self> {
        let exe = find_chrome_executable(browser_cfg.executable_override()).ok_or_else(|| {
            anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
        })?;
        let profile_dir = paths.resolve_browser_profile_dir();
        std::fs::create_dir_all(&profile_dir)
            .with_context(|| format!("creating browser profile dir {}", profile_dir.display()))?;

        let headless = browser_cfg.resolve_headless();
        info!(
            "🚀 launching browser ({}, {}) with profile {}",
            exe,
            if headless { "headless" } else { "headful" },
            profile_dir.display()
        );
        let config = build_session_config(&exe, headless, &profile_dir, 1280, 900)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch ({}): {}", exe, e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to open page: {}", e))?;

        page.execute(
            chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams::new(
                STEALTH_SCRIPT,
            ),
        )
        .await
        .map_err(|e| anyhow!("Failed to inject stealth script: {}", e))?;

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error (non-fatal): {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        info!("🛑 browser session closed");
    }
}

// ── Smart wait ───────────────────────────────────────────────────────────────

/// Wait until no new resource entries appear for `quiet_ms` consecutive ms after
/// `document.readyState == "complete"`, or until `timeout_ms` has elapsed.
pub async fn wait_until_stable(page: &Page, quiet_ms: u64, timeout_ms: u64) -> Result<()> {
    let poll_ms = 250u64;
    let start = std::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = std::time::Instant::now();

    loop {
        if start.elapsed().as_millis() as u64 >= timeout_ms {
            info!("wait_until_stable: timeout after {}ms", timeout_ms);
            break;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready_complete: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready_complete || count != last_count {
            last_count = count;
            stable_since = std::time::Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            break;
        }

        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
    }
    Ok(())
}
