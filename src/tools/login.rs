//! Get the page onto an authenticated feed: stored session, credentials, or a human.

use crate::features::antibot::Pacing;
use crate::scraping::page::{ClickMode, PageDriver};
use anyhow::{bail, Context, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const USERNAME_SELECTOR: &str = "#username";
pub const PASSWORD_SELECTOR: &str = "#password";
pub const SUBMIT_SELECTOR: &str = "button[type='submit']";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The stored session was still valid.
    AlreadySignedIn,
    /// A login happened during this call; the session is worth saving.
    SignedIn,
}

#[derive(Debug, Clone, Copy)]
pub struct LoginOptions {
    /// Window for 2FA or a manual login to land on the feed.
    pub feed_wait: Duration,
    pub poll: Duration,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            feed_wait: Duration::from_secs(60),
            poll: Duration::from_secs(1),
        }
    }
}

fn on_login_wall(url: &str) -> bool {
    ["/login", "/uas/login", "/authwall", "/checkpoint"]
        .iter()
        .any(|marker| url.contains(marker))
}

async fn wait_for_feed(page: &dyn PageDriver, opts: &LoginOptions) -> Result<()> {
    let start = Instant::now();
    loop {
        let url = page.current_url().await.unwrap_or_default();
        if url.contains("/feed") {
            return Ok(());
        }
        if start.elapsed() >= opts.feed_wait {
            bail!(
                "login did not reach the feed within {}s (last url: {})",
                opts.feed_wait.as_secs(),
                url
            );
        }
        tokio::time::sleep(opts.poll).await;
    }
}

/// Open the feed and sign in if the platform bounces us to a login page.
///
/// Without credentials the caller gets the same window to log in by hand in the
/// visible browser.
pub async fn ensure_logged_in(
    page: &dyn PageDriver,
    origin: &str,
    credentials: Option<(String, String)>,
    pacing: &Pacing,
    opts: &LoginOptions,
) -> Result<LoginOutcome> {
    let origin = origin.trim_end_matches('/');
    let feed = format!("{}/feed/", origin);
    page.goto(&feed)
        .await
        .with_context(|| format!("opening {}", feed))?;
    pacing.long().await;

    let url = page.current_url().await.unwrap_or_default();
    if !on_login_wall(&url) {
        info!("login: session restored");
        return Ok(LoginOutcome::AlreadySignedIn);
    }

    match credentials {
        Some((email, password)) => {
            let login = format!("{}/login", origin);
            if !url.contains("/login") {
                page.goto(&login)
                    .await
                    .with_context(|| format!("opening {}", login))?;
                pacing.medium().await;
            }
            info!("login: submitting credentials");
            page.fill(USERNAME_SELECTOR, 0, &email)
                .await
                .context("login form has no username field")?;
            pacing.short().await;
            page.fill(PASSWORD_SELECTOR, 0, &password)
                .await
                .context("login form has no password field")?;
            pacing.short().await;
            if !page.click(SUBMIT_SELECTOR, 0, ClickMode::Native).await? {
                bail!("login form has no submit button");
            }
        }
        None => warn!(
            "login: no credentials configured, log in manually within {}s",
            opts.feed_wait.as_secs()
        ),
    }

    wait_for_feed(page, opts).await?;
    info!("login: signed in");
    Ok(LoginOutcome::SignedIn)
}
