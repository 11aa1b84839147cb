//! Walk the search results list card by card, handing each extracted posting to a handler.

use crate::core::types::{canonical_job_url, JobRecord, UNKNOWN};
use crate::features::antibot::Pacing;
use crate::scraping::extractor::extract;
use crate::scraping::page::{ClickMode, PageDriver, PageError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const LIST_PRIMARY: &str = ".jobs-search-results-list";
pub const LIST_FALLBACKS: &[&str] = &["ul.scaffold-layout__list-container", ".jobs-search__results-list"];
pub const GENERIC_CARD: &str = ".job-card-container";
pub const CARD_LINK: &str = "a.job-card-container__link";
pub const CARD_CLICKABLE: &str = "div.job-card-container";

/// Receives every scanned posting. Returning `false` stops the scan.
#[async_trait]
pub trait ScanHandler: Send {
    async fn on_job(&mut self, record: JobRecord, url: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// How long to wait for the primary list container to show up.
    pub list_wait: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            list_wait: Duration::from_secs(5),
        }
    }
}

async fn locate_list(page: &dyn PageDriver, opts: &ScanOptions) -> Option<&'static str> {
    match page.wait_visible(LIST_PRIMARY, opts.list_wait).await {
        Ok(true) => return Some(LIST_PRIMARY),
        Ok(false) => {}
        Err(e) => debug!("scan: waiting for {} failed: {}", LIST_PRIMARY, e),
    }
    for selector in LIST_FALLBACKS {
        if let Ok(true) = page.any_visible(selector).await {
            return Some(selector);
        }
    }
    None
}

async fn open_card(
    page: &dyn PageDriver,
    pacing: &Pacing,
    cards: &str,
    index: usize,
) -> Result<(JobRecord, String), PageError> {
    page.scroll_into_view(cards, index).await?;
    let url = page
        .attribute_within(cards, index, CARD_LINK, "href")
        .await?
        .map(|href| canonical_job_url(&href))
        .unwrap_or_else(|| UNKNOWN.to_string());

    if !page.click_within(cards, index, CARD_CLICKABLE).await? && !page.click(cards, index, ClickMode::Native).await? {
        return Err(PageError::Element(format!("card {} is gone", index)));
    }
    pacing.medium().await;

    let mut record = extract(page, pacing).await;
    // The detail pane's URL is the search page, never the posting.
    record.url = url.clone();
    Ok((record, url))
}

/// Scan until the handler has accepted `limit` cards or the list runs out.
/// Cards that fail to open do not count. Returns how many the handler accepted.
pub async fn scan(
    page: &dyn PageDriver,
    pacing: &Pacing,
    opts: &ScanOptions,
    limit: usize,
    handler: &mut dyn ScanHandler,
) -> usize {
    let list = locate_list(page, opts).await;
    let cards = match list {
        Some(list) => format!("{} li", list),
        None => {
            warn!("scan: no results list found, falling back to {}", GENERIC_CARD);
            GENERIC_CARD.to_string()
        }
    };

    let mut processed = 0;
    let mut index = 0;
    while processed < limit {
        let mut available = page.count(&cards).await.unwrap_or(0);
        if index >= available {
            if let Err(e) = page.scroll_list(list).await {
                debug!("scan: load-more scroll failed: {}", e);
            }
            pacing.medium().await;
            available = page.count(&cards).await.unwrap_or(0);
            if index >= available {
                info!("scan: list exhausted after {} cards", available);
                break;
            }
        }

        match open_card(page, pacing, &cards, index).await {
            Ok((record, url)) => {
                if !handler.on_job(record, &url).await {
                    info!("scan: stopped by handler at card {}", index + 1);
                    break;
                }
                processed += 1;
            }
            Err(e) => warn!("scan: card {} skipped: {}", index + 1, e),
        }
        index += 1;
    }
    processed
}
