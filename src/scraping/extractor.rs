//! Read a job's detail pane into a [`JobRecord`].
//!
//! Every field goes through an ordered selector fallback; the top-card text block is
//! read once and mined for posting age, work mode and location. Nothing here
//! navigates and nothing here fails: misses degrade to `"Unknown"` / empty.

use crate::core::types::{canonical_job_url, JobRecord, WorkMode, UNKNOWN};
use crate::features::antibot::Pacing;
use crate::scraping::page::PageDriver;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const TITLE_SELECTORS: &[&str] = &[
    ".job-details-jobs-unified-top-card__job-title h1",
    "h2.job-details-jobs-unified-top-card__job-title",
    ".job-details-jobs-unified-top-card__job-title",
];

pub const COMPANY_SELECTORS: &[&str] = &[
    ".job-details-jobs-unified-top-card__company-name",
    ".job-card-container__company-name",
];

pub const TOP_CARD_SELECTORS: &[&str] = &[
    ".job-details-jobs-unified-top-card__primary-description-container",
    ".job-details-jobs-unified-top-card__primary-description",
    ".job-details-jobs-unified-top-card",
];

/// Relative to the top card.
pub const DATE_SPAN_SELECTOR: &str = "span.tvm__text--low-emphasis";

pub const DATE_FALLBACK_SELECTORS: &[&str] = &[".tvm__text--low-emphasis", ".posted-time-ago__text"];

pub const INSIGHT_SELECTORS: &[&str] = &[
    ".job-details-fit-level-preferences button",
    ".job-details-jobs-unified-top-card__job-insight",
    ".job-details-jobs-unified-top-card__workplace-type",
    "li.job-details-jobs-unified-top-card__job-insight",
    ".ui-label",
    ".mt2 span",
];

pub const DESCRIPTION_SELECTORS: &[&str] = &[
    ".jobs-description__content",
    "#job-details",
    ".show-more-less-html__markup",
    "article",
    ".description",
];

pub const SHOW_MORE_SELECTOR: &str = "button[aria-label*='Show more']";

pub const DESCRIPTION_MAX_CHARS: usize = 12_000;
pub const REQUIREMENTS_MAX_CHARS: usize = 1_000;
const THIN_DESCRIPTION_CHARS: usize = 100;
const MIN_REQUIREMENTS_MATCH: usize = 50;

// ── Text patterns ────────────────────────────────────────────────────────────

static DATE_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn date_patterns() -> &'static [Regex] {
    DATE_PATTERNS.get_or_init(|| {
        [
            r"(?i)(\d+\s+(?:hour|minute|day|week|month)s?\s+ago)",
            r"(?i)(just\s+now)",
            r"(?i)(hace\s+\d+\s+(?:hora|minuto|día|semana|mes)(?:s|es)?)",
            r"(?i)(recién\s+publicado)",
            r"(?i)(\d+\s*(?:h|d|w|m|y)\s+ago)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid posting-age pattern"))
        .collect()
    })
}

static WORK_MODE_PATTERNS: OnceLock<[(WorkMode, Regex); 3]> = OnceLock::new();

fn work_mode_patterns() -> &'static [(WorkMode, Regex); 3] {
    WORK_MODE_PATTERNS.get_or_init(|| {
        [
            (
                WorkMode::Remote,
                Regex::new(r"(?i)\b(remote|remoto)\b").expect("valid remote pattern"),
            ),
            (
                WorkMode::Hybrid,
                Regex::new(r"(?i)\b(hybrid|híbrido)\b").expect("valid hybrid pattern"),
            ),
            (
                WorkMode::OnSite,
                Regex::new(r"(?i)\b(on-site|presencial)\b").expect("valid on-site pattern"),
            ),
        ]
    })
}

static LOCATION_NOISE: OnceLock<Regex> = OnceLock::new();

fn location_noise() -> &'static Regex {
    LOCATION_NOISE.get_or_init(|| {
        Regex::new(r"(?i)(applicant|solicitud|remote|remoto|hybrid|híbrido|on-?site|presencial|\bago\b|\bhace\b)")
            .expect("valid location noise pattern")
    })
}

static REQUIREMENTS_SECTION: OnceLock<Regex> = OnceLock::new();

fn requirements_section() -> &'static Regex {
    REQUIREMENTS_SECTION.get_or_init(|| {
        Regex::new(
            r"(?is)(?:Requisitos|Requirements|Perfil|Profile|What you need|Who you are|Experiencia|Experience|Qualifications)[\s:]+(.*?)(?:Benefits|Beneficios|Ofrecemos|Offer|About|Sobre|Compensation|What we offer|$)",
        )
        .expect("valid requirements pattern")
    })
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First relative-time phrase in `text` ("3 days ago", "hace 2 semanas", "5d ago").
pub fn parse_posted_age(text: &str) -> Option<String> {
    date_patterns()
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| m.as_str().trim().to_string())
}

pub fn detect_work_mode(text: &str) -> WorkMode {
    work_mode_patterns()
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(mode, _)| *mode)
        .unwrap_or(WorkMode::Unknown)
}

/// First `·`/`•`/`|` segment of the top-card block that is neither the posting age
/// nor applicant/work-mode noise.
pub fn infer_location(block: &str, posted_age: Option<&str>) -> Option<String> {
    let block = flatten(block);
    block
        .split(['·', '•', '|'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter(|segment| match posted_age {
            Some(age) if !age.is_empty() => !age.contains(segment),
            _ => true,
        })
        .find(|segment| !location_noise().is_match(segment))
        .map(str::to_string)
}

/// The requirements section of a description, or its head when no section stands out.
pub fn requirements_excerpt(description: &str) -> String {
    let section = requirements_section()
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| s.chars().count() > MIN_REQUIREMENTS_MATCH);
    truncate_chars(section.unwrap_or(description), REQUIREMENTS_MAX_CHARS)
}

// ── Fallback combinators ─────────────────────────────────────────────────────

/// Selector and index of the first visible match across `selectors`, in order.
pub async fn first_visible_selector(
    page: &dyn PageDriver,
    selectors: &[&'static str],
) -> Option<(&'static str, usize)> {
    for selector in selectors {
        match page.first_visible(selector).await {
            Ok(Some(index)) => return Some((selector, index)),
            Ok(None) => {}
            Err(e) => debug!("extractor: {} unavailable: {}", selector, e),
        }
    }
    None
}

/// Trimmed text of the first visible, non-empty match across `selectors`.
pub async fn first_visible_text(page: &dyn PageDriver, selectors: &[&'static str]) -> Option<String> {
    first_visible_text_at(page, selectors).await.map(|(_, text)| text)
}

/// [`first_visible_text`], also naming the selector that produced it.
async fn first_visible_text_at(
    page: &dyn PageDriver,
    selectors: &[&'static str],
) -> Option<(&'static str, String)> {
    for selector in selectors {
        let index = match page.first_visible(selector).await {
            Ok(Some(index)) => index,
            Ok(None) => continue,
            Err(e) => {
                debug!("extractor: {} unavailable: {}", selector, e);
                continue;
            }
        };
        match page.inner_text(selector, index).await {
            Ok(Some(text)) if !text.trim().is_empty() => return Some((selector, text.trim().to_string())),
            Ok(_) => {}
            Err(e) => debug!("extractor: reading {} failed: {}", selector, e),
        }
    }
    None
}

async fn visible_texts(page: &dyn PageDriver, selector: &str) -> Vec<String> {
    let Ok(visibility) = page.visibility(selector).await else {
        return Vec::new();
    };
    let mut texts = Vec::new();
    for (index, visible) in visibility.into_iter().enumerate() {
        if !visible {
            continue;
        }
        if let Ok(Some(text)) = page.inner_text(selector, index).await {
            texts.push(text.trim().to_string());
        }
    }
    texts
}

// ── Field readers ────────────────────────────────────────────────────────────

async fn read_posted_age(page: &dyn PageDriver, top_card: Option<&str>, block: &str) -> Option<String> {
    if let Some(top_card) = top_card {
        let spans = format!("{} {}", top_card, DATE_SPAN_SELECTOR);
        for span in visible_texts(page, &spans).await {
            if parse_posted_age(&span).is_some() {
                return Some(span);
            }
        }
    }
    if let Some(age) = parse_posted_age(&flatten(block)) {
        return Some(age);
    }
    first_visible_text(page, DATE_FALLBACK_SELECTORS).await
}

async fn read_work_mode(page: &dyn PageDriver, block: &str) -> WorkMode {
    let mode = detect_work_mode(block);
    if mode != WorkMode::Unknown {
        return mode;
    }
    for selector in INSIGHT_SELECTORS {
        for text in visible_texts(page, selector).await {
            let mode = detect_work_mode(&text);
            if mode != WorkMode::Unknown {
                return mode;
            }
        }
    }
    WorkMode::Unknown
}

async fn read_description(page: &dyn PageDriver, pacing: &Pacing) -> String {
    let Some((selector, index)) = first_visible_selector(page, DESCRIPTION_SELECTORS).await else {
        return String::new();
    };
    match page.click_within(selector, index, SHOW_MORE_SELECTOR).await {
        Ok(true) => pacing.short().await,
        Ok(false) => {}
        Err(e) => debug!("extractor: show-more click failed: {}", e),
    }
    match page.inner_text(selector, index).await {
        Ok(Some(text)) => truncate_chars(text.trim(), DESCRIPTION_MAX_CHARS),
        Ok(None) => String::new(),
        Err(e) => {
            debug!("extractor: reading description failed: {}", e);
            String::new()
        }
    }
}

/// Read the currently rendered job detail pane.
pub async fn extract(page: &dyn PageDriver, pacing: &Pacing) -> JobRecord {
    let url = page
        .current_url()
        .await
        .map(|u| canonical_job_url(&u))
        .unwrap_or_else(|_| UNKNOWN.to_string());
    let mut record = JobRecord::unknown(url);

    if let Some(title) = first_visible_text(page, TITLE_SELECTORS).await {
        record.title = title;
    }
    if let Some(company) = first_visible_text(page, COMPANY_SELECTORS).await {
        record.company = company;
    }

    let (top_card, block) = match first_visible_text_at(page, TOP_CARD_SELECTORS).await {
        Some((selector, block)) => (Some(selector), block),
        None => (None, String::new()),
    };
    let posted_age = read_posted_age(page, top_card, &block).await;
    record.work_mode = read_work_mode(page, &block).await;
    if let Some(location) = infer_location(&block, posted_age.as_deref()) {
        record.location = location;
    }
    if let Some(age) = posted_age {
        record.posted_age = age;
    }

    record.description = read_description(page, pacing).await;
    if record.description.chars().count() < THIN_DESCRIPTION_CHARS {
        warn!(
            "extractor: thin description ({} chars) for {}",
            record.description.chars().count(),
            record.url
        );
    }
    record.requirements_excerpt = requirements_excerpt(&record.description);
    record
}

/// Skim a freshly opened posting: a few uneven window scrolls, ~2000px in total.
pub async fn skim(page: &dyn PageDriver, pacing: &Pacing) {
    for _ in 0..4 {
        if let Err(e) = page.scroll_list(None).await {
            debug!("extractor: skim scroll failed: {}", e);
            return;
        }
        pacing.scroll_step().await;
    }
}
