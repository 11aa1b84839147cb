//! The role × location sweep: search, scan, score, keep the matches, write the report.

use crate::brain::{score_input, ScoringBackend};
use crate::core::report::{report_path, report_stamp, write_rows, ReportKind, ReportRow};
use crate::core::run_state::{Monitor, RunStatus};
use crate::core::stop_signal::StopSignal;
use crate::core::types::{JobRecord, MatchSummary, PLATFORM_ORIGIN, UNKNOWN};
use crate::features::antibot::Pacing;
use crate::scraping::page::PageDriver;
use crate::scraping::scan::{scan, ScanHandler, ScanOptions};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Value of the report's `Source` column.
pub const SOURCE: &str = "linkedin";

/// Listing URL for one search. `window` is the platform's `f_TPR` value, e.g. `r86400`.
pub fn search_url(origin: &str, keywords: &str, location: &str, window: &str) -> Result<String> {
    let base = format!("{}/jobs/search/", origin.trim_end_matches('/'));
    let url = url::Url::parse_with_params(
        &base,
        &[("keywords", keywords), ("location", location), ("f_TPR", window)],
    )
    .with_context(|| format!("bad platform origin {}", origin))?;
    Ok(url.to_string())
}

/// `"Bogotá (Hybrid)"` → `"Bogotá"`.
pub fn strip_location_suffix(location: &str) -> String {
    location
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub job_limit: usize,
    pub match_threshold: u8,
    pub short_window: String,
    pub wide_window: String,
    pub origin: String,
    pub reports_dir: PathBuf,
    pub scan: ScanOptions,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            job_limit: 5,
            match_threshold: 30,
            short_window: "r86400".to_string(),
            wide_window: "r604800".to_string(),
            origin: PLATFORM_ORIGIN.to_string(),
            reports_dir: PathBuf::from("reports"),
            scan: ScanOptions {
                list_wait: Duration::from_secs(10),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSummary {
    pub combinations_run: usize,
    pub matches: usize,
    pub cancelled: bool,
    pub final_report: Option<PathBuf>,
}

/// Scan handler that scores every posting and keeps the ones above the threshold.
struct JobCollector<'a> {
    brain: &'a dyn ScoringBackend,
    monitor: &'a mut Monitor,
    stop: &'a dyn StopSignal,
    matches: &'a mut Vec<ReportRow>,
    role: &'a str,
    threshold: u8,
    stop_requested: bool,
}

#[async_trait]
impl ScanHandler for JobCollector<'_> {
    async fn on_job(&mut self, record: JobRecord, url: &str) -> bool {
        if self.stop.consume() {
            self.monitor.log("🛑 Stop requested, leaving the current search");
            self.stop_requested = true;
            return false;
        }

        self.monitor.update(|s| s.current_job_index += 1);
        let (index, total) = (
            self.monitor.state().current_job_index,
            self.monitor.state().jobs_in_current_batch,
        );
        self.monitor
            .log(format!("Analyzing job {}/{}: {}", index, total, url));

        if record.description.is_empty() {
            self.monitor.log("⚠️ Could not extract a description");
            return true;
        }
        let Some(analysis) = self
            .brain
            .score(&score_input(&record.posted_age, &record.description))
            .await
        else {
            self.monitor.log("❌ Scoring failed, skipping");
            return true;
        };

        if analysis.match_percentage >= self.threshold {
            let role = if record.title == UNKNOWN {
                self.role
            } else {
                record.title.as_str()
            };
            let row = ReportRow::from_match(&record, role, &analysis, SOURCE);
            self.monitor.add_match(MatchSummary::from_record(
                &record,
                role,
                analysis.match_percentage,
            ));
            self.monitor.log(format!(
                "✅ Match: {}% ({})",
                analysis.match_percentage, record.company
            ));
            self.matches.push(row);
        } else {
            self.monitor.log(format!(
                "Skipped {} ({}% < {}%)",
                record.company, analysis.match_percentage, self.threshold
            ));
        }
        true
    }
}

#[allow(clippy::too_many_arguments)]
async fn search_pair(
    page: &dyn PageDriver,
    brain: &dyn ScoringBackend,
    monitor: &mut Monitor,
    stop: &dyn StopSignal,
    matches: &mut Vec<ReportRow>,
    role: &str,
    location: &str,
    settings: &SweepSettings,
    pacing: &Pacing,
) -> Result<bool> {
    for (attempt, window) in [&settings.short_window, &settings.wide_window].into_iter().enumerate() {
        if attempt > 0 {
            monitor.log(format!("No results in the short window, widening to {}", window));
        }
        let url = search_url(&settings.origin, role, location, window)?;
        page.goto(&url)
            .await
            .with_context(|| format!("opening search {}", url))?;
        pacing.long().await;

        let mut collector = JobCollector {
            brain,
            monitor: &mut *monitor,
            stop,
            matches: &mut *matches,
            role,
            threshold: settings.match_threshold,
            stop_requested: false,
        };
        let processed = scan(page, pacing, &settings.scan, settings.job_limit, &mut collector).await;
        if collector.stop_requested {
            return Ok(true);
        }
        if processed > 0 {
            break;
        }
    }
    Ok(false)
}

/// Sweep every role × location pair in order.
///
/// The stop signal is honored before each pair and between postings; either way
/// the partial results still become the final report and the status ends `Stopped`.
#[allow(clippy::too_many_arguments)]
pub async fn run_sweep(
    page: &dyn PageDriver,
    brain: &dyn ScoringBackend,
    monitor: &mut Monitor,
    stop: &dyn StopSignal,
    roles: &[String],
    locations: &[String],
    settings: &SweepSettings,
    pacing: &Pacing,
) -> Result<SweepSummary> {
    let total = roles.len() * locations.len();
    monitor.update(|s| {
        s.total_combinations = total;
        s.status = RunStatus::Running;
    });
    monitor.log(format!("Loaded {} search combinations", total));

    let stamp = report_stamp();
    let running = report_path(&settings.reports_dir, ReportKind::Running, &stamp);
    let final_path = report_path(&settings.reports_dir, ReportKind::Final, &stamp);
    monitor.log(format!("Report: {}", running.display()));

    let mut matches: Vec<ReportRow> = Vec::new();
    let mut combinations_run = 0;
    let mut cancelled = false;

    'sweep: for role in roles {
        for raw_location in locations {
            if stop.consume() {
                monitor.log("🛑 Stop signal received, ending the sweep");
                cancelled = true;
                break 'sweep;
            }
            let location = strip_location_suffix(raw_location);
            combinations_run += 1;
            monitor.update(|s| {
                s.current_combination_index = combinations_run;
                s.current_role = role.clone();
                s.current_location = location.clone();
                s.current_job_index = 0;
                s.jobs_in_current_batch = settings.job_limit;
            });
            monitor.log(format!(
                "🔎 Searching \"{}\" in {} ({}/{})",
                role, location, combinations_run, total
            ));

            let outcome = search_pair(
                page,
                brain,
                monitor,
                stop,
                &mut matches,
                role,
                &location,
                settings,
                pacing,
            )
            .await;
            match outcome {
                Ok(stop_requested) => cancelled = stop_requested,
                Err(e) => monitor.log(format!("⚠️ {} / {} failed: {:#}", role, location, e)),
            }

            if !matches.is_empty() {
                if let Err(e) = write_rows(&running, &matches) {
                    warn!("sweep: partial report {} not written: {}", running.display(), e);
                }
            }
            if cancelled {
                break 'sweep;
            }
        }
    }

    let mut final_report = None;
    if !matches.is_empty() {
        match write_rows(&final_path, &matches) {
            Ok(()) => {
                monitor.log(format!("📄 Final report: {}", final_path.display()));
                final_report = Some(final_path);
            }
            Err(e) => monitor.log(format!("❌ Final report not written: {}", e)),
        }
    }
    if running.exists() {
        if let Err(e) = std::fs::remove_file(&running) {
            warn!("sweep: could not remove {}: {}", running.display(), e);
        }
    }

    monitor.update(|s| s.status = RunStatus::Stopped);
    monitor.log(format!(
        "Sweep {} with {} matches",
        if cancelled { "cancelled" } else { "finished" },
        matches.len()
    ));

    Ok(SweepSummary {
        combinations_run,
        matches: matches.len(),
        cancelled,
        final_report,
    })
}
