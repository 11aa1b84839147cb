//! Auto-apply batch: walk the latest report and run the Easy Apply flow per row.

use crate::brain::ScoringBackend;
use crate::core::config::ProfileConfig;
use crate::core::report::{latest_report, Report, ReportRow};
use crate::core::run_state::{Monitor, RunStatus};
use crate::core::stop_signal::StopSignal;
use crate::core::types::{FlowOutcome, JobContext};
use crate::features::antibot::Pacing;
use crate::nlp::{detect_language, resume_filename};
use crate::scraping::extractor::skim;
use crate::scraping::page::PageDriver;
use crate::scraping::prober::{probe, Goal};
use crate::tools::apply_flow::{run_flow, FlowOptions, ProfileAnswerer, MODAL_SELECTOR};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const BUTTON_NOT_FOUND: &str = "Button Not Found";

#[derive(Debug, Clone)]
pub struct ApplySettings {
    pub reports_dir: PathBuf,
    /// Host suffix a row's URL must carry to be attempted.
    pub platform_host: String,
    /// How long the Easy Apply modal gets to appear after the primary button.
    pub modal_wait: Duration,
    pub flow: FlowOptions,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("reports"),
            platform_host: "linkedin.com".to_string(),
            modal_wait: Duration::from_secs(5),
            flow: FlowOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplySummary {
    pub report: PathBuf,
    pub attempted: usize,
    pub submitted: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

fn on_platform(url: &str, host_suffix: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .map(|host| host == host_suffix || host.ends_with(&format!(".{}", host_suffix)))
        .unwrap_or(false)
}

/// Resume, salary and language for one row, decided before the modal opens.
pub fn job_context(row: &ReportRow, profile: &ProfileConfig) -> JobContext {
    let language = detect_language(&format!("{} {}", row.role, row.requirements));
    JobContext {
        role: row.role.clone(),
        description: row.requirements.clone(),
        target_resume_filename: resume_filename(&profile.resume_rules, &row.role, &row.requirements, language),
        salary_expectation: Some(profile.salary_expectations.for_role(&row.role, language)),
        language,
    }
}

async fn apply_to_row(
    page: &dyn PageDriver,
    brain: Option<&dyn ScoringBackend>,
    profile: &ProfileConfig,
    row: &ReportRow,
    settings: &ApplySettings,
    pacing: &Pacing,
) -> String {
    if let Err(e) = page.goto(row.url.trim()).await {
        return FlowOutcome::Error(e.to_string()).status_label();
    }
    pacing.long().await;
    skim(page, pacing).await;

    if !probe(page, Goal::PrimaryCta).await.acted() {
        return BUTTON_NOT_FOUND.to_string();
    }
    pacing.medium().await;

    match page.wait_visible(MODAL_SELECTOR, settings.modal_wait).await {
        Ok(true) => {}
        Ok(false) => return "Flow: modal did not open".to_string(),
        Err(e) => return format!("Flow: {}", e),
    }

    let ctx = job_context(row, profile);
    debug!(
        "apply: {} resume={:?} lang={}",
        row.role, ctx.target_resume_filename, ctx.language
    );
    let answerer = ProfileAnswerer::new(&ctx, brain);
    let summary = run_flow(page, &ctx, &answerer, pacing, &settings.flow).await;
    summary.outcome.status_label()
}

/// Apply to every platform row of the newest report in `settings.reports_dir`.
pub async fn run_apply_batch(
    page: &dyn PageDriver,
    brain: Option<&dyn ScoringBackend>,
    profile: &ProfileConfig,
    monitor: &mut Monitor,
    stop: &dyn StopSignal,
    settings: &ApplySettings,
    pacing: &Pacing,
) -> Result<ApplySummary> {
    let path = latest_report(&settings.reports_dir).context("no report to apply from")?;
    run_apply_report(page, brain, profile, monitor, stop, &path, settings, pacing).await
}

#[allow(clippy::too_many_arguments)]
pub async fn run_apply_report(
    page: &dyn PageDriver,
    brain: Option<&dyn ScoringBackend>,
    profile: &ProfileConfig,
    monitor: &mut Monitor,
    stop: &dyn StopSignal,
    path: &Path,
    settings: &ApplySettings,
    pacing: &Pacing,
) -> Result<ApplySummary> {
    let mut report = Report::load(path).with_context(|| format!("reading {}", path.display()))?;
    let total = report.rows.len();
    monitor.update(|s| {
        s.status = RunStatus::Running;
        s.total_combinations = 1;
        s.current_combination_index = 1;
        s.current_role = "Auto-apply".to_string();
        s.current_location = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        s.jobs_in_current_batch = total;
        s.current_job_index = 0;
    });
    monitor.log(format!("📋 Applying from {} ({} rows)", path.display(), total));

    let mut summary = ApplySummary {
        report: path.to_path_buf(),
        ..Default::default()
    };

    for index in 0..total {
        if stop.consume() {
            monitor.log("🛑 Stop signal received, ending the batch");
            summary.cancelled = true;
            break;
        }
        let row = report.rows[index].clone();
        monitor.update(|s| s.current_job_index = index + 1);

        if !on_platform(row.url.trim(), &settings.platform_host) {
            debug!("apply: row {} has no platform URL ({:?})", index + 1, row.url);
            summary.skipped += 1;
            continue;
        }

        monitor.log(format!(
            "🚀 Applying {}/{}: {} at {}",
            index + 1,
            total,
            row.role,
            row.company
        ));
        let status = apply_to_row(page, brain, profile, &row, settings, pacing).await;
        summary.attempted += 1;
        if status == FlowOutcome::Submitted.status_label() {
            summary.submitted += 1;
        }
        monitor.log(format!("{} → {}", row.company, status));

        report.rows[index].application_status = Some(status);
        if let Err(e) = report.save() {
            warn!("apply: saving {} failed: {}", path.display(), e);
        }
    }

    monitor.update(|s| s.status = RunStatus::Stopped);
    monitor.log(format!(
        "Batch done: {} attempted, {} submitted",
        summary.attempted, summary.submitted
    ));
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Language;

    #[test]
    fn platform_host_check() {
        assert!(on_platform("https://www.linkedin.com/jobs/view/1/", "linkedin.com"));
        assert!(on_platform("https://linkedin.com/jobs/view/1/", "linkedin.com"));
        assert!(!on_platform("https://evil-linkedin.com/jobs/view/1/", "linkedin.com"));
        assert!(!on_platform("https://jobs.example.com/?ref=linkedin.com", "linkedin.com"));
        assert!(!on_platform("Unknown", "linkedin.com"));
    }

    #[test]
    fn context_follows_profile_rules() {
        let profile = ProfileConfig::parse(
            r#"{
                "resume_rules": [
                    {"file": "cv_rust_es.pdf", "language": "es", "keywords": ["rust"]},
                    {"file": "cv_general_en.pdf"}
                ],
                "salary_expectations": {"default": {"value": "9000000"},
                    "rules": [{"role_match": "ingeniero", "value": "14000000"}]}
            }"#,
        )
        .unwrap();
        let row = ReportRow {
            role: "Ingeniero Rust".into(),
            requirements: "Requisitos: 5 años de experiencia".into(),
            ..Default::default()
        };
        let ctx = job_context(&row, &profile);
        assert_eq!(ctx.language, Language::Es);
        assert_eq!(ctx.target_resume_filename.as_deref(), Some("cv_rust_es.pdf"));
        assert_eq!(ctx.salary_expectation.as_deref(), Some("14000000"));
    }
}
