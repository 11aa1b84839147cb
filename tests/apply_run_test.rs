/// Auto-apply batch over a report, with every posting served by a scripted page.
use jobscout::apply_flow::MODAL_SELECTOR;
use jobscout::apply_run::{run_apply_batch, ApplySettings, BUTTON_NOT_FOUND};
use jobscout::config::ProfileConfig;
use jobscout::core::run_state::{MemoryStatusStore, Monitor, RunStatus, StatusStore};
use jobscout::core::stop_signal::{StopSignal, StopToken};
use jobscout::features::antibot::Pacing;
use jobscout::report::{report_path, write_rows, Report, ReportKind, ReportRow};
use jobscout::scraping::page::testing::{Effect, FakeElement, ScriptedPage};
use std::sync::Arc;
use std::time::Duration;

const APPLY_BUTTON: &str = "button.jobs-apply-button";
const SUBMIT_BUTTON: &str = ".jobs-easy-apply-modal button.submit";

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn row(company: &str, url: &str) -> ReportRow {
    ReportRow {
        priority: 4,
        match_percentage: 70,
        company: company.to_string(),
        role: "Rust Engineer".to_string(),
        location: "Bogotá".to_string(),
        work_mode: "Remote".to_string(),
        date: "2 days ago".to_string(),
        source: "linkedin".to_string(),
        url: url.to_string(),
        requirements: "Requirements: Rust, Tokio".to_string(),
        application_status: None,
    }
}

fn settings(dir: &std::path::Path) -> ApplySettings {
    ApplySettings {
        reports_dir: dir.to_path_buf(),
        modal_wait: Duration::ZERO,
        ..ApplySettings::default()
    }
}

/// Easy Apply button that opens a one-step modal whose Submit closes everything.
fn easy_apply() -> Vec<Effect> {
    let submit = FakeElement::button("Submit application").on_click(Effect::Remove(MODAL_SELECTOR.into()));
    vec![Effect::Set(
        APPLY_BUTTON.into(),
        vec![FakeElement::button("Easy Apply")
            .on_click(Effect::Set(MODAL_SELECTOR.into(), vec![FakeElement::text("Acme application")]))
            .on_click(Effect::Set(SUBMIT_BUTTON.into(), vec![submit]))
            .on_click(Effect::Remove(APPLY_BUTTON.into()))],
    )]
}

#[tokio::test]
async fn batch_records_an_outcome_per_row() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = report_path(dir.path(), ReportKind::Final, "01_02_2026_10_00");
    write_rows(
        &path,
        &[
            row("Acme", "https://www.linkedin.com/jobs/view/101/"),
            row("Globex", "https://careers.globex.example/jobs/7"),
            row("Initech", "https://www.linkedin.com/jobs/view/303/"),
            row("Hooli", "https://www.linkedin.com/jobs/view/404/"),
            row("Umbrella", "https://www.linkedin.com/jobs/view/505/"),
        ],
    )
    .unwrap();

    let page = ScriptedPage::new()
        .route("https://www.linkedin.com/jobs/view/101/", easy_apply())
        .route(
            "https://www.linkedin.com/jobs/view/303/",
            vec![Effect::Remove(SUBMIT_BUTTON.into())],
        )
        .fail_goto("https://www.linkedin.com/jobs/view/404/")
        .route(
            "https://www.linkedin.com/jobs/view/505/",
            vec![Effect::Set(
                APPLY_BUTTON.into(),
                vec![FakeElement::button("Apply on company website")],
            )],
        );
    let store = Arc::new(MemoryStatusStore::new());
    let mut monitor = Monitor::new(store.clone());

    let summary = run_apply_batch(
        &page,
        None,
        &ProfileConfig::default(),
        &mut monitor,
        &StopToken::new(),
        &settings(dir.path()),
        &Pacing::instant(),
    )
    .await
    .unwrap();

    assert_eq!(summary.report, path);
    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.submitted, 1);
    assert_eq!(summary.skipped, 1);
    assert!(!summary.cancelled);

    let report = Report::load(&path).unwrap();
    let statuses: Vec<Option<String>> = report
        .rows
        .iter()
        .map(|r| r.application_status.clone())
        .collect();
    assert_eq!(statuses[0].as_deref(), Some("Applied (Success)"));
    assert_eq!(statuses[1], None);
    assert_eq!(statuses[2].as_deref(), Some(BUTTON_NOT_FOUND));
    assert!(statuses[3].as_deref().unwrap_or_default().starts_with("Error:"));
    assert_eq!(statuses[4].as_deref(), Some("Flow: modal did not open"));

    assert_eq!(
        page.clicks(),
        vec![
            "Easy Apply".to_string(),
            "Submit application".to_string(),
            "Apply on company website".to_string(),
        ]
    );
    assert_eq!(store.load().unwrap().unwrap().status, RunStatus::Stopped);
}

#[tokio::test]
async fn stop_signal_ends_the_batch_before_any_row() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = report_path(dir.path(), ReportKind::Final, "01_02_2026_10_00");
    write_rows(&path, &[row("Acme", "https://www.linkedin.com/jobs/view/101/")]).unwrap();

    let page = ScriptedPage::new().route("https://www.linkedin.com/jobs/view/101/", easy_apply());
    let stop = StopToken::new();
    stop.request();
    let mut monitor = Monitor::new(Arc::new(MemoryStatusStore::new()));

    let summary = run_apply_batch(
        &page,
        None,
        &ProfileConfig::default(),
        &mut monitor,
        &stop,
        &settings(dir.path()),
        &Pacing::instant(),
    )
    .await
    .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.attempted, 0);
    assert!(page.visits().is_empty());
    assert!(!stop.is_requested());
    assert_eq!(Report::load(&path).unwrap().rows[0].application_status, None);
}

#[tokio::test]
async fn missing_report_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let page = ScriptedPage::new();
    let mut monitor = Monitor::new(Arc::new(MemoryStatusStore::new()));

    let result = run_apply_batch(
        &page,
        None,
        &ProfileConfig::default(),
        &mut monitor,
        &StopToken::new(),
        &settings(dir.path()),
        &Pacing::instant(),
    )
    .await;

    assert!(result.is_err());
}
