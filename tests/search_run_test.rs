/// Role × location sweep against a scripted results page.
use async_trait::async_trait;
use jobscout::brain::ScoringBackend;
use jobscout::core::report::Report;
use jobscout::core::run_state::{MemoryStatusStore, Monitor, RunStatus, StatusStore};
use jobscout::core::stop_signal::{FileStopSignal, StopSignal, StopToken};
use jobscout::features::antibot::Pacing;
use jobscout::scan::{CARD_CLICKABLE, CARD_LINK, LIST_PRIMARY};
use jobscout::scraping::page::testing::{Effect, FakeElement, ScriptedPage};
use jobscout::search_run::{run_sweep, search_url, SweepSettings};
use jobscout::types::JobAnalysis;
use std::sync::Arc;
use std::time::Duration;

const CARDS: &str = ".jobs-search-results-list li";
const TITLE: &str = ".job-details-jobs-unified-top-card__job-title h1";
const COMPANY: &str = ".job-details-jobs-unified-top-card__company-name";
const DESCRIPTION: &str = ".jobs-description__content";

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

/// Scores postings that mention Rust at 85%, everything else at 10%.
struct KeywordBrain;

#[async_trait]
impl ScoringBackend for KeywordBrain {
    async fn score(&self, job_text: &str) -> Option<JobAnalysis> {
        let rust = job_text.to_lowercase().contains("rust");
        Some(JobAnalysis {
            match_percentage: if rust { 85 } else { 10 },
            priority_score: if rust { 5 } else { 1 },
            analysis: "scripted".to_string(),
        })
    }

    async fn answer(&self, _question: &str, _options: Option<&[String]>) -> Option<String> {
        None
    }
}

fn card(id: u32, title: &str, company: &str, description: &str) -> FakeElement {
    let detail = FakeElement::text(title)
        .on_click(Effect::Set(TITLE.into(), vec![FakeElement::text(title)]))
        .on_click(Effect::Set(COMPANY.into(), vec![FakeElement::text(company)]))
        .on_click(Effect::Set(DESCRIPTION.into(), vec![FakeElement::text(description)]));
    FakeElement::text(format!("{} at {}", title, company))
        .with_child(
            CARD_LINK,
            FakeElement::text("").with_attr("href", format!("/jobs/view/{}/?refId=abc", id)),
        )
        .with_child(CARD_CLICKABLE, detail)
}

fn results(cards: Vec<FakeElement>) -> Vec<Effect> {
    vec![
        Effect::Set(LIST_PRIMARY.into(), vec![FakeElement::text("")]),
        Effect::Set(CARDS.into(), cards),
    ]
}

fn settings(reports_dir: &std::path::Path) -> SweepSettings {
    let mut settings = SweepSettings {
        reports_dir: reports_dir.to_path_buf(),
        ..SweepSettings::default()
    };
    settings.scan.list_wait = Duration::ZERO;
    settings
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn report_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn stop_before_first_combination_skips_everything() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let stop = FileStopSignal::new(dir.path().join("stop.signal"));
    stop.request();
    assert!(stop.path().exists());

    let page = ScriptedPage::new();
    let store = Arc::new(MemoryStatusStore::new());
    let mut monitor = Monitor::new(store.clone());

    let summary = run_sweep(
        &page,
        &KeywordBrain,
        &mut monitor,
        &stop,
        &strings(&["Rust Engineer", "Tech Lead"]),
        &strings(&["Bogotá (Hybrid)", "Remote"]),
        &settings(&dir.path().join("reports")),
        &Pacing::instant(),
    )
    .await
    .unwrap();

    assert_eq!(summary.combinations_run, 0);
    assert!(summary.cancelled);
    assert!(summary.final_report.is_none());
    assert!(page.visits().is_empty());
    assert!(!stop.path().exists());
    let persisted = store.load().unwrap().unwrap();
    assert_eq!(persisted.status, RunStatus::Stopped);
    assert_eq!(persisted.total_combinations, 4);
}

#[tokio::test]
async fn sweep_keeps_matches_and_writes_the_final_report() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let reports = dir.path().join("reports");
    let short = search_url("https://www.linkedin.com", "Rust Engineer", "Bogotá", "r86400").unwrap();

    let page = ScriptedPage::new()
        .route(
            &short,
            results(vec![
                card(
                    1,
                    "Senior Rust Engineer",
                    "Acme",
                    "We build Rust services. Requirements: 5 years of Rust and Tokio.",
                ),
                card(2, "PHP Developer", "Globex", "Laravel and WordPress maintenance."),
            ]),
        );
    let store = Arc::new(MemoryStatusStore::new());
    let mut monitor = Monitor::new(store.clone());

    let summary = run_sweep(
        &page,
        &KeywordBrain,
        &mut monitor,
        &StopToken::new(),
        &strings(&["Rust Engineer"]),
        &strings(&["Bogotá (Hybrid)"]),
        &settings(&reports),
        &Pacing::instant(),
    )
    .await
    .unwrap();

    assert_eq!(summary.combinations_run, 1);
    assert!(!summary.cancelled);
    assert_eq!(summary.matches, 1);
    assert_eq!(page.visits(), vec![short]);

    let final_path = summary.final_report.expect("final report written");
    let files = report_files(&reports);
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("report_FINAL_"));

    let report = Report::load(&final_path).unwrap();
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].company, "Acme");
    assert_eq!(report.rows[0].url, "https://www.linkedin.com/jobs/view/1/");
    assert_eq!(report.rows[0].match_percentage, 85);
    assert_eq!(report.rows[0].source, "linkedin");

    let persisted = store.load().unwrap().unwrap();
    assert_eq!(persisted.status, RunStatus::Stopped);
    assert_eq!(persisted.total_matches, 1);
    assert_eq!(persisted.recent_matches[0].role, "Senior Rust Engineer");
    assert_eq!(persisted.current_location, "Bogotá");
}

#[tokio::test]
async fn empty_short_window_widens_once() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let short = search_url("https://www.linkedin.com", "Tech Lead", "Remote", "r86400").unwrap();
    let wide = search_url("https://www.linkedin.com", "Tech Lead", "Remote", "r604800").unwrap();

    let page = ScriptedPage::new().route(
        &wide,
        results(vec![card(7, "Tech Lead", "Initech", "")]),
    );
    let mut monitor = Monitor::new(Arc::new(MemoryStatusStore::new()));

    let summary = run_sweep(
        &page,
        &KeywordBrain,
        &mut monitor,
        &StopToken::new(),
        &strings(&["Tech Lead"]),
        &strings(&["Remote"]),
        &settings(dir.path()),
        &Pacing::instant(),
    )
    .await
    .unwrap();

    assert_eq!(page.visits(), vec![short, wide]);
    // No description on the page: the posting is processed but never scored.
    assert_eq!(summary.matches, 0);
    assert!(summary.final_report.is_none());
    assert!(report_files(dir.path()).is_empty());
}

#[tokio::test]
async fn stop_between_postings_still_writes_partial_results() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let short = search_url("https://www.linkedin.com", "Rust Engineer", "Bogotá", "r86400").unwrap();
    let stop = StopToken::new();
    let page = ScriptedPage::new().route(
        &short,
        results(vec![
            card(1, "Rust Engineer", "Acme", "Rust all day, every day."),
            card(2, "Rust Engineer", "Hooli", "Rust and more Rust."),
        ]),
    );
    let mut monitor = Monitor::new(Arc::new(MemoryStatusStore::new()));

    /// Raises the stop signal while the first posting is being scored.
    struct StopWhileScoring<'a> {
        stop: &'a StopToken,
    }

    #[async_trait]
    impl ScoringBackend for StopWhileScoring<'_> {
        async fn score(&self, job_text: &str) -> Option<JobAnalysis> {
            self.stop.request();
            KeywordBrain.score(job_text).await
        }

        async fn answer(&self, _question: &str, _options: Option<&[String]>) -> Option<String> {
            None
        }
    }

    let brain = StopWhileScoring { stop: &stop };
    let summary = run_sweep(
        &page,
        &brain,
        &mut monitor,
        &stop,
        &strings(&["Rust Engineer"]),
        &strings(&["Bogotá", "Medellín"]),
        &settings(dir.path()),
        &Pacing::instant(),
    )
    .await
    .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.combinations_run, 1);
    assert_eq!(summary.matches, 1);
    assert!(!stop.is_requested());
    let files = report_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("report_FINAL_"));
}

#[tokio::test]
async fn untitled_posting_is_filed_under_the_searched_role() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let short = search_url("https://www.linkedin.com", "Rust Engineer", "Lima", "r86400").unwrap();
    let untitled = FakeElement::text("Acme")
        .with_child(
            CARD_LINK,
            FakeElement::text("").with_attr("href", "/jobs/view/11/"),
        )
        .with_child(
            CARD_CLICKABLE,
            FakeElement::text("Acme")
                .on_click(Effect::Set(COMPANY.into(), vec![FakeElement::text("Acme")]))
                .on_click(Effect::Set(
                    DESCRIPTION.into(),
                    vec![FakeElement::text("Rust services, all the way down.")],
                )),
        );
    let page = ScriptedPage::new().route(&short, results(vec![untitled]));
    let store = Arc::new(MemoryStatusStore::new());
    let mut monitor = Monitor::new(store.clone());

    let summary = run_sweep(
        &page,
        &KeywordBrain,
        &mut monitor,
        &StopToken::new(),
        &strings(&["Rust Engineer"]),
        &strings(&["Lima"]),
        &settings(dir.path()),
        &Pacing::instant(),
    )
    .await
    .unwrap();

    let path = summary.final_report.expect("final report written");
    let mut reader = csv::Reader::from_path(&path).unwrap();
    let role_column = reader
        .headers()
        .unwrap()
        .iter()
        .position(|h| h == "Role")
        .expect("Role column");
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][role_column], "Rust Engineer");
    assert_eq!(
        store.load().unwrap().unwrap().recent_matches[0].role,
        "Rust Engineer"
    );
}
