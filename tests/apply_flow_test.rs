/// Flow controller against scripted Easy Apply modals.
use async_trait::async_trait;
use jobscout::apply_flow::{
    run_flow, FlowOptions, FlowState, ProfileAnswerer, MAX_FLOW_ITERATIONS, MODAL_SELECTOR,
    SELECT_SELECTOR, TEXT_INPUT_SELECTOR,
};
use jobscout::brain::ScoringBackend;
use jobscout::features::antibot::Pacing;
use jobscout::scraping::page::testing::{Effect, FakeElement, ScriptedPage};
use jobscout::scraping::prober::scoped_selector;
use jobscout::types::{FlowOutcome, JobAnalysis, JobContext};

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn in_modal(selector: &str) -> String {
    scoped_selector(Some(MODAL_SELECTOR), selector)
}

/// Picks the last offered option and answers free text with "3".
struct LastOption;

#[async_trait]
impl ScoringBackend for LastOption {
    async fn score(&self, _job_text: &str) -> Option<JobAnalysis> {
        None
    }

    async fn answer(&self, _question: &str, options: Option<&[String]>) -> Option<String> {
        match options {
            Some(opts) => opts.last().cloned(),
            None => Some("3".to_string()),
        }
    }
}

#[tokio::test]
async fn unrecognized_modal_goes_manual_after_fifteen_iterations() {
    init_logger();
    let page = ScriptedPage::new().with(MODAL_SELECTOR, FakeElement::text("Apply to Acme"));
    let ctx = JobContext::default();
    let answerer = ProfileAnswerer::new(&ctx, None);

    let summary = run_flow(&page, &ctx, &answerer, &Pacing::instant(), &FlowOptions::default()).await;

    assert_eq!(summary.outcome, FlowOutcome::Manual);
    assert_eq!(summary.iterations, MAX_FLOW_ITERATIONS);
    assert_eq!(
        summary.trace.iter().filter(|s| **s == FlowState::Start).count(),
        MAX_FLOW_ITERATIONS
    );
    assert_eq!(summary.trace.last(), Some(&FlowState::Manual));
    assert!(page.clicks().is_empty());
}

#[tokio::test]
async fn submit_on_first_iteration_is_one_click() {
    init_logger();
    let page = ScriptedPage::new()
        .with(MODAL_SELECTOR, FakeElement::text("Apply to Acme"))
        .with(&in_modal("footer button"), FakeElement::button("Submit application"));
    let ctx = JobContext::default();
    let answerer = ProfileAnswerer::new(&ctx, None);

    let summary = run_flow(&page, &ctx, &answerer, &Pacing::instant(), &FlowOptions::default()).await;

    assert_eq!(summary.outcome, FlowOutcome::Submitted);
    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.trace, vec![FlowState::Start, FlowState::Submitted]);
    assert_eq!(page.clicks(), vec!["Submit application".to_string()]);
}

#[tokio::test]
async fn form_step_then_review_then_submit() {
    init_logger();
    let page = ScriptedPage::new()
        .with(MODAL_SELECTOR, FakeElement::text("Apply to Acme"))
        .with(TEXT_INPUT_SELECTOR, FakeElement::field("salary"))
        .with(
            SELECT_SELECTOR,
            FakeElement::field("english").with_options(&["Basic", "Professional"]),
        )
        .with_label("salary", "Expected salary (COP)")
        .with_label("english", "English level")
        .with(
            &in_modal("button.next"),
            FakeElement::button("Next").on_click(Effect::Set(
                in_modal("button.next"),
                vec![FakeElement::button("Review your application").on_click(Effect::Set(
                    in_modal("button.next"),
                    vec![FakeElement::button("Submit application")],
                ))],
            )),
        );
    let ctx = JobContext {
        role: "Rust Engineer".into(),
        salary_expectation: Some("9000000".into()),
        ..Default::default()
    };
    let brain = LastOption;
    let answerer = ProfileAnswerer::new(&ctx, Some(&brain as &dyn ScoringBackend));

    let summary = run_flow(&page, &ctx, &answerer, &Pacing::instant(), &FlowOptions::default()).await;

    assert_eq!(summary.outcome, FlowOutcome::Submitted);
    assert_eq!(summary.iterations, 3);
    assert_eq!(
        page.clicks(),
        vec![
            "Next".to_string(),
            "Review your application".to_string(),
            "Submit application".to_string(),
        ]
    );
    assert_eq!(page.fills(), vec![("salary".to_string(), "9000000".to_string())]);
    assert_eq!(
        page.selections(),
        vec![("english".to_string(), "Professional".to_string())]
    );
}

#[tokio::test]
async fn description_behind_the_modal_is_ignored() {
    init_logger();
    let page = ScriptedPage::new()
        .with(MODAL_SELECTOR, FakeElement::text("Apply to Acme"))
        .with(
            ".jobs-description__content li",
            FakeElement::text("Take part in code reviews"),
        )
        .with(
            ".jobs-description__content li",
            FakeElement::text("Next-generation payments platform"),
        )
        .with(
            ".jobs-description__content li",
            FakeElement::text("Continue learning with a yearly budget"),
        )
        .with("button.follow", FakeElement::button("Review company page"))
        .with(
            &in_modal("footer button"),
            FakeElement::button("Next").on_click(Effect::Set(
                in_modal("footer button"),
                vec![FakeElement::button("Submit application")],
            )),
        );
    let ctx = JobContext::default();
    let answerer = ProfileAnswerer::new(&ctx, None);

    let summary = run_flow(&page, &ctx, &answerer, &Pacing::instant(), &FlowOptions::default()).await;

    assert_eq!(summary.outcome, FlowOutcome::Submitted);
    assert_eq!(summary.iterations, 2);
    assert_eq!(
        page.clicks(),
        vec!["Next".to_string(), "Submit application".to_string()]
    );
}
