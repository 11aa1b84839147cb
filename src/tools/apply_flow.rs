//! Supervises the "Easy Apply" modal until it is submitted or handed back to a human.
//!
//! One iteration is `Start -> Reviewing -> Filling -> Advancing [-> Stuck]`; the pure
//! [`transition`] function owns every edge, [`run_flow`] only performs the page work
//! each state needs and reports what happened as an [`Event`].

use crate::brain::{match_option, ScoringBackend};
use crate::core::types::{FlowOutcome, JobContext};
use crate::features::antibot::Pacing;
use crate::nlp::resume::is_salary_question;
use crate::scraping::page::{ClickMode, FieldInfo, PageDriver};
pub use crate::scraping::prober::MODAL_SELECTOR;
use crate::scraping::prober::{probe, Goal};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MAX_FLOW_ITERATIONS: usize = 15;
/// Iterations (0-based) before which a vanished modal is not trusted as a submission.
const CLOSED_MODAL_MIN_ITERATION: usize = 2;

pub const RESUME_HEADING_SELECTOR: &str = "h3";
pub const LABEL_SELECTOR: &str = "label";
pub const TEXT_INPUT_SELECTOR: &str = "input[type='text'], input[type='number'], textarea";
pub const SELECT_SELECTOR: &str = "select";
pub const VALIDATION_SELECTORS: &[&str] = &[".artdeco-inline-feedback__message", "div[aria-invalid='true']"];

const YES_LABELS: &[&str] = &["yes", "sí", "si"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Start,
    Reviewing,
    Filling,
    Advancing,
    Stuck,
    Submitted,
    Manual,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Submitted | FlowState::Manual)
    }
}

/// What the work done in a state produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The state's probe clicked its control.
    Acted,
    /// The state's probe found nothing.
    Missed,
    /// The fill pass ran.
    Filled,
    /// Next found nothing and the modal is no longer visible.
    ModalClosed,
    /// A stuck iteration finished waiting.
    Waited,
}

/// Next state for `(state, event)` during 0-based `iteration`.
///
/// Every edge that would start a new iteration turns into `Manual` once
/// [`MAX_FLOW_ITERATIONS`] iterations have run.
pub fn transition(state: FlowState, event: Event, iteration: usize) -> FlowState {
    let next_iteration = || {
        if iteration + 1 >= MAX_FLOW_ITERATIONS {
            FlowState::Manual
        } else {
            FlowState::Start
        }
    };
    match (state, event) {
        (FlowState::Submitted, _) => FlowState::Submitted,
        (FlowState::Manual, _) => FlowState::Manual,
        (FlowState::Start, Event::Acted) => FlowState::Submitted,
        (FlowState::Start, _) => FlowState::Reviewing,
        (FlowState::Reviewing, Event::Acted) => next_iteration(),
        (FlowState::Reviewing, _) => FlowState::Filling,
        (FlowState::Filling, _) => FlowState::Advancing,
        (FlowState::Advancing, Event::Acted) => next_iteration(),
        (FlowState::Advancing, Event::ModalClosed) if iteration >= CLOSED_MODAL_MIN_ITERATION => {
            FlowState::Submitted
        }
        (FlowState::Advancing, _) => FlowState::Stuck,
        (FlowState::Stuck, _) => next_iteration(),
    }
}

/// Supplies values for form questions. `None` leaves the field untouched.
#[async_trait]
pub trait FieldAnswerer: Send + Sync {
    async fn answer(&self, question: &str, options: Option<&[String]>) -> Option<String>;
}

/// Salary questions from the profile's salary rules, everything else from the brain.
pub struct ProfileAnswerer<'a> {
    salary: Option<String>,
    brain: Option<&'a dyn ScoringBackend>,
}

impl<'a> ProfileAnswerer<'a> {
    pub fn new(ctx: &JobContext, brain: Option<&'a dyn ScoringBackend>) -> Self {
        Self {
            salary: ctx.salary_expectation.clone(),
            brain,
        }
    }
}

#[async_trait]
impl FieldAnswerer for ProfileAnswerer<'_> {
    async fn answer(&self, question: &str, options: Option<&[String]>) -> Option<String> {
        if let Some(salary) = self.salary.as_ref().filter(|_| is_salary_question(question)) {
            match options {
                None => return Some(salary.clone()),
                Some(opts) => {
                    if let Some(hit) = match_option(salary, opts) {
                        return Some(hit);
                    }
                }
            }
        }
        self.brain?.answer(question, options).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FlowOptions {
    /// Upper bound on one Next probe.
    pub next_timeout: Duration,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            next_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowSummary {
    pub outcome: FlowOutcome,
    /// Iterations started, including the last one.
    pub iterations: usize,
    /// Every state entered, in order.
    pub trace: Vec<FlowState>,
}

// ── Fill pass ────────────────────────────────────────────────────────────────

async fn visible_label_texts(page: &dyn PageDriver) -> Vec<(usize, String)> {
    let visibility = match page.visibility(LABEL_SELECTOR).await {
        Ok(v) => v,
        Err(e) => {
            debug!("flow: listing labels failed: {}", e);
            return Vec::new();
        }
    };
    let mut labels = Vec::new();
    for (index, visible) in visibility.into_iter().enumerate() {
        if !visible {
            continue;
        }
        if let Ok(Some(text)) = page.inner_text(LABEL_SELECTOR, index).await {
            labels.push((index, text.trim().to_string()));
        }
    }
    labels
}

async fn on_resume_step(page: &dyn PageDriver) -> bool {
    let Ok(visibility) = page.visibility(RESUME_HEADING_SELECTOR).await else {
        return false;
    };
    for (index, visible) in visibility.into_iter().enumerate() {
        if !visible {
            continue;
        }
        if let Ok(Some(text)) = page.inner_text(RESUME_HEADING_SELECTOR, index).await {
            let text = text.to_lowercase();
            if text.contains("resume") || text.contains("currículum") {
                return true;
            }
        }
    }
    false
}

async fn select_resume(page: &dyn PageDriver, filename: &str) {
    let target = visible_label_texts(page)
        .await
        .into_iter()
        .find(|(_, text)| text.contains(filename));
    match target {
        Some((index, _)) => {
            info!("flow: selecting resume {}", filename);
            if let Err(e) = page.click(LABEL_SELECTOR, index, ClickMode::Native).await {
                warn!("flow: resume click failed: {}", e);
            }
        }
        None => warn!("flow: resume {} not offered", filename),
    }
}

async fn click_yes_labels(page: &dyn PageDriver) {
    for (index, text) in visible_label_texts(page).await {
        let text = text.to_lowercase();
        if YES_LABELS.contains(&text.as_str()) {
            if let Err(e) = page.click(LABEL_SELECTOR, index, ClickMode::Native).await {
                debug!("flow: yes-label click failed: {}", e);
            }
        }
    }
}

async fn field_label(page: &dyn PageDriver, field: &FieldInfo) -> Option<String> {
    if !field.id.is_empty() {
        if let Ok(Some(label)) = page.label_for(&field.id).await {
            if !label.trim().is_empty() {
                return Some(label.trim().to_string());
            }
        }
    }
    let aria = field.aria_label.trim();
    (!aria.is_empty()).then(|| aria.to_string())
}

async fn fill_text_fields(page: &dyn PageDriver, answerer: &dyn FieldAnswerer, pacing: &Pacing) {
    let fields = match page.fields(TEXT_INPUT_SELECTOR).await {
        Ok(f) => f,
        Err(e) => {
            debug!("flow: listing inputs failed: {}", e);
            return;
        }
    };
    for field in fields.iter().filter(|f| f.visible && f.value.trim().is_empty()) {
        let Some(question) = field_label(page, field).await else {
            continue;
        };
        let Some(answer) = answerer.answer(&question, None).await.filter(|a| !a.trim().is_empty()) else {
            continue;
        };
        match page.fill(TEXT_INPUT_SELECTOR, field.index, &answer).await {
            Ok(()) => info!("flow: filled {:?} for {:?}", answer, question),
            Err(e) => debug!("flow: filling {:?} failed: {}", question, e),
        }
        pacing.short().await;
    }
}

async fn fill_selects(page: &dyn PageDriver, answerer: &dyn FieldAnswerer, pacing: &Pacing) {
    let fields = match page.fields(SELECT_SELECTOR).await {
        Ok(f) => f,
        Err(e) => {
            debug!("flow: listing selects failed: {}", e);
            return;
        }
    };
    for field in fields.iter().filter(|f| f.visible && f.is_unset()) {
        if field.options.is_empty() {
            continue;
        }
        let Some(question) = field_label(page, field).await else {
            continue;
        };
        let Some(answer) = answerer.answer(&question, Some(&field.options)).await else {
            continue;
        };
        match page.select_option(SELECT_SELECTOR, field.index, &answer).await {
            Ok(true) => info!("flow: selected {:?} for {:?}", answer, question),
            Ok(false) => debug!("flow: {:?} is not an option of {:?}", answer, question),
            Err(e) => debug!("flow: selecting for {:?} failed: {}", question, e),
        }
        pacing.short().await;
    }
}

async fn fill_pass(page: &dyn PageDriver, ctx: &JobContext, answerer: &dyn FieldAnswerer, pacing: &Pacing) {
    if let Some(filename) = ctx.target_resume_filename.as_deref() {
        if on_resume_step(page).await {
            select_resume(page, filename).await;
        }
    }
    click_yes_labels(page).await;
    fill_text_fields(page, answerer, pacing).await;
    fill_selects(page, answerer, pacing).await;
}

async fn report_validation(page: &dyn PageDriver) {
    for selector in VALIDATION_SELECTORS {
        if let Ok(true) = page.any_visible(selector).await {
            warn!("flow: validation errors after Next ({})", selector);
            return;
        }
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Drive the open Easy Apply modal to a terminal state.
pub async fn run_flow(
    page: &dyn PageDriver,
    ctx: &JobContext,
    answerer: &dyn FieldAnswerer,
    pacing: &Pacing,
    opts: &FlowOptions,
) -> FlowSummary {
    let mut state = FlowState::Start;
    let mut iteration = 0usize;
    let mut trace = Vec::new();

    loop {
        trace.push(state);
        let event = match state {
            FlowState::Start => {
                pacing.medium().await;
                if probe(page, Goal::Submit).await.acted() {
                    info!("flow: submit clicked");
                    pacing.long().await;
                    Event::Acted
                } else {
                    Event::Missed
                }
            }
            FlowState::Reviewing => {
                if probe(page, Goal::Review).await.acted() {
                    info!("flow: review clicked");
                    pacing.short().await;
                    Event::Acted
                } else {
                    Event::Missed
                }
            }
            FlowState::Filling => {
                fill_pass(page, ctx, answerer, pacing).await;
                Event::Filled
            }
            FlowState::Advancing => match tokio::time::timeout(opts.next_timeout, probe(page, Goal::Next)).await {
                Ok(outcome) if outcome.acted() => {
                    info!("flow: next clicked (step {})", iteration + 1);
                    pacing.short().await;
                    report_validation(page).await;
                    Event::Acted
                }
                Ok(_) | Err(_) => match page.any_visible(MODAL_SELECTOR).await {
                    Ok(false) => Event::ModalClosed,
                    Ok(true) | Err(_) => Event::Missed,
                },
            },
            FlowState::Stuck => {
                info!("flow: no actionable control on step {}, waiting", iteration + 1);
                Event::Waited
            }
            FlowState::Submitted | FlowState::Manual => break,
        };

        let next = transition(state, event, iteration);
        if next == FlowState::Start {
            iteration += 1;
        }
        state = next;
    }

    let outcome = match state {
        FlowState::Submitted => FlowOutcome::Submitted,
        _ => FlowOutcome::Manual,
    };
    FlowSummary {
        outcome,
        iterations: iteration + 1,
        trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::page::testing::{Effect, FakeElement, ScriptedPage};
    use crate::scraping::prober::scoped_selector;
    use std::sync::Mutex;

    fn in_modal(selector: &str) -> String {
        scoped_selector(Some(MODAL_SELECTOR), selector)
    }

    struct Canned {
        asked: Mutex<Vec<(String, Option<Vec<String>>)>>,
    }

    impl Canned {
        fn new() -> Self {
            Self {
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FieldAnswerer for Canned {
        async fn answer(&self, question: &str, options: Option<&[String]>) -> Option<String> {
            self.asked
                .lock()
                .unwrap()
                .push((question.to_string(), options.map(|o| o.to_vec())));
            match options {
                Some(opts) => opts.last().cloned(),
                None => Some("7".to_string()),
            }
        }
    }

    #[test]
    fn one_iteration_walks_every_phase() {
        assert_eq!(transition(FlowState::Start, Event::Missed, 0), FlowState::Reviewing);
        assert_eq!(transition(FlowState::Reviewing, Event::Missed, 0), FlowState::Filling);
        assert_eq!(transition(FlowState::Filling, Event::Filled, 0), FlowState::Advancing);
        assert_eq!(transition(FlowState::Advancing, Event::Missed, 0), FlowState::Stuck);
        assert_eq!(transition(FlowState::Stuck, Event::Waited, 0), FlowState::Start);
    }

    #[test]
    fn submit_and_review_short_circuit() {
        assert_eq!(transition(FlowState::Start, Event::Acted, 4), FlowState::Submitted);
        assert_eq!(transition(FlowState::Reviewing, Event::Acted, 4), FlowState::Start);
        assert_eq!(transition(FlowState::Advancing, Event::Acted, 4), FlowState::Start);
    }

    #[test]
    fn closed_modal_only_trusted_after_two_iterations() {
        assert_eq!(transition(FlowState::Advancing, Event::ModalClosed, 1), FlowState::Stuck);
        assert_eq!(transition(FlowState::Advancing, Event::ModalClosed, 2), FlowState::Submitted);
    }

    #[test]
    fn iteration_bound_turns_into_manual() {
        let last = MAX_FLOW_ITERATIONS - 1;
        assert_eq!(transition(FlowState::Stuck, Event::Waited, last), FlowState::Manual);
        assert_eq!(transition(FlowState::Advancing, Event::Acted, last), FlowState::Manual);
        assert_eq!(transition(FlowState::Manual, Event::Acted, 0), FlowState::Manual);
        assert!(FlowState::Submitted.is_terminal());
    }

    #[tokio::test]
    async fn fill_pass_answers_every_open_field() {
        let page = ScriptedPage::new()
            .with(MODAL_SELECTOR, FakeElement::text("Apply to Acme"))
            .with(RESUME_HEADING_SELECTOR, FakeElement::text("Resume"))
            .with(LABEL_SELECTOR, FakeElement::text("cv_general_en.pdf"))
            .with(LABEL_SELECTOR, FakeElement::text("cv_rust_lead_en.pdf Uploaded 1/2/2026"))
            .with(LABEL_SELECTOR, FakeElement::text(" Yes "))
            .with(LABEL_SELECTOR, FakeElement::text("Sí").hidden())
            .with(TEXT_INPUT_SELECTOR, FakeElement::field("years-rust"))
            .with(TEXT_INPUT_SELECTOR, FakeElement::field("city").with_value("Bogotá"))
            .with(
                TEXT_INPUT_SELECTOR,
                FakeElement::field("").with_aria_label("Phone number"),
            )
            .with(TEXT_INPUT_SELECTOR, FakeElement::field("hidden").hidden())
            .with(
                SELECT_SELECTOR,
                FakeElement::field("english").with_options(&["Basic", "Professional"]),
            )
            .with_label("years-rust", "Years of Rust?")
            .with_label("english", "English level");
        let ctx = JobContext {
            role: "Rust Lead".into(),
            target_resume_filename: Some("cv_rust_lead_en.pdf".into()),
            ..Default::default()
        };
        let answerer = Canned::new();

        fill_pass(&page, &ctx, &answerer, &Pacing::instant()).await;

        assert_eq!(
            page.clicks(),
            vec!["cv_rust_lead_en.pdf Uploaded 1/2/2026".to_string(), " Yes ".to_string()]
        );
        assert_eq!(
            page.fills(),
            vec![
                ("years-rust".to_string(), "7".to_string()),
                (TEXT_INPUT_SELECTOR.to_string(), "7".to_string()),
            ]
        );
        assert_eq!(
            page.selections(),
            vec![("english".to_string(), "Professional".to_string())]
        );
        let asked = answerer.asked.lock().unwrap();
        assert_eq!(asked[0].0, "Years of Rust?");
        assert_eq!(asked[1].0, "Phone number");
        assert_eq!(asked[2].1.as_deref(), Some(&["Basic".to_string(), "Professional".to_string()][..]));
    }

    #[tokio::test]
    async fn review_then_submit() {
        let page = ScriptedPage::new()
            .with(MODAL_SELECTOR, FakeElement::text("Apply"))
            .with(
                &in_modal("button.review"),
                FakeElement::button("Review your application").on_click(Effect::Set(
                    in_modal("button.submit"),
                    vec![FakeElement::button("Submit application")],
                )),
            );
        let summary = run_flow(
            &page,
            &JobContext::default(),
            &Canned::new(),
            &Pacing::instant(),
            &FlowOptions::default(),
        )
        .await;
        assert_eq!(summary.outcome, FlowOutcome::Submitted);
        assert_eq!(summary.iterations, 2);
        assert_eq!(
            summary.trace,
            vec![
                FlowState::Start,
                FlowState::Reviewing,
                FlowState::Start,
                FlowState::Submitted
            ]
        );
    }

    #[tokio::test]
    async fn vanished_modal_counts_as_submitted_late() {
        // Next closes the modal on the third click.
        let next = |then: Vec<Effect>| {
            let mut b = FakeElement::button("Next");
            b.on_click = then;
            b
        };
        let page = ScriptedPage::new()
            .with(MODAL_SELECTOR, FakeElement::text("Apply"))
            .with(
                &in_modal("button.next"),
                next(vec![Effect::Set(
                    in_modal("button.next"),
                    vec![next(vec![Effect::Set(
                        in_modal("button.next"),
                        vec![next(vec![
                            Effect::Remove(in_modal("button.next")),
                            Effect::Remove(MODAL_SELECTOR.into()),
                        ])],
                    )])],
                )]),
            );
        let summary = run_flow(
            &page,
            &JobContext::default(),
            &Canned::new(),
            &Pacing::instant(),
            &FlowOptions::default(),
        )
        .await;
        assert_eq!(summary.outcome, FlowOutcome::Submitted);
        assert_eq!(summary.iterations, 4);
        assert_eq!(page.clicks().len(), 3);
    }
}
