//! Locate-and-activate for the handful of controls the run cares about.
//!
//! The platform's markup changes often and differs per locale, so every goal is tried
//! through an ordered list of strategies; the first one that clicks something wins.

use crate::scraping::page::{ClickMode, PageDriver, PageError, BUTTON_CANDIDATES, TEXT_CANDIDATES};
use std::fmt;
use tracing::{debug, warn};

/// The Easy Apply dialog. Submit, Review and Next only ever live inside it.
pub const MODAL_SELECTOR: &str = ".jobs-easy-apply-modal";

/// The control a probe is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Goal {
    /// The posting's "Easy Apply" / "Solicitud sencilla" button.
    PrimaryCta,
    Submit,
    Review,
    Next,
}

impl Goal {
    /// Case-insensitive accessible-name / text pattern, valid both as a JS `RegExp` and a Rust regex.
    ///
    /// Modal actions are anchored to the start of the label so that prose such as
    /// "take part in code reviews" never reads as a control.
    pub fn pattern(&self) -> &'static str {
        match self {
            Goal::PrimaryCta => "(solicitar|apply|sencilla|now)",
            Goal::Submit => r"^\s*(submit application|enviar solicitud)\b",
            Goal::Review => r"^\s*(review|revisar)\b",
            Goal::Next => r"^\s*(next|siguiente|continue|continuar)\b",
        }
    }

    /// Root every strategy searches under; `None` is the whole page.
    pub fn scope(&self) -> Option<&'static str> {
        match self {
            Goal::PrimaryCta => None,
            Goal::Submit | Goal::Review | Goal::Next => Some(MODAL_SELECTOR),
        }
    }

    /// Elements the visible-text strategy considers.
    pub fn text_candidates(&self) -> &'static str {
        match self.scope() {
            Some(_) => BUTTON_CANDIDATES,
            None => TEXT_CANDIDATES,
        }
    }

    /// Static selectors, relative to [`Goal::scope`].
    pub fn selectors(&self) -> &'static [&'static str] {
        match self {
            Goal::PrimaryCta => &[
                ".jobs-apply-button",
                ".jobs-s-apply button",
                "button[aria-label*='Apply']",
                ".jobs-apply-button--top-card button",
            ],
            Goal::Submit => &[
                "button[aria-label='Submit application']",
                "button[aria-label='Enviar solicitud']",
            ],
            Goal::Review => &[
                "button[aria-label='Review your application']",
                "button[aria-label='Revisar tu solicitud']",
            ],
            Goal::Next => &[
                "button[aria-label='Continue to next step']",
                "button[aria-label='Continuar al siguiente paso']",
            ],
        }
    }

    /// Lowercase substrings for the last-resort DOM scan.
    pub fn needles(&self) -> &'static [&'static str] {
        match self {
            Goal::PrimaryCta => &["apply", "solicitar"],
            Goal::Submit => &["submit application", "enviar solicitud"],
            Goal::Review => &["review", "revisar"],
            Goal::Next => &["next", "siguiente", "continue"],
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Goal::PrimaryCta => "primary-cta",
            Goal::Submit => "submit",
            Goal::Review => "review",
            Goal::Next => "next",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    AccessibleRole,
    VisibleText,
    StaticSelectors,
    DomInjection,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::AccessibleRole,
        Strategy::VisibleText,
        Strategy::StaticSelectors,
        Strategy::DomInjection,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Acted(Strategy),
    NotFound,
}

impl ProbeOutcome {
    pub fn acted(&self) -> bool {
        matches!(self, ProbeOutcome::Acted(_))
    }
}

/// `selector` as a descendant of `scope`.
pub fn scoped_selector(scope: Option<&str>, selector: &str) -> String {
    match scope {
        Some(scope) => format!("{} {}", scope, selector),
        None => selector.to_string(),
    }
}

async fn attempt(page: &dyn PageDriver, goal: Goal, strategy: Strategy) -> Result<bool, PageError> {
    let scope = goal.scope();
    match strategy {
        Strategy::AccessibleRole => page.click_role(scope, "button", goal.pattern()).await,
        Strategy::VisibleText => {
            page.click_text(scope, goal.text_candidates(), goal.pattern())
                .await
        }
        Strategy::StaticSelectors => {
            for selector in goal.selectors() {
                let selector = scoped_selector(scope, selector);
                if let Some(index) = page.first_visible(&selector).await? {
                    return page.click(&selector, index, ClickMode::Native).await;
                }
            }
            Ok(false)
        }
        Strategy::DomInjection => page.click_by_needles(scope, goal.needles()).await,
    }
}

/// Try every strategy in order until one activates a control for `goal`.
pub async fn probe(page: &dyn PageDriver, goal: Goal) -> ProbeOutcome {
    for strategy in Strategy::ALL {
        match attempt(page, goal, strategy).await {
            Ok(true) => {
                debug!("probe {}: acted via {:?}", goal, strategy);
                return ProbeOutcome::Acted(strategy);
            }
            Ok(false) => {}
            Err(e) => warn!("probe {}: {:?} failed: {}", goal, strategy, e),
        }
    }
    ProbeOutcome::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::page::testing::{FakeElement, ScriptedPage};

    fn in_modal(selector: &str) -> String {
        scoped_selector(Some(MODAL_SELECTOR), selector)
    }

    fn modal_page() -> ScriptedPage {
        ScriptedPage::new().with(MODAL_SELECTOR, FakeElement::text("Apply to Acme"))
    }

    #[tokio::test]
    async fn role_match_wins_first() {
        let page = ScriptedPage::new().with(
            "button.jobs-apply-button",
            FakeElement::button("Solicitud sencilla"),
        );
        assert_eq!(
            probe(&page, Goal::PrimaryCta).await,
            ProbeOutcome::Acted(Strategy::AccessibleRole)
        );
        assert_eq!(page.clicks(), vec!["Solicitud sencilla".to_string()]);
    }

    #[tokio::test]
    async fn plain_text_falls_through_to_forced_click() {
        let page = ScriptedPage::new().with("span.label", FakeElement::text("Solicitar"));
        assert_eq!(
            probe(&page, Goal::PrimaryCta).await,
            ProbeOutcome::Acted(Strategy::VisibleText)
        );
    }

    #[tokio::test]
    async fn modal_text_match_needs_a_button() {
        // The accessible name says nothing useful, the visible text does.
        let page = modal_page()
            .with(&in_modal("span.step"), FakeElement::text("Revisar"))
            .with(
                &in_modal("footer button"),
                FakeElement::button("Revisar").with_aria_label("Paso 3 de 4"),
            );
        assert_eq!(
            probe(&page, Goal::Review).await,
            ProbeOutcome::Acted(Strategy::VisibleText)
        );
        assert_eq!(page.clicks(), vec!["Revisar".to_string()]);
    }

    #[tokio::test]
    async fn description_text_never_passes_for_a_modal_control() {
        let page = modal_page()
            .with(".jobs-description__content li", FakeElement::text("Take part in code reviews"))
            .with(
                ".jobs-description__content p",
                FakeElement::text("Next-generation platform"),
            )
            .with("button.follow", FakeElement::button("Review company page"))
            .with(&in_modal("footer button"), FakeElement::button("Next"));

        assert_eq!(probe(&page, Goal::Review).await, ProbeOutcome::NotFound);
        assert_eq!(probe(&page, Goal::Submit).await, ProbeOutcome::NotFound);
        assert!(page.clicks().is_empty());

        assert_eq!(
            probe(&page, Goal::Next).await,
            ProbeOutcome::Acted(Strategy::AccessibleRole)
        );
        assert_eq!(page.clicks(), vec!["Next".to_string()]);
    }

    #[test]
    fn modal_patterns_match_label_starts_only() {
        let re = |goal: Goal| {
            regex::RegexBuilder::new(goal.pattern())
                .case_insensitive(true)
                .build()
                .unwrap()
        };
        assert!(re(Goal::Review).is_match("Review your application"));
        assert!(re(Goal::Review).is_match("  Revisar tu solicitud"));
        assert!(!re(Goal::Review).is_match("Take part in code reviews"));
        assert!(!re(Goal::Review).is_match("Reviews"));
        assert!(re(Goal::Next).is_match("Continue to next step"));
        assert!(re(Goal::Next).is_match("Siguiente"));
        assert!(!re(Goal::Next).is_match("Please review before you continue"));
        assert!(re(Goal::Submit).is_match("Submit application"));
        assert!(!re(Goal::Submit).is_match("Ready to submit application?"));
    }

    #[tokio::test]
    async fn modal_goals_need_the_modal() {
        let page = ScriptedPage::new().with(&in_modal("footer button"), FakeElement::button("Next"));
        assert_eq!(probe(&page, Goal::Next).await, ProbeOutcome::NotFound);
    }

    #[tokio::test]
    async fn static_selector_skips_hidden_matches() {
        let sel = in_modal("button[aria-label='Continue to next step']");
        let page = modal_page()
            .with(&sel, FakeElement::text("").hidden())
            .with(&sel, FakeElement::text(""));
        assert_eq!(
            probe(&page, Goal::Next).await,
            ProbeOutcome::Acted(Strategy::StaticSelectors)
        );
        assert_eq!(page.clicks().len(), 1);
    }

    #[tokio::test]
    async fn hidden_button_reached_by_dom_scan() {
        let page = modal_page().with(
            &in_modal("button"),
            FakeElement::button("Submit application").hidden(),
        );
        assert_eq!(
            probe(&page, Goal::Submit).await,
            ProbeOutcome::Acted(Strategy::DomInjection)
        );
    }

    #[tokio::test]
    async fn strategy_errors_count_as_misses() {
        let page = modal_page()
            .fail_selector(&in_modal("button[aria-label='Submit application']"))
            .with("div", FakeElement::text("nothing here"));
        assert_eq!(probe(&page, Goal::Submit).await, ProbeOutcome::NotFound);
        assert!(page.clicks().is_empty());
    }
}
