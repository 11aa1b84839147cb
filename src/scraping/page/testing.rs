//! A tiny scripted DOM: elements are registered under the exact selector string
//! callers query with, and clicks can mutate the page through [`Effect`]s.
//!
//! Nesting follows the descendant-selector spelling: an element registered under
//! `".modal button.next"` lives inside `".modal"`. Scoped lookups only see such
//! descendants, and removing `".modal"` removes them too.

use super::{ClickMode, FieldInfo, PageDriver, PageError, BUTTON_CANDIDATES};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Replace everything registered under a selector.
    Set(String, Vec<FakeElement>),
    /// Drop everything registered under a selector, descendants included.
    Remove(String),
    /// Change the current URL.
    Navigate(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FakeElement {
    pub text: String,
    pub visible: bool,
    /// Detached from the document: scrolling it into view fails.
    pub stale: bool,
    pub role: Option<String>,
    pub id: String,
    pub aria_label: String,
    pub value: String,
    pub options: Vec<String>,
    pub attributes: HashMap<String, String>,
    /// `(child selector, element)` pairs reachable through `click_within` / `attribute_within`.
    pub children: Vec<(String, FakeElement)>,
    pub on_click: Vec<Effect>,
}

impl FakeElement {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn button(text: impl Into<String>) -> Self {
        Self {
            role: Some("button".to_string()),
            ..Self::text(text)
        }
    }

    pub fn field(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn stale(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_aria_label(mut self, label: impl Into<String>) -> Self {
        self.aria_label = label.into();
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_child(mut self, selector: &str, child: FakeElement) -> Self {
        self.children.push((selector.to_string(), child));
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }
}

#[derive(Debug, Default)]
struct State {
    url: String,
    nodes: Vec<(String, FakeElement)>,
    labels: HashMap<String, String>,
    routes: HashMap<String, Vec<Effect>>,
    failing_urls: HashSet<String>,
    failing_selectors: HashSet<String>,
    on_scroll: Vec<Effect>,
    clicks: Vec<String>,
    fills: Vec<(String, String)>,
    selections: Vec<(String, String)>,
    visits: Vec<String>,
    scrolls: usize,
}

impl State {
    fn check(&self, selector: &str) -> Result<(), PageError> {
        if self.failing_selectors.contains(selector) {
            Err(PageError::Script(format!("scripted failure on {}", selector)))
        } else {
            Ok(())
        }
    }

    fn matching(&self, selector: &str) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, (s, _))| s == selector)
            .map(|(i, _)| i)
            .collect()
    }

    fn nth(&self, selector: &str, index: usize) -> Option<usize> {
        self.matching(selector).get(index).copied()
    }

    /// Nodes a `scope`d lookup may see, in document order.
    fn scoped(&self, scope: Option<&str>) -> Vec<usize> {
        match scope {
            None => (0..self.nodes.len()).collect(),
            Some(root) if self.nodes.iter().any(|(s, _)| s == root) => self
                .nodes
                .iter()
                .enumerate()
                .filter(|(_, (s, _))| within(s, root))
                .map(|(i, _)| i)
                .collect(),
            Some(_) => Vec::new(),
        }
    }

    /// First scoped node accepted by `hit`, pressed.
    fn press_first(&mut self, scope: Option<&str>, hit: impl Fn(&FakeElement) -> bool) -> bool {
        let found = self
            .scoped(scope)
            .into_iter()
            .find(|&i| hit(&self.nodes[i].1));
        match found {
            Some(node) => {
                self.press(node);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Set(selector, elements) => {
                    let at = self
                        .nodes
                        .iter()
                        .position(|(s, _)| *s == selector)
                        .unwrap_or(self.nodes.len());
                    self.nodes.retain(|(s, _)| *s != selector);
                    let at = at.min(self.nodes.len());
                    for (offset, el) in elements.into_iter().enumerate() {
                        self.nodes.insert(at + offset, (selector.clone(), el));
                    }
                }
                Effect::Remove(selector) => self.nodes.retain(|(s, _)| !within(s, &selector) && *s != selector),
                Effect::Navigate(url) => self.url = url,
            }
        }
    }

    fn press(&mut self, node: usize) {
        let el = &self.nodes[node].1;
        let label = if el.text.is_empty() {
            self.nodes[node].0.clone()
        } else {
            el.text.clone()
        };
        let effects = el.on_click.clone();
        self.clicks.push(label);
        self.apply(effects);
    }
}

/// `selector` names a descendant of `root`.
fn within(selector: &str, root: &str) -> bool {
    selector
        .strip_prefix(root)
        .is_some_and(|rest| rest.starts_with(' '))
}

fn is_button(el: &FakeElement) -> bool {
    el.role.as_deref() == Some("button")
}

/// `aria-label` when present, the text otherwise.
fn accessible_name(el: &FakeElement) -> &str {
    if el.aria_label.trim().is_empty() {
        &el.text
    } else {
        &el.aria_label
    }
}

fn matches(pattern: &str, text: &str) -> bool {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(|re| re.is_match(text.trim()))
        .unwrap_or(false)
}

/// Scripted [`PageDriver`]. Interior mutability keeps the trait's `&self` receivers.
#[derive(Debug, Default)]
pub struct ScriptedPage {
    state: Mutex<State>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn at(self, url: &str) -> Self {
        self.with_state(|s| s.url = url.to_string());
        self
    }

    pub fn with(self, selector: &str, element: FakeElement) -> Self {
        self.add(selector, element);
        self
    }

    pub fn add(&self, selector: &str, element: FakeElement) {
        self.with_state(|s| s.nodes.push((selector.to_string(), element)));
    }

    pub fn with_label(self, id: &str, text: &str) -> Self {
        self.with_state(|s| {
            s.labels.insert(id.to_string(), text.to_string());
        });
        self
    }

    /// Effects applied whenever `url` is visited.
    pub fn route(self, url: &str, effects: Vec<Effect>) -> Self {
        self.with_state(|s| {
            s.routes.insert(url.to_string(), effects);
        });
        self
    }

    pub fn fail_goto(self, url: &str) -> Self {
        self.with_state(|s| {
            s.failing_urls.insert(url.to_string());
        });
        self
    }

    pub fn fail_selector(self, selector: &str) -> Self {
        self.with_state(|s| {
            s.failing_selectors.insert(selector.to_string());
        });
        self
    }

    /// Effects applied on the first `scroll_list` call.
    pub fn on_scroll(self, effects: Vec<Effect>) -> Self {
        self.with_state(|s| s.on_scroll = effects);
        self
    }

    pub fn clicks(&self) -> Vec<String> {
        self.with_state(|s| s.clicks.clone())
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.fills.clone())
    }

    pub fn selections(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.selections.clone())
    }

    pub fn visits(&self) -> Vec<String> {
        self.with_state(|s| s.visits.clone())
    }

    pub fn scrolls(&self) -> usize {
        self.with_state(|s| s.scrolls)
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        self.with_state(|s| {
            if s.failing_urls.contains(url) {
                return Err(PageError::Navigation {
                    url: url.to_string(),
                    reason: "scripted failure".to_string(),
                });
            }
            s.visits.push(url.to_string());
            s.url = url.to_string();
            let effects = s.routes.get(url).cloned().unwrap_or_default();
            s.apply(effects);
            Ok(())
        })
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.with_state(|s| s.url.clone()))
    }

    async fn visibility(&self, selector: &str) -> Result<Vec<bool>, PageError> {
        self.with_state(|s| {
            s.check(selector)?;
            Ok(s.matching(selector)
                .into_iter()
                .map(|i| s.nodes[i].1.visible)
                .collect())
        })
    }

    async fn inner_text(&self, selector: &str, index: usize) -> Result<Option<String>, PageError> {
        self.with_state(|s| {
            s.check(selector)?;
            Ok(s.nth(selector, index).map(|i| s.nodes[i].1.text.clone()))
        })
    }

    async fn click(&self, selector: &str, index: usize, _mode: ClickMode) -> Result<bool, PageError> {
        self.with_state(|s| {
            s.check(selector)?;
            let Some(node) = s.nth(selector, index) else {
                return Ok(false);
            };
            s.press(node);
            Ok(true)
        })
    }

    async fn click_within(&self, parent: &str, index: usize, child: &str) -> Result<bool, PageError> {
        self.with_state(|s| {
            s.check(parent)?;
            let Some(node) = s.nth(parent, index) else {
                return Ok(false);
            };
            let hit = s.nodes[node]
                .1
                .children
                .iter()
                .find(|(sel, el)| sel == child && el.visible)
                .map(|(_, el)| (el.text.clone(), el.on_click.clone()));
            match hit {
                Some((text, effects)) => {
                    s.clicks.push(if text.is_empty() { child.to_string() } else { text });
                    s.apply(effects);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    async fn attribute_within(
        &self,
        parent: &str,
        index: usize,
        child: &str,
        attribute: &str,
    ) -> Result<Option<String>, PageError> {
        self.with_state(|s| {
            s.check(parent)?;
            Ok(s.nth(parent, index).and_then(|node| {
                s.nodes[node]
                    .1
                    .children
                    .iter()
                    .find(|(sel, _)| sel == child)
                    .and_then(|(_, el)| el.attributes.get(attribute).cloned())
            }))
        })
    }

    async fn scroll_into_view(&self, selector: &str, index: usize) -> Result<(), PageError> {
        self.with_state(|s| {
            s.check(selector)?;
            match s.nth(selector, index) {
                Some(node) if s.nodes[node].1.stale => Err(PageError::Element(format!(
                    "{}[{}] is detached",
                    selector, index
                ))),
                _ => Ok(()),
            }
        })
    }

    async fn scroll_list(&self, _container: Option<&str>) -> Result<(), PageError> {
        self.with_state(|s| {
            s.scrolls += 1;
            let effects = std::mem::take(&mut s.on_scroll);
            s.apply(effects);
        });
        Ok(())
    }

    async fn click_role(&self, scope: Option<&str>, role: &str, pattern: &str) -> Result<bool, PageError> {
        Ok(self.with_state(|s| {
            s.press_first(scope, |el| {
                el.visible && el.role.as_deref() == Some(role) && matches(pattern, accessible_name(el))
            })
        }))
    }

    async fn click_text(&self, scope: Option<&str>, candidates: &str, pattern: &str) -> Result<bool, PageError> {
        let buttons_only = candidates == BUTTON_CANDIDATES;
        Ok(self.with_state(|s| {
            s.press_first(scope, |el| {
                el.visible && (!buttons_only || is_button(el)) && matches(pattern, &el.text)
            })
        }))
    }

    async fn click_by_needles(&self, scope: Option<&str>, needles: &[&str]) -> Result<bool, PageError> {
        Ok(self.with_state(|s| {
            s.press_first(scope, |el| {
                let text = el.text.to_lowercase();
                is_button(el) && needles.iter().any(|n| text.contains(n))
            })
        }))
    }

    async fn fields(&self, selector: &str) -> Result<Vec<FieldInfo>, PageError> {
        self.with_state(|s| {
            s.check(selector)?;
            Ok(s.matching(selector)
                .into_iter()
                .enumerate()
                .map(|(index, i)| {
                    let el = &s.nodes[i].1;
                    FieldInfo {
                        index,
                        id: el.id.clone(),
                        aria_label: el.aria_label.clone(),
                        value: el.value.clone(),
                        visible: el.visible,
                        options: el.options.clone(),
                        placeholder_selected: false,
                    }
                })
                .collect())
        })
    }

    async fn label_for(&self, id: &str) -> Result<Option<String>, PageError> {
        Ok(self.with_state(|s| s.labels.get(id).cloned()))
    }

    async fn fill(&self, selector: &str, index: usize, value: &str) -> Result<(), PageError> {
        self.with_state(|s| {
            s.check(selector)?;
            let node = s.nth(selector, index).ok_or_else(|| {
                PageError::Element(format!("no element {}[{}] to fill", selector, index))
            })?;
            s.nodes[node].1.value = value.to_string();
            let key = if s.nodes[node].1.id.is_empty() {
                selector.to_string()
            } else {
                s.nodes[node].1.id.clone()
            };
            s.fills.push((key, value.to_string()));
            Ok(())
        })
    }

    async fn select_option(&self, selector: &str, index: usize, label: &str) -> Result<bool, PageError> {
        self.with_state(|s| {
            s.check(selector)?;
            let Some(node) = s.nth(selector, index) else {
                return Ok(false);
            };
            let el = &mut s.nodes[node].1;
            let Some(option) = el
                .options
                .iter()
                .find(|o| o.trim().eq_ignore_ascii_case(label.trim()))
                .cloned()
            else {
                return Ok(false);
            };
            el.value = option.clone();
            let key = if el.id.is_empty() {
                selector.to_string()
            } else {
                el.id.clone()
            };
            s.selections.push((key, option));
            Ok(true)
        })
    }
}
