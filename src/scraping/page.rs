//! Page automation seam. Everything above this module (prober, extractor, scan loop,
//! application flow) talks to a [`PageDriver`], never to chromiumoxide directly.
//!
//! [`CdpPage`] is the real implementation over a live CDP page. [`testing::ScriptedPage`]
//! is an in-memory DOM stand-in used by the test suite.

use crate::scraping::browser_manager::wait_until_stable;
use async_trait::async_trait;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("page script failed: {0}")]
    Script(String),

    #[error("element interaction failed: {0}")]
    Element(String),
}

/// How a click is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    /// Real mouse events at the element's center (after scrolling it into view).
    Native,
    /// Script-dispatched `el.click()`; ignores overlays that would intercept a mouse click.
    Forced,
}

/// Snapshot of one form control.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct FieldInfo {
    pub index: usize,
    pub id: String,
    pub aria_label: String,
    pub value: String,
    pub visible: bool,
    /// `<select>` only: labels of options that carry a value.
    pub options: Vec<String>,
    /// `<select>` only: the selected option is a "Select an option" placeholder.
    pub placeholder_selected: bool,
}

impl FieldInfo {
    pub fn is_unset(&self) -> bool {
        self.value.trim().is_empty() || self.placeholder_selected
    }
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), PageError>;

    async fn current_url(&self) -> Result<String, PageError>;

    /// Visibility of every element matching `selector`, in document order.
    async fn visibility(&self, selector: &str) -> Result<Vec<bool>, PageError>;

    async fn inner_text(&self, selector: &str, index: usize) -> Result<Option<String>, PageError>;

    /// `Ok(false)` when there is no element at `index`.
    async fn click(&self, selector: &str, index: usize, mode: ClickMode) -> Result<bool, PageError>;

    /// Click the first visible `child` inside the `index`-th `parent`.
    async fn click_within(&self, parent: &str, index: usize, child: &str) -> Result<bool, PageError>;

    async fn attribute_within(
        &self,
        parent: &str,
        index: usize,
        child: &str,
        attribute: &str,
    ) -> Result<Option<String>, PageError>;

    async fn scroll_into_view(&self, selector: &str, index: usize) -> Result<(), PageError>;

    /// Scroll a list container (or the window) to trigger lazy loading.
    async fn scroll_list(&self, container: Option<&str>) -> Result<(), PageError>;

    /// Native click on the first visible control with `role` whose accessible name matches `pattern`.
    ///
    /// With a `scope`, only descendants of the first element matching it are considered
    /// (and a missing scope root means no click). The same holds for the other `scope`d lookups.
    async fn click_role(&self, scope: Option<&str>, role: &str, pattern: &str) -> Result<bool, PageError>;

    /// Forced click on the innermost visible `candidates` element whose text matches `pattern`.
    async fn click_text(&self, scope: Option<&str>, candidates: &str, pattern: &str) -> Result<bool, PageError>;

    /// `el.click()` on the first button whose case-folded text contains any needle.
    async fn click_by_needles(&self, scope: Option<&str>, needles: &[&str]) -> Result<bool, PageError>;

    async fn fields(&self, selector: &str) -> Result<Vec<FieldInfo>, PageError>;

    /// Text of `label[for=id]`, trimmed.
    async fn label_for(&self, id: &str) -> Result<Option<String>, PageError>;

    async fn fill(&self, selector: &str, index: usize, value: &str) -> Result<(), PageError>;

    /// Select the option whose label equals `label` (case-insensitive). `Ok(false)` if none.
    async fn select_option(&self, selector: &str, index: usize, label: &str) -> Result<bool, PageError>;

    async fn count(&self, selector: &str) -> Result<usize, PageError> {
        Ok(self.visibility(selector).await?.len())
    }

    async fn is_visible(&self, selector: &str, index: usize) -> Result<bool, PageError> {
        Ok(self
            .visibility(selector)
            .await?
            .get(index)
            .copied()
            .unwrap_or(false))
    }

    async fn first_visible(&self, selector: &str) -> Result<Option<usize>, PageError> {
        Ok(self.visibility(selector).await?.iter().position(|v| *v))
    }

    async fn any_visible(&self, selector: &str) -> Result<bool, PageError> {
        Ok(self.first_visible(selector).await?.is_some())
    }

    /// Poll until some match is visible. Always checks at least once.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<bool, PageError> {
        let start = std::time::Instant::now();
        loop {
            if self.any_visible(selector).await? {
                return Ok(true);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(false);
            }
            let remaining = timeout - elapsed;
            tokio::time::sleep(remaining.min(Duration::from_millis(250))).await;
        }
    }
}

// ── CDP implementation ───────────────────────────────────────────────────────

const VISIBLE_FN: &str = r#"const __vis = (el) => {
    if (!el || !el.isConnected) return false;
    const s = window.getComputedStyle(el);
    if (s.visibility === 'hidden' || s.display === 'none') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
};"#;

const TARGET_ATTR: &str = "data-jobscout-target";

/// Button-like elements: what a modal action can be.
pub const BUTTON_CANDIDATES: &str = "button, [role='button']";
/// Anything that commonly carries clickable text.
pub const TEXT_CANDIDATES: &str = "button, a, span, div, label, li";

fn js(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// JS statement binding `root` to the scope element (or `document`), bailing out with `false`.
fn root_js(scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!(
            "const root = document.querySelector({}); if (!root) return false;",
            js(scope)
        ),
        None => "const root = document;".to_string(),
    }
}

/// [`PageDriver`] over a live chromiumoxide page.
#[derive(Debug, Clone)]
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn inner(&self) -> &Page {
        &self.page
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, PageError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| PageError::Script(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| PageError::Script(e.to_string()))
    }

    /// Native click on whatever element a marking script tagged with [`TARGET_ATTR`].
    async fn click_marked(&self) -> Result<bool, PageError> {
        let selector = format!("[{}]", TARGET_ATTR);
        let result = async {
            let el = self
                .page
                .find_element(selector.as_str())
                .await
                .map_err(|e| PageError::Element(e.to_string()))?;
            el.click()
                .await
                .map_err(|e| PageError::Element(e.to_string()))?;
            Ok::<bool, PageError>(true)
        }
        .await;
        let _: Option<bool> = self
            .eval(format!(
                "(() => {{ document.querySelectorAll('[{a}]').forEach(e => e.removeAttribute('{a}')); return true; }})()",
                a = TARGET_ATTR
            ))
            .await
            .ok();
        result
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| PageError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if let Err(e) = wait_until_stable(&self.page, 500, 5_000).await {
            debug!("goto {}: settle wait failed: {}", url, e);
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        self.page
            .url()
            .await
            .map(|u| u.unwrap_or_default())
            .map_err(|e| PageError::Script(e.to_string()))
    }

    async fn visibility(&self, selector: &str) -> Result<Vec<bool>, PageError> {
        self.eval(format!(
            "(() => {{ {vis} return Array.from(document.querySelectorAll({sel})).map(__vis); }})()",
            vis = VISIBLE_FN,
            sel = js(selector)
        ))
        .await
    }

    async fn inner_text(&self, selector: &str, index: usize) -> Result<Option<String>, PageError> {
        self.eval(format!(
            "(() => {{ const el = document.querySelectorAll({sel})[{index}]; return el ? (el.innerText || el.textContent || '') : null; }})()",
            sel = js(selector)
        ))
        .await
    }

    async fn click(&self, selector: &str, index: usize, mode: ClickMode) -> Result<bool, PageError> {
        match mode {
            ClickMode::Forced => {
                self.eval(format!(
                    "(() => {{ const el = document.querySelectorAll({sel})[{index}]; if (!el) return false; el.click(); return true; }})()",
                    sel = js(selector)
                ))
                .await
            }
            ClickMode::Native => {
                let elements = self
                    .page
                    .find_elements(selector)
                    .await
                    .map_err(|e| PageError::Element(e.to_string()))?;
                let Some(el) = elements.get(index) else {
                    return Ok(false);
                };
                el.click()
                    .await
                    .map_err(|e| PageError::Element(e.to_string()))?;
                Ok(true)
            }
        }
    }

    async fn click_within(&self, parent: &str, index: usize, child: &str) -> Result<bool, PageError> {
        let marked: bool = self
            .eval(format!(
                "(() => {{ {vis} const p = document.querySelectorAll({parent})[{index}]; if (!p) return false; const c = Array.from(p.querySelectorAll({child})).find(__vis); if (!c) return false; c.setAttribute('{attr}', '1'); return true; }})()",
                vis = VISIBLE_FN,
                parent = js(parent),
                child = js(child),
                attr = TARGET_ATTR
            ))
            .await?;
        if !marked {
            return Ok(false);
        }
        self.click_marked().await
    }

    async fn attribute_within(
        &self,
        parent: &str,
        index: usize,
        child: &str,
        attribute: &str,
    ) -> Result<Option<String>, PageError> {
        self.eval(format!(
            "(() => {{ const p = document.querySelectorAll({parent})[{index}]; if (!p) return null; const c = p.querySelector({child}); return c ? c.getAttribute({attr}) : null; }})()",
            parent = js(parent),
            child = js(child),
            attr = js(attribute)
        ))
        .await
    }

    async fn scroll_into_view(&self, selector: &str, index: usize) -> Result<(), PageError> {
        let _: bool = self
            .eval(format!(
                "(() => {{ const el = document.querySelectorAll({sel})[{index}]; if (!el) return false; el.scrollIntoView({{block: 'center'}}); return true; }})()",
                sel = js(selector)
            ))
            .await?;
        Ok(())
    }

    async fn scroll_list(&self, container: Option<&str>) -> Result<(), PageError> {
        let sel = container.map(js).unwrap_or_else(|| "null".to_string());
        let _: bool = self
            .eval(format!(
                "(() => {{ const s = {sel}; const c = s ? document.querySelector(s) : null; if (c) {{ c.scrollBy(0, 500); }} else {{ window.scrollBy(0, 500); }} return true; }})()"
            ))
            .await?;
        Ok(())
    }

    async fn click_role(&self, scope: Option<&str>, role: &str, pattern: &str) -> Result<bool, PageError> {
        let candidates = if role == "button" {
            BUTTON_CANDIDATES.to_string()
        } else {
            format!("[role='{}']", role)
        };
        let marked: bool = self
            .eval(format!(
                r#"(() => {{
                    {vis}
                    {root}
                    const re = new RegExp({pat}, 'i');
                    const name = (el) => {{
                        const aria = el.getAttribute('aria-label');
                        if (aria) return aria.trim();
                        const by = el.getAttribute('aria-labelledby');
                        if (by) {{
                            const t = by.split(/\s+/).map(id => document.getElementById(id)).filter(Boolean).map(n => n.innerText).join(' ');
                            if (t.trim()) return t.trim();
                        }}
                        return (el.innerText || el.value || el.title || '').trim();
                    }};
                    const el = Array.from(root.querySelectorAll({cand})).find(e => __vis(e) && re.test(name(e)));
                    if (!el) return false;
                    el.setAttribute('{attr}', '1');
                    return true;
                }})()"#,
                vis = VISIBLE_FN,
                root = root_js(scope),
                pat = js(pattern),
                cand = js(&candidates),
                attr = TARGET_ATTR
            ))
            .await?;
        if !marked {
            return Ok(false);
        }
        self.click_marked().await
    }

    async fn click_text(&self, scope: Option<&str>, candidates: &str, pattern: &str) -> Result<bool, PageError> {
        self.eval(format!(
            r#"(() => {{
                {vis}
                {root}
                const re = new RegExp({pat}, 'i');
                const hits = Array.from(root.querySelectorAll({cand}))
                    .filter(e => __vis(e) && re.test((e.innerText || '').trim()));
                const leaf = hits.find(e => !hits.some(o => o !== e && e.contains(o)));
                if (!leaf) return false;
                leaf.click();
                return true;
            }})()"#,
            vis = VISIBLE_FN,
            root = root_js(scope),
            cand = js(candidates),
            pat = js(pattern)
        ))
        .await
    }

    async fn click_by_needles(&self, scope: Option<&str>, needles: &[&str]) -> Result<bool, PageError> {
        let needles = serde_json::to_string(needles).map_err(|e| PageError::Script(e.to_string()))?;
        self.eval(format!(
            "(() => {{ {root} const n = {needles}; const b = Array.from(root.querySelectorAll('button')).find(el => {{ const t = (el.textContent || '').toLowerCase(); return n.some(x => t.includes(x)); }}); if (!b) return false; b.click(); return true; }})()",
            root = root_js(scope)
        ))
        .await
    }

    async fn fields(&self, selector: &str) -> Result<Vec<FieldInfo>, PageError> {
        self.eval(format!(
            r#"(() => {{
                {vis}
                return Array.from(document.querySelectorAll({sel})).map((el, index) => {{
                    const isSelect = el.tagName === 'SELECT';
                    let options = [];
                    let placeholder_selected = false;
                    if (isSelect) {{
                        options = Array.from(el.options).filter(o => o.value && o.text.trim()).map(o => o.text.trim());
                        const first = el.options[0];
                        placeholder_selected = el.selectedIndex <= 0 && !!first &&
                            (!first.value || /^(select|selecciona)/i.test(first.text.trim()));
                    }}
                    return {{
                        index,
                        id: el.id || '',
                        aria_label: el.getAttribute('aria-label') || '',
                        value: el.value || '',
                        visible: __vis(el),
                        options,
                        placeholder_selected,
                    }};
                }});
            }})()"#,
            vis = VISIBLE_FN,
            sel = js(selector)
        ))
        .await
    }

    async fn label_for(&self, id: &str) -> Result<Option<String>, PageError> {
        self.eval(format!(
            "(() => {{ const l = document.querySelector('label[for=\"' + CSS.escape({id}) + '\"]'); return l ? l.innerText.trim() : null; }})()",
            id = js(id)
        ))
        .await
    }

    async fn fill(&self, selector: &str, index: usize, value: &str) -> Result<(), PageError> {
        let ok: bool = self
            .eval(format!(
                r#"(() => {{
                    const el = document.querySelectorAll({sel})[{index}];
                    if (!el) return false;
                    el.focus();
                    const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
                    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {val});
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    el.blur();
                    return true;
                }})()"#,
                sel = js(selector),
                val = js(value)
            ))
            .await?;
        if ok {
            Ok(())
        } else {
            Err(PageError::Element(format!("no element {}[{}] to fill", selector, index)))
        }
    }

    async fn select_option(&self, selector: &str, index: usize, label: &str) -> Result<bool, PageError> {
        self.eval(format!(
            r#"(() => {{
                const el = document.querySelectorAll({sel})[{index}];
                if (!el || el.tagName !== 'SELECT') return false;
                const want = {label}.trim().toLowerCase();
                const opt = Array.from(el.options).find(o => o.text.trim().toLowerCase() === want);
                if (!opt) return false;
                el.value = opt.value;
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js(selector),
            label = js(label)
        ))
        .await
    }
}

// ── Scripted in-memory page ──────────────────────────────────────────────────

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
