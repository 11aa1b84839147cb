//! Resume and salary selection rules from the candidate profile.

use crate::core::types::Language;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

/// Salary used when the profile carries no `salary_expectations.default`.
pub const DEFAULT_SALARY: &str = "12000000";

/// One entry of `resume_rules`, in priority order.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResumeRule {
    pub file: String,
    /// `en` / `es`; absent means any language.
    pub language: Option<String>,
    /// Any one of these in the text selects the rule.
    pub keywords: Vec<String>,
    /// Every group needs at least one hit, e.g. `[["java","jvm"],["lead","architect"]]`.
    pub match_all: Vec<Vec<String>>,
}

impl ResumeRule {
    fn applies_to(&self, language: Language) -> bool {
        match &self.language {
            Some(lang) if !lang.trim().is_empty() => lang.trim().eq_ignore_ascii_case(language.as_str()),
            _ => true,
        }
    }

    fn satisfies_all_groups(&self, text: &str) -> bool {
        !self.match_all.is_empty()
            && self
                .match_all
                .iter()
                .all(|group| group.iter().any(|kw| text.contains(&kw.to_lowercase())))
    }

    fn hits_keyword(&self, text: &str) -> bool {
        self.keywords.iter().any(|kw| text.contains(&kw.to_lowercase()))
    }

    fn is_generic(&self) -> bool {
        self.match_all.is_empty()
            && (self.keywords.is_empty() || self.keywords.iter().any(|k| k == "general"))
    }
}

/// Resume file for a posting: first rule (config order) whose `match_all` or `keywords`
/// hit, else the last generic rule for the language, else the last rule.
pub fn resume_filename(
    rules: &[ResumeRule],
    role: &str,
    description: &str,
    language: Language,
) -> Option<String> {
    let text = format!("{} {}", role, description).to_lowercase();

    if let Some(rule) = rules
        .iter()
        .filter(|r| r.applies_to(language))
        .find(|r| r.satisfies_all_groups(&text) || r.hits_keyword(&text))
    {
        debug!("resume: matched {} ({})", rule.file, language);
        return Some(rule.file.clone());
    }

    rules
        .iter()
        .rev()
        .find(|r| r.is_generic() && r.applies_to(language))
        .or_else(|| rules.last())
        .map(|r| r.file.clone())
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SalaryValue {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SalaryRule {
    pub role_match: String,
    #[serde(default = "default_salary_language")]
    pub language: String,
    pub value: String,
}

fn default_salary_language() -> String {
    Language::Es.as_str().to_string()
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SalaryExpectations {
    pub default: Option<SalaryValue>,
    pub rules: Vec<SalaryRule>,
}

impl SalaryExpectations {
    /// First rule whose `role_match` is inside the role and whose language matches, else the default.
    pub fn for_role(&self, role: &str, language: Language) -> String {
        let role = role.to_lowercase();
        self.rules
            .iter()
            .find(|r| {
                role.contains(&r.role_match.to_lowercase())
                    && r.language.eq_ignore_ascii_case(language.as_str())
            })
            .map(|r| r.value.clone())
            .or_else(|| self.default.as_ref().map(|d| d.value.clone()))
            .unwrap_or_else(|| DEFAULT_SALARY.to_string())
    }
}

static SALARY_QUESTION: OnceLock<Regex> = OnceLock::new();

/// Whether a form question asks for a salary figure.
pub fn is_salary_question(label: &str) -> bool {
    SALARY_QUESTION
        .get_or_init(|| {
            Regex::new(r"(?i)(salary|salario|expectativa|compensation|pretensi[oó]n)")
                .expect("valid salary question pattern")
        })
        .is_match(label)
}
