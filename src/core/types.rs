use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder for any field the extractor could not resolve.
pub const UNKNOWN: &str = "Unknown";

/// Origin used to absolutize relative job links.
pub const PLATFORM_ORIGIN: &str = "https://www.linkedin.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkMode {
    Remote,
    Hybrid,
    #[serde(rename = "On-site")]
    OnSite,
    #[default]
    Unknown,
}

impl WorkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkMode::Remote => "Remote",
            WorkMode::Hybrid => "Hybrid",
            WorkMode::OnSite => "On-site",
            WorkMode::Unknown => UNKNOWN,
        }
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered posting. `url` is the identity key; everything else is best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub work_mode: WorkMode,
    pub posted_age: String,
    pub description: String,
    pub requirements_excerpt: String,
}

impl JobRecord {
    /// A record with every best-effort field at its default.
    pub fn unknown(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: UNKNOWN.to_string(),
            company: UNKNOWN.to_string(),
            location: UNKNOWN.to_string(),
            work_mode: WorkMode::Unknown,
            posted_age: UNKNOWN.to_string(),
            description: String::new(),
            requirements_excerpt: String::new(),
        }
    }
}

/// Canonical job URL: query string dropped, relative paths absolutized.
///
/// Idempotent: `canonical_job_url(&canonical_job_url(u)) == canonical_job_url(u)`.
pub fn canonical_job_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_query = trimmed.split('?').next().unwrap_or_default();
    if without_query.starts_with('/') {
        format!("{}{}", PLATFORM_ORIGIN, without_query)
    } else {
        without_query.to_string()
    }
}

/// Detected content language of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision input for one application attempt. Resolved before the flow starts.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    pub role: String,
    pub description: String,
    pub target_resume_filename: Option<String>,
    pub salary_expectation: Option<String>,
    pub language: Language,
}

/// Terminal result of a single application attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowOutcome {
    Submitted,
    Manual,
    Error(String),
}

impl FlowOutcome {
    /// Label written to the report's `Application Status` column.
    pub fn status_label(&self) -> String {
        match self {
            FlowOutcome::Submitted => "Applied (Success)".to_string(),
            FlowOutcome::Manual => "Applied (Manual Needed)".to_string(),
            FlowOutcome::Error(reason) => format!("Error: {}", reason),
        }
    }
}

/// Fit analysis returned by the scoring backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAnalysis {
    pub match_percentage: u8,
    pub priority_score: u8,
    #[serde(default)]
    pub analysis: String,
}

/// Compact match entry kept in the status ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub role: String,
    pub company: String,
    pub location: String,
    pub score: u8,
    pub url: String,
    pub work_mode: String,
    pub date: String,
}

impl MatchSummary {
    pub fn from_record(record: &JobRecord, role: &str, score: u8) -> Self {
        Self {
            role: role.to_string(),
            company: record.company.clone(),
            location: record.location.clone(),
            score,
            url: record.url.clone(),
            work_mode: record.work_mode.to_string(),
            date: record.posted_age.clone(),
        }
    }
}
