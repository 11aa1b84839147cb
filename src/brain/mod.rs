//! Scoring backend seam: fit analysis for a posting and short answers for form questions.
//!
//! `None` from either call means "skip": the caller moves on without a score or
//! leaves the field empty.

pub mod openai;

use crate::core::types::JobAnalysis;
use async_trait::async_trait;
use thiserror::Error;

pub use openai::{OpenAiBrain, RetryPolicy};

#[derive(Debug, Error)]
pub enum BrainError {
    #[error("brain is not configured: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("backend answered with status {0}")]
    Status(u16),

    #[error("unusable reply: {0}")]
    Parse(String),
}

#[async_trait]
pub trait ScoringBackend: Send + Sync {
    async fn score(&self, job_text: &str) -> Option<JobAnalysis>;

    async fn answer(&self, question: &str, options: Option<&[String]>) -> Option<String>;
}

/// Text handed to [`ScoringBackend::score`] for one posting.
pub fn score_input(posted_age: &str, description: &str) -> String {
    format!("PUBLICATION DATE: {}\n\n{}", posted_age, description)
}

/// Pull a [`JobAnalysis`] out of a model reply that may wrap the JSON in code
/// fences or prose. Percentages are clamped to 0-100, priority to 1-5.
pub fn parse_analysis(reply: &str) -> Result<JobAnalysis, BrainError> {
    let cleaned = reply.replace("```json", "").replace("```", "");
    let start = cleaned
        .find('{')
        .ok_or_else(|| BrainError::Parse("no JSON object in reply".into()))?;
    let end = cleaned
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| BrainError::Parse("unterminated JSON object".into()))?;
    let value: serde_json::Value = serde_json::from_str(&cleaned[start..=end])
        .map_err(|e| BrainError::Parse(e.to_string()))?;

    let number = |key: &str| -> Option<f64> {
        let v = value.get(key)?;
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().trim_end_matches('%').parse().ok()))
    };

    let match_percentage = number("match_percentage")
        .ok_or_else(|| BrainError::Parse("missing match_percentage".into()))?;
    let priority_score = number("priority_score").unwrap_or(1.0);
    let analysis = value
        .get("analysis")
        .map(|a| match a.as_str() {
            Some(s) => s.to_string(),
            None => a.to_string(),
        })
        .unwrap_or_default();

    Ok(JobAnalysis {
        match_percentage: match_percentage.round().clamp(0.0, 100.0) as u8,
        priority_score: priority_score.round().clamp(1.0, 5.0) as u8,
        analysis,
    })
}

/// Map a free-text reply onto one of the offered options, if it clearly names one.
pub fn match_option(reply: &str, options: &[String]) -> Option<String> {
    let reply = reply.trim().trim_matches(|c| c == '"' || c == '\'' || c == '.').trim();
    if reply.is_empty() {
        return None;
    }
    let lower = reply.to_lowercase();
    options
        .iter()
        .find(|o| o.trim().to_lowercase() == lower)
        .or_else(|| {
            options
                .iter()
                .filter(|o| !o.trim().is_empty() && lower.contains(&o.trim().to_lowercase()))
                .max_by_key(|o| o.trim().len())
        })
        .cloned()
}
