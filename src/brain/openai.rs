//! OpenAI-compatible `/chat/completions` client (OpenAI, Gemini's OpenAI endpoint,
//! Ollama, LM Studio, ...).

use super::{match_option, parse_analysis, BrainError, ScoringBackend};
use crate::core::config::BrainConfig;
use crate::core::types::JobAnalysis;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const FALLBACK_ANALYZE_PROMPT: &str = "You are a recruiter screening job postings for the candidate \
profile below. Reply ONLY with a JSON object with the keys \"match_percentage\" (0-100), \
\"priority_score\" (1-5) and \"analysis\" (two sentences).";

const ANSWER_PROMPT: &str = "You fill in job application forms on behalf of the candidate \
profile below. Reply with the answer value only: no explanation, no quotes. Numeric questions \
get a bare number.";

/// Retry schedule for HTTP 429.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiBrain {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    analyze_prompt: String,
    profile: String,
    retry: RetryPolicy,
}

impl OpenAiBrain {
    /// Build from config. `profile` is the candidate profile document sent with every request.
    pub fn from_config(
        client: reqwest::Client,
        cfg: &BrainConfig,
        profile: String,
    ) -> Result<Self, BrainError> {
        let api_key = cfg.resolve_api_key().ok_or_else(|| {
            BrainError::Config("no API key; set brain.api_key or OPENAI_API_KEY".into())
        })?;
        let prompt_path = cfg.resolve_prompt_path();
        let analyze_prompt = match std::fs::read_to_string(&prompt_path) {
            Ok(p) if !p.trim().is_empty() => p,
            Ok(_) | Err(_) => {
                warn!(
                    "brain: prompt {} unavailable, using the built-in one",
                    prompt_path.display()
                );
                FALLBACK_ANALYZE_PROMPT.to_string()
            }
        };
        let brain = Self::new(client, &cfg.resolve_base_url(), api_key, cfg.resolve_model(), profile)
            .with_prompt(analyze_prompt)
            .with_max_tokens(cfg.resolve_max_tokens());
        info!("brain: {} via {}", brain.model, brain.endpoint);
        Ok(brain)
    }

    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: String,
        model: String,
        profile: String,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
            max_tokens: 800,
            analyze_prompt: FALLBACK_ANALYZE_PROMPT.to_string(),
            profile,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: String) -> Self {
        self.analyze_prompt = prompt;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<String, BrainError> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(BrainError::RateLimited);
        }
        if !status.is_success() {
            return Err(BrainError::Status(status.as_u16()));
        }
        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| BrainError::Parse("empty completion".into()))
    }

    /// One chat completion. Only 429 is retried; everything else fails at once.
    pub(crate) async fn chat(&self, system: &str, user: &str) -> Result<String, BrainError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.2,
            max_tokens: self.max_tokens,
        };
        let attempts = AtomicU32::new(0);
        let max_retries = self.retry.max_retries;

        retry(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(self.retry.initial_interval)
                .with_multiplier(2.0)
                .with_randomization_factor(0.25)
                .with_max_interval(self.retry.initial_interval * 2u32.pow(max_retries.min(8)))
                .with_max_elapsed_time(None)
                .build(),
            || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                match self.send_once(&body).await {
                    Ok(content) => Ok(content),
                    Err(BrainError::RateLimited) if attempt < max_retries => {
                        warn!("brain: rate limited, retry {}/{}", attempt + 1, max_retries);
                        Err(backoff::Error::transient(BrainError::RateLimited))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            },
        )
        .await
    }

    fn system_with_profile(&self, prompt: &str) -> String {
        format!("{}\n\nCANDIDATE PROFILE:\n{}", prompt.trim(), self.profile)
    }
}

#[async_trait]
impl ScoringBackend for OpenAiBrain {
    async fn score(&self, job_text: &str) -> Option<JobAnalysis> {
        let system = self.system_with_profile(&self.analyze_prompt);
        let reply = match self.chat(&system, job_text).await {
            Ok(r) => r,
            Err(e) => {
                warn!("brain: scoring failed: {}", e);
                return None;
            }
        };
        match parse_analysis(&reply) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!("brain: {}", e);
                debug!("brain: raw reply: {}", reply);
                None
            }
        }
    }

    async fn answer(&self, question: &str, options: Option<&[String]>) -> Option<String> {
        let system = self.system_with_profile(ANSWER_PROMPT);
        let user = match options {
            Some(opts) if !opts.is_empty() => format!(
                "Question: {}\nOptions:\n{}\nReply with exactly one of the options.",
                question,
                opts.iter().map(|o| format!("- {}", o)).collect::<Vec<_>>().join("\n")
            ),
            _ => format!("Question: {}", question),
        };
        let reply = match self.chat(&system, &user).await {
            Ok(r) => r,
            Err(e) => {
                warn!("brain: answering {:?} failed: {}", question, e);
                return None;
            }
        };
        match options {
            Some(opts) if !opts.is_empty() => {
                let picked = match_option(&reply, opts);
                if picked.is_none() {
                    debug!("brain: reply {:?} names none of the options", reply);
                }
                picked
            }
            _ => {
                let text = reply.trim().trim_matches('"').trim().to_string();
                (!text.is_empty()).then_some(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Local completions endpoint that answers 429 `throttle` times, then `reply`.
    async fn serve(throttle: usize, reply: &'static str) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    move |State(hits): State<Arc<AtomicUsize>>, _body: Json<serde_json::Value>| async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        if n < throttle {
                            return Err(StatusCode::TOO_MANY_REQUESTS);
                        }
                        Ok(Json(serde_json::json!({
                            "choices": [{"message": {"role": "assistant", "content": reply}}]
                        })))
                    },
                ),
            )
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/v1", addr), hits)
    }

    fn brain(base: &str) -> OpenAiBrain {
        OpenAiBrain::new(
            reqwest::Client::new(),
            base,
            String::new(),
            "test-model".into(),
            "{\"target_roles\": [\"Tech Lead\"]}".into(),
        )
        .with_retry(RetryPolicy {
            initial_interval: Duration::from_millis(5),
            max_retries: 3,
        })
    }

    #[tokio::test]
    async fn retries_rate_limits_then_scores() {
        let (base, hits) =
            serve(2, "```json\n{\"match_percentage\": 81, \"priority_score\": 5}\n```").await;
        let analysis = brain(&base).score("PUBLICATION DATE: 1 day ago\n\nRust").await.unwrap();
        assert_eq!(analysis.match_percentage, 81);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_retries() {
        let (base, hits) = serve(10, "{}").await;
        assert!(brain(&base).score("anything").await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn answers_map_onto_options() {
        let (base, _) = serve(0, "Yes").await;
        let options = vec!["Yes".to_string(), "No".to_string()];
        let b = brain(&base);
        assert_eq!(b.answer("Do you need sponsorship?", Some(&options)).await.as_deref(), Some("Yes"));
        assert_eq!(b.answer("Years of Rust?", None).await.as_deref(), Some("Yes"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_none() {
        let b = brain("http://127.0.0.1:9/v1");
        assert!(b.score("x").await.is_none());
    }
}
