use crate::nlp::resume::{ResumeRule, SalaryExpectations};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// JobscoutConfig — file-based config loader (jobscout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "JOBSCOUT_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_LINKEDIN_EMAIL: &str = "LINKEDIN_EMAIL";
pub const ENV_LINKEDIN_PASSWORD: &str = "LINKEDIN_PASSWORD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn field_or_env(field: &Option<String>, key: &str) -> Option<String> {
    field
        .as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| env_nonempty(key))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    let v = env_nonempty(key)?.to_ascii_lowercase();
    Some(matches!(v.as_str(), "1" | "true" | "yes" | "on"))
}

/// Scoring backend (`brain` key in jobscout.json). Any OpenAI-compatible endpoint.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct BrainConfig {
    /// e.g. `https://api.openai.com/v1` or `http://localhost:11434/v1` (Ollama).
    pub base_url: Option<String>,
    /// Never logged. An explicit `""` means the endpoint needs no key.
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// System prompt with the scoring rubric.
    pub prompt_path: Option<String>,
    /// Candidate profile document; also sent verbatim to the model.
    pub profile_path: Option<String>,
    pub max_tokens: Option<u32>,
}

impl BrainConfig {
    /// API key: JSON field (even empty) → `OPENAI_API_KEY` → `None`.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(k) = &self.api_key {
            return Some(k.trim().to_string());
        }
        env_nonempty("OPENAI_API_KEY")
    }

    /// Base URL: JSON field → `OPENAI_BASE_URL` → `https://api.openai.com/v1`.
    pub fn resolve_base_url(&self) -> String {
        field_or_env(&self.base_url, "OPENAI_BASE_URL")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
    }

    /// Model: JSON field → `JOBSCOUT_LLM_MODEL` → `gpt-4o-mini`.
    pub fn resolve_model(&self) -> String {
        field_or_env(&self.model, "JOBSCOUT_LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string())
    }

    pub fn resolve_prompt_path(&self) -> PathBuf {
        field_or_env(&self.prompt_path, "JOBSCOUT_PROMPT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("prompts/analyze_job.txt"))
    }

    pub fn resolve_profile_path(&self) -> PathBuf {
        field_or_env(&self.profile_path, "JOBSCOUT_PROFILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config/profile_config.json"))
    }

    pub fn resolve_max_tokens(&self) -> u32 {
        self.max_tokens
            .or_else(|| env_parse("JOBSCOUT_LLM_MAX_TOKENS"))
            .unwrap_or(800)
    }
}

/// Sweep tuning (`run` key).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct RunConfig {
    /// Cards processed per search page. Default: 5.
    pub job_limit: Option<usize>,
    /// Minimum match percentage kept in the report. Default: 30.
    pub match_threshold: Option<u8>,
    /// `f_TPR` value for the first search. Default: `r86400` (past 24h).
    pub short_window: Option<String>,
    /// `f_TPR` value when the first search yields nothing. Default: `r604800` (past week).
    pub wide_window: Option<String>,
    pub platform_origin: Option<String>,
}

impl RunConfig {
    pub fn resolve_job_limit(&self) -> usize {
        self.job_limit
            .or_else(|| env_parse("JOBSCOUT_JOB_LIMIT"))
            .unwrap_or(5)
    }

    pub fn resolve_match_threshold(&self) -> u8 {
        self.match_threshold
            .or_else(|| env_parse("JOBSCOUT_MATCH_THRESHOLD"))
            .unwrap_or(30)
    }

    pub fn resolve_short_window(&self) -> String {
        field_or_env(&self.short_window, "JOBSCOUT_SHORT_WINDOW")
            .unwrap_or_else(|| "r86400".to_string())
    }

    pub fn resolve_wide_window(&self) -> String {
        field_or_env(&self.wide_window, "JOBSCOUT_WIDE_WINDOW")
            .unwrap_or_else(|| "r604800".to_string())
    }

    pub fn resolve_platform_origin(&self) -> String {
        field_or_env(&self.platform_origin, "JOBSCOUT_PLATFORM_ORIGIN")
            .unwrap_or_else(|| crate::types::PLATFORM_ORIGIN.to_string())
    }
}

/// Filesystem layout (`paths` key).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct PathsConfig {
    pub dashboard_dir: Option<String>,
    pub reports_dir: Option<String>,
    pub browser_profile_dir: Option<String>,
    /// Status file, stop signal and run log. Must not sit under `dashboard_dir`.
    pub run_dir: Option<String>,
}

impl PathsConfig {
    pub fn resolve_dashboard_dir(&self) -> PathBuf {
        field_or_env(&self.dashboard_dir, "JOBSCOUT_DASHBOARD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("dashboard"))
    }

    pub fn resolve_reports_dir(&self) -> PathBuf {
        field_or_env(&self.reports_dir, "JOBSCOUT_REPORTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("reports"))
    }

    pub fn resolve_browser_profile_dir(&self) -> PathBuf {
        field_or_env(&self.browser_profile_dir, "JOBSCOUT_BROWSER_PROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("user_data"))
    }

    pub fn resolve_run_dir(&self) -> PathBuf {
        field_or_env(&self.run_dir, "JOBSCOUT_RUN_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("run"))
    }

    pub fn stop_signal_path(&self) -> PathBuf {
        self.resolve_run_dir().join("stop.signal")
    }

    /// Served through `/status.json`, not as a static file.
    pub fn status_path(&self) -> PathBuf {
        self.resolve_run_dir().join("status.json")
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.resolve_run_dir().join("run.log")
    }

    /// Kept outside the dashboard dir, which is served over HTTP.
    pub fn session_cookies_path(&self) -> PathBuf {
        self.resolve_browser_profile_dir().join("session_cookies.json")
    }
}

/// Browser launch options (`browser` key).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct BrowserSection {
    /// Default: `false`; the platform is far less suspicious of a visible window.
    pub headless: Option<bool>,
    pub executable: Option<String>,
}

impl BrowserSection {
    pub fn resolve_headless(&self) -> bool {
        self.headless
            .or_else(|| env_flag("JOBSCOUT_HEADLESS"))
            .unwrap_or(false)
    }

    /// Executable: JSON field → `CHROME_EXECUTABLE`; only returned when the path exists.
    pub fn executable_override(&self) -> Option<String> {
        let p = field_or_env(&self.executable, ENV_CHROME_EXECUTABLE)?;
        if Path::new(&p).exists() {
            Some(p)
        } else {
            tracing::warn!("browser executable override {} does not exist; ignoring", p);
            None
        }
    }
}

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ServerConfig {
    pub port: Option<u16>,
}

impl ServerConfig {
    /// `--port <n>` / `--port=<n>` → JSON field → `JOBSCOUT_PORT` → `PORT` → 8000.
    pub fn resolve_port(&self, args: &[String]) -> u16 {
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if let Some(v) = arg.strip_prefix("--port=") {
                if let Ok(p) = v.parse() {
                    return p;
                }
            } else if arg == "--port" {
                if let Some(Ok(p)) = iter.next().map(|v| v.parse()) {
                    return p;
                }
            }
        }
        self.port
            .or_else(|| env_parse("JOBSCOUT_PORT"))
            .or_else(|| env_parse("PORT"))
            .unwrap_or(8000)
    }
}

/// Top-level config loaded from `jobscout.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct JobscoutConfig {
    pub brain: BrainConfig,
    pub run: RunConfig,
    pub paths: PathsConfig,
    pub browser: BrowserSection,
    pub server: ServerConfig,
}

/// Load `jobscout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `JOBSCOUT_CONFIG` env var path
/// 2. `./jobscout.json`
/// 3. `config/jobscout.json`
///
/// Missing file → defaults (env-var fallbacks apply). Parse error → warning, defaults.
pub fn load_config() -> JobscoutConfig {
    let mut candidates = vec![
        PathBuf::from("jobscout.json"),
        PathBuf::from("config").join("jobscout.json"),
    ];
    if let Some(env_path) = env_nonempty(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match serde_json::from_str::<JobscoutConfig>(&contents) {
            Ok(cfg) => {
                tracing::info!("jobscout.json loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "jobscout.json parse error at {}: {}; using defaults",
                    path.display(),
                    e
                );
                JobscoutConfig::default()
            }
        };
    }

    JobscoutConfig::default()
}

/// Platform credentials from the environment. `None` means log in by hand.
pub fn linkedin_credentials() -> Option<(String, String)> {
    let email = env_nonempty(ENV_LINKEDIN_EMAIL)?;
    let password = env_nonempty(ENV_LINKEDIN_PASSWORD)?;
    if email.contains("CHANGE_ME") {
        return None;
    }
    Some((email, password))
}

// ---------------------------------------------------------------------------
// ProfileConfig — candidate profile (config/profile_config.json)
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ProfileConfig {
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default, alias = "locations")]
    pub location_preferences: Vec<String>,
    #[serde(default)]
    pub resume_rules: Vec<ResumeRule>,
    #[serde(default)]
    pub salary_expectations: SalaryExpectations,
    /// Raw document text, handed to the scoring backend as the candidate profile.
    #[serde(skip)]
    pub raw: String,
}

impl ProfileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let mut profile: ProfileConfig = serde_json::from_str(raw)?;
        profile.raw = raw.to_string();
        Ok(profile)
    }

    pub fn roles(&self) -> Vec<String> {
        if self.target_roles.is_empty() {
            vec!["Technical Lead".to_string()]
        } else {
            self.target_roles.clone()
        }
    }

    pub fn locations(&self) -> Vec<String> {
        if self.location_preferences.is_empty() {
            vec!["Bogotá".to_string()]
        } else {
            self.location_preferences.clone()
        }
    }
}
