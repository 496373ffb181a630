//! Configuration system for Delve.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from the user config directory (`config.toml`) and/or
//! `.delve/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on research epochs regardless of requested depth.
pub const MAX_EPOCHS: usize = 5;

/// Top-level configuration for a Delve session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub research: ResearchConfig,
    pub retrieval: RetrievalConfig,
    pub output: OutputConfig,
}

impl DelveConfig {
    /// Collect warnings from every section.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        warnings.extend(self.research.validate());
        warnings
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai", "deepseek", "openrouter", "gemini", "ollama",
    /// or any other OpenAI-compatible endpoint name.
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o", "deepseek-chat").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Inline API key. Takes precedence over `api_key_env`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Context window size for the model.
    pub context_window: usize,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 8192,
            temperature: 0.7,
            context_window: 128_000,
            timeout_secs: 180,
        }
    }
}

impl LlmConfig {
    /// Known endpoint and key variable for a provider name.
    pub fn preset(provider: &str) -> Option<(&'static str, &'static str)> {
        match provider {
            "openai" => Some(("https://api.openai.com/v1", "OPENAI_API_KEY")),
            "deepseek" => Some(("https://api.deepseek.com/v1", "DEEPSEEK_API_KEY")),
            "openrouter" => Some(("https://openrouter.ai/api/v1", "OPENROUTER_API_KEY")),
            "gemini" => Some((
                "https://generativelanguage.googleapis.com/v1beta/openai",
                "GEMINI_API_KEY",
            )),
            "ollama" => Some(("http://localhost:11434/v1", "OLLAMA_API_KEY")),
            _ => None,
        }
    }

    /// Base URL to call: explicit override, then provider preset, then OpenAI.
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .or_else(|| Self::preset(&self.provider).map(|(url, _)| url.to_string()))
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
    }

    /// Switch provider, adopting its preset key variable when the current one
    /// is still another preset's default.
    pub fn set_provider(&mut self, provider: &str) {
        let current_is_preset_default = Self::preset(&self.provider)
            .map(|(_, env)| env == self.api_key_env)
            .unwrap_or(false);
        self.provider = provider.to_string();
        if current_is_preset_default && let Some((_, env)) = Self::preset(provider) {
            self.api_key_env = env.to_string();
        }
    }

    /// Return configuration warnings. Never fails.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.model.trim().is_empty() {
            warnings.push("llm.model is empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            warnings.push(format!(
                "llm.temperature {} is outside the usual 0.0-2.0 range",
                self.temperature
            ));
        }
        if self.api_key.is_none()
            && self.provider != "ollama"
            && std::env::var(&self.api_key_env).is_err()
        {
            warnings.push(format!(
                "environment variable {} is not set",
                self.api_key_env
            ));
        }
        warnings
    }
}

/// Retry policy for transient completion failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Knobs for the research loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Planned queries per epoch.
    pub breadth: usize,
    /// Requested depth; clamped into `1..=MAX_EPOCHS`.
    pub depth: usize,
    /// Simultaneous retrieval pipelines.
    pub concurrency: usize,
    pub results_per_query: usize,
    pub learnings_per_query: usize,
    pub follow_ups_per_query: usize,
    /// How many trailing learnings the planner sees.
    pub recent_learnings_window: usize,
    /// Pause after each serialized extraction call.
    pub extraction_pause_ms: u64,
    /// Token cap per scraped document fed to extraction.
    pub content_token_limit: usize,
    /// Token cap on the learnings fed to the report writer.
    pub report_token_limit: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            breadth: 4,
            depth: 2,
            concurrency: 2,
            results_per_query: 5,
            learnings_per_query: 5,
            follow_ups_per_query: 2,
            recent_learnings_window: 10,
            extraction_pause_ms: 1000,
            content_token_limit: 25_000,
            report_token_limit: 150_000,
        }
    }
}

impl ResearchConfig {
    /// Epoch budget derived from `depth`.
    pub fn max_epochs(&self) -> usize {
        clamp_epochs(self.depth)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.breadth == 0 {
            warnings.push("research.breadth is 0; one query per epoch will be used".to_string());
        }
        if self.concurrency == 0 {
            warnings.push("research.concurrency is 0; treated as 1".to_string());
        }
        if self.depth > MAX_EPOCHS {
            warnings.push(format!(
                "research.depth {} exceeds the maximum of {} epochs",
                self.depth, MAX_EPOCHS
            ));
        }
        warnings
    }
}

/// Clamp a depth input into the supported epoch range.
pub fn clamp_epochs(depth: usize) -> usize {
    depth.clamp(1, MAX_EPOCHS)
}

/// Retrieval backend selection. Chosen once when the service is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalBackend {
    /// DuckDuckGo HTML search + direct HTTP scraping. Needs no API key.
    #[default]
    Duckduckgo,
    /// Serper search + direct HTTP scraping.
    Serper,
    /// Serper search + Serper scrape endpoint.
    SerperOnly,
    /// Firecrawl search with inline scraping.
    Firecrawl,
}

impl std::fmt::Display for RetrievalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalBackend::Duckduckgo => write!(f, "duckduckgo"),
            RetrievalBackend::Serper => write!(f, "serper"),
            RetrievalBackend::SerperOnly => write!(f, "serper_only"),
            RetrievalBackend::Firecrawl => write!(f, "firecrawl"),
        }
    }
}

impl std::str::FromStr for RetrievalBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "duckduckgo" | "ddg" => Ok(RetrievalBackend::Duckduckgo),
            "serper" => Ok(RetrievalBackend::Serper),
            "serper_only" => Ok(RetrievalBackend::SerperOnly),
            "firecrawl" => Ok(RetrievalBackend::Firecrawl),
            other => Err(format!(
                "unknown retrieval backend '{other}' (expected duckduckgo, serper, serper_only, firecrawl)"
            )),
        }
    }
}

/// Search and scrape backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub backend: RetrievalBackend,
    pub serper_api_key_env: String,
    pub firecrawl_api_key_env: String,
    pub firecrawl_base_url: String,
    pub request_timeout_secs: u64,
    /// Characters kept from each scraped page.
    pub max_content_chars: usize,
    pub user_agent: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: RetrievalBackend::default(),
            serper_api_key_env: "SERPER_API_KEY".to_string(),
            firecrawl_api_key_env: "FIRECRAWL_API_KEY".to_string(),
            firecrawl_base_url: "https://api.firecrawl.dev".to_string(),
            request_timeout_secs: 20,
            max_content_chars: 100_000,
            user_agent: format!("delve/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Where reports and logs are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for `output_<timestamp>.txt` reports. Defaults to the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,
    /// Directory for rolling JSON logs. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "delve", "delve")
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default directory for rolling log files.
pub fn default_log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_local_dir().join("logs"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `DELVE_`)
/// 3. Workspace-local config (`.delve/config.toml`)
/// 4. User config (`<config dir>/delve/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&DelveConfig>,
) -> Result<DelveConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(DelveConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".delve").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // DELVE_LLM__MODEL, DELVE_RESEARCH__BREADTH, ...
    figment = figment.merge(Env::prefixed("DELVE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether any Delve configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".delve").join("config.toml").exists())
}
