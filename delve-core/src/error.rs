//! Error types for the Delve research core.
//!
//! Uses `thiserror` for public API error types. Research collaborators
//! convert these into local fallback values; only the transport and
//! construction layers surface them to callers.

/// Top-level error type for the Delve core library.
#[derive(Debug, thiserror::Error)]
pub enum DelveError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// Errors from search and scrape backends.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Search via {engine} failed: {message}")]
    Search { engine: String, message: String },

    #[error("Scrape of {url} failed: {message}")]
    Scrape { url: String, message: String },

    #[error("Retrieval backend misconfigured: {message}")]
    Configuration { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `DelveError`.
pub type Result<T> = std::result::Result<T, DelveError>;
