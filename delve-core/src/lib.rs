//! # Delve Core
//!
//! Core library for the Delve research agent.
//! Provides the LLM interface, structured completion with output repair,
//! configuration, the retrieval capability seam, and the goal-driven
//! research loop.

pub mod brain;
pub mod completion;
pub mod config;
pub mod error;
pub mod prompts;
pub mod providers;
pub mod research;
pub mod retrieval;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider, TokenCounter};
pub use completion::{ResponseKind, StructuredCompletion};
pub use config::{DelveConfig, LlmConfig, ResearchConfig, RetrievalBackend, RetrievalConfig};
pub use error::{ConfigError, DelveError, LlmError, Result, RetrievalError};
pub use research::{
    FollowUpGenerator, GoalEvaluation, ResearchController, ResearchGoal, ResearchObserver,
    ResearchParams, ResearchResult, ReportWriter,
};
pub use retrieval::{RetrievalService, RetrievedDocument, Scraper, SearchEngine};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
