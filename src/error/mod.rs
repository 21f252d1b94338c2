//! Error types for parley.

pub mod unified;

pub use unified::{ErrorCategory, ErrorCode, ErrorDetails, RecoverySuggestion};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::types::Message;

/// Substrings providers put in error text when they are applying backpressure
/// without a structured 429.
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "please wait and try again later.",
    "rate limit is exceeded.",
    "rate limit",
    "rate_limit",
    "too many requests",
];

/// Primary error type for all parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<ErrorDetails>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Function '{name}' is not registered on prompt '{prompt}'")]
    FunctionNotFound { prompt: String, name: String },

    #[error("Function '{0}' has no linked implementation")]
    FunctionNotLinked(String),

    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Output parse error: {message}")]
    OutputParse {
        message: String,
        /// Every failed response produced before giving up, oldest first.
        attempts: Vec<Arc<Message>>,
    },

    #[error("Classification error: {message}")]
    Classification {
        message: String,
        top_probs: HashMap<String, f64>,
    },

    #[error("Tool execution error in {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Agent exhausted {max_interrupt_times} interrupt rounds without a final response")]
    InterruptBudgetExhausted { max_interrupt_times: usize },

    #[error("Template error in '{path}': {message}")]
    Template { path: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ParleyError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            source: None,
            details: None,
        }
    }

    /// Create an API error with full details.
    pub fn api_with_details(status: u16, message: impl Into<String>, details: ErrorDetails) -> Self {
        Self::Api {
            status,
            message: message.into(),
            source: None,
            details: Some(details),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_)
            | Self::UnsupportedOperation(_)
            | Self::InvalidArgument(_)
            | Self::Template { .. } => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ModelNotFound(_)
            | Self::PromptNotFound(_)
            | Self::FunctionNotFound { .. }
            | Self::FunctionNotLinked(_)
            | Self::DuplicateRegistration(_) => ErrorCategory::Registry,
            Self::OutputParse { .. } => ErrorCategory::OutputParse,
            Self::Classification { .. } => ErrorCategory::Classification,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Io(_) | Self::Provider { .. } => ErrorCategory::Network,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error signals provider backpressure.
    ///
    /// Falls back to matching the error text, since some gateways report
    /// throttling inside ordinary error bodies.
    pub fn is_rate_limit(&self) -> bool {
        if self.category() == ErrorCategory::RateLimit {
            return true;
        }
        if !self.is_transport() {
            return false;
        }
        let text = self.to_string().to_lowercase();
        RATE_LIMIT_PATTERNS.iter().any(|p| text.contains(p))
    }

    /// Whether this error came from the call transport rather than from
    /// configuration or the model's output.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
                | ErrorCategory::Api
                | ErrorCategory::Serialization
        )
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
                | ErrorCategory::OutputParse
                | ErrorCategory::Classification
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Network => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Server => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Configuration | ErrorCategory::Registry => {
                RecoverySuggestion::CheckConfiguration
            }
            ErrorCategory::OutputParse | ErrorCategory::Classification => {
                RecoverySuggestion::RevisePrompt
            }
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ParleyError>;
