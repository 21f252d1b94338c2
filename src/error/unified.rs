//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidApiKey,
    InsufficientQuota,
    RateLimitExceeded,
    ModelNotFound,
    InvalidRequest,
    ContentFiltered,
    ContextLengthExceeded,
    ServerError,
    Unknown,
}

impl ErrorCode {
    /// Map a provider error code string onto a known code.
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "invalid_api_key" => Self::InvalidApiKey,
            "insufficient_quota" => Self::InsufficientQuota,
            "rate_limit_exceeded" => Self::RateLimitExceeded,
            "model_not_found" => Self::ModelNotFound,
            "invalid_request_error" => Self::InvalidRequest,
            "content_filter" => Self::ContentFiltered,
            "context_length_exceeded" => Self::ContextLengthExceeded,
            "server_error" => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Registry,
    Serialization,
    OutputParse,
    Classification,
    ToolExecution,
    Unknown,
}

/// Structured details returned by a provider API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: Option<ErrorCode>,
    pub provider_code: Option<String>,
    pub error_type: Option<String>,
    pub param: Option<String>,
}

impl ErrorDetails {
    /// Decode an OpenAI-style `{"error": {...}}` body.
    pub fn from_body(body: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let error = value.get("error")?;
        let provider_code = error.get("code").and_then(|c| c.as_str()).map(String::from);
        Some(Self {
            code: provider_code.as_deref().map(ErrorCode::from_provider_code),
            provider_code,
            error_type: error.get("type").and_then(|t| t.as_str()).map(String::from),
            param: error.get("param").and_then(|p| p.as_str()).map(String::from),
        })
    }
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    RevisePrompt,
    CheckToolImplementation,
    ContactSupport,
}
