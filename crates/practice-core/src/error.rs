//! Error types for the practice pipeline.
//!
//! Three layers of errors live here:
//!
//! - [`PracticeError`] covers configuration loading and local I/O.
//! - [`CompletionError`] classifies failures at the completion-service boundary.
//! - [`GenerationError`] is the terminal, caller-facing error of the generation
//!   path, tagged with a [`GenerationErrorCode`].
//!
//! Grading never produces an error; failures there are folded into the graded
//! result itself (see [`crate::grading`]).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A specialized `Result` type for configuration and I/O operations.
pub type Result<T> = std::result::Result<T, PracticeError>;

/// Errors raised while loading configuration or talking to the local system.
#[derive(Debug, thiserror::Error)]
pub enum PracticeError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your practice.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Completion Service Setup
    // ========================================================================
    /// The API key for the completion service is not set.
    #[error("Completion service API key not found in environment variable '{env_var}'\n\nSuggestion: Export {env_var} or set completion.apiKeyEnv in practice.json")]
    MissingApiKey {
        /// Name of the environment variable that was read.
        env_var: String,
    },

    /// The HTTP client for the completion service could not be built.
    #[error("Failed to initialize completion client: {0}")]
    ClientInit(String),

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PracticeError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `MissingApiKey` error.
    #[must_use]
    pub fn missing_api_key(env_var: impl Into<String>) -> Self {
        Self::MissingApiKey {
            env_var: env_var.into(),
        }
    }
}

// ============================================================================
// Completion boundary
// ============================================================================

/// Failures of a single call to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// The call did not finish within its time budget.
    #[error("completion request timed out after {timeout_secs}s")]
    Timeout {
        /// The budget that was exceeded, in seconds.
        timeout_secs: u64,
    },

    /// Connection-level failure before a response was received.
    #[error("network error: {0}")]
    Network(String),

    /// The service rejected the call for exceeding its rate limit.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// The service answered with a non-success status.
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The response could not be read as the expected structure.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Anything that does not fit the categories above.
    #[error("unexpected completion failure: {0}")]
    Other(String),
}

impl CompletionError {
    /// Creates a new `Api` error.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Returns `true` if repeating the same request may succeed.
    ///
    /// Timeouts, network failures, rate limits and malformed output are
    /// transient. Explicit API errors are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network(_) | Self::RateLimited(_) | Self::Malformed(_)
        )
    }

    /// Returns `true` if this is a rate-limit rejection.
    #[must_use]
    pub const fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

// ============================================================================
// Generation errors
// ============================================================================

/// Error codes surfaced to callers of the generation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationErrorCode {
    /// The requested topic or selection could not be resolved to a course.
    TopicAnalysisFailed,
    /// The completion service returned a non-retryable error status.
    ApiError,
    /// The completion output could not be parsed into valid questions.
    ParsingError,
    /// Timeout or connection failure.
    NetworkError,
    /// The completion service is throttling requests.
    RateLimit,
    /// Unclassified failure.
    UnknownError,
}

impl GenerationErrorCode {
    /// Whether the caller should offer the learner a manual retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ParsingError | Self::NetworkError | Self::RateLimit)
    }

    /// Human-readable message shown for this code.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::TopicAnalysisFailed => {
                "We couldn't match that topic to a course. Try choosing a course and units directly."
            }
            Self::ApiError => "The question service returned an error. Please try again later.",
            Self::ParsingError => {
                "The generated questions were incomplete. Please try generating them again."
            }
            Self::NetworkError => {
                "We couldn't reach the question service. Check your connection and try again."
            }
            Self::RateLimit => "Too many requests right now. Wait a moment and try again.",
            Self::UnknownError => "Something unexpected went wrong while creating your questions.",
        }
    }
}

impl std::fmt::Display for GenerationErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TopicAnalysisFailed => "TOPIC_ANALYSIS_FAILED",
            Self::ApiError => "API_ERROR",
            Self::ParsingError => "PARSING_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::RateLimit => "RATE_LIMIT",
            Self::UnknownError => "UNKNOWN_ERROR",
        };
        f.write_str(s)
    }
}

impl From<&CompletionError> for GenerationErrorCode {
    fn from(err: &CompletionError) -> Self {
        match err {
            CompletionError::Timeout { .. } | CompletionError::Network(_) => Self::NetworkError,
            CompletionError::RateLimited(_) => Self::RateLimit,
            CompletionError::Api { .. } => Self::ApiError,
            CompletionError::Malformed(_) => Self::ParsingError,
            CompletionError::Other(_) => Self::UnknownError,
        }
    }
}

/// Terminal failure of a generation request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct GenerationError {
    /// Classification of the failure.
    pub code: GenerationErrorCode,
    /// Message suitable for display to the learner.
    pub message: String,
    /// Whether the caller should offer a manual retry.
    pub retryable: bool,
    /// Number of completion calls made before giving up.
    pub attempts: u32,
    /// The last underlying failure, if one reached the completion boundary.
    #[source]
    pub cause: Option<CompletionError>,
}

impl GenerationError {
    /// Creates an error for the given code with its default message.
    #[must_use]
    pub fn new(code: GenerationErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            retryable: code.is_retryable(),
            attempts: 0,
            cause: None,
        }
    }

    /// Creates a `TOPIC_ANALYSIS_FAILED` error with a specific message.
    #[must_use]
    pub fn topic_analysis(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::new(GenerationErrorCode::TopicAnalysisFailed)
        }
    }

    /// Wraps the last completion failure after `attempts` calls.
    #[must_use]
    pub fn from_cause(cause: CompletionError, attempts: u32) -> Self {
        let code = GenerationErrorCode::from(&cause);
        Self {
            attempts,
            cause: Some(cause),
            ..Self::new(code)
        }
    }
}
