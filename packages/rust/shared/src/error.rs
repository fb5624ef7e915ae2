//! Error types for seoflow.
//!
//! Library crates use [`SeoflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Every variant maps to an [`ErrorKind`] so callers can pick the right
//! affordance: "fix your input" for validation failures, "try again" for
//! contract and integration failures, an admin alert for configuration.

use std::path::PathBuf;

/// Coarse failure class used to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing API key, CMS credentials, or unreadable config. Fatal.
    Configuration,
    /// Caller input is wrong or incomplete (ids, draft fields, hero image).
    Validation,
    /// The LLM broke its JSON contract.
    Contract,
    /// A business rule refused the operation (duplicate job, in-flight retry).
    Conflict,
    /// An upstream HTTP service answered with an error.
    Integration,
    /// Local storage or I/O failure.
    Internal,
}

/// Top-level error type for all seoflow operations.
#[derive(Debug, thiserror::Error)]
pub enum SeoflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed caller input.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A referenced record does not exist.
    #[error("{entity} not found: {message}")]
    NotFound {
        entity: &'static str,
        message: String,
    },

    /// The requesting user does not own the project.
    #[error("user {user_id} does not own project {project_id}")]
    Ownership { project_id: String, user_id: String },

    /// The hypothesis is stored under a different project.
    #[error(
        "hypothesis {hypothesis_id} belongs to project {actual_project_id}, not {expected_project_id}"
    )]
    CrossReference {
        hypothesis_id: String,
        expected_project_id: String,
        actual_project_id: String,
    },

    /// The model answered with nothing.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// The model answered with something that is not a JSON object.
    #[error("model response is not valid JSON: {message}")]
    InvalidJson { message: String },

    /// The JSON object does not have the requested shape (e.g. item count).
    #[error("unexpected response shape: {message}")]
    ResponseShape { message: String },

    /// A generated draft payload is missing required fields.
    #[error("incomplete draft payload: missing {missing}")]
    IncompletePayload { missing: String },

    /// Refinement was requested for a draft without a body.
    #[error("draft {draft_id} has no body to refine")]
    EmptyDraft { draft_id: String },

    /// A refinement response carried no body.
    #[error("refinement response is missing a non-empty body")]
    MissingBody,

    /// A refined body changed the heading structure of the draft.
    #[error("refined body changed heading structure: expected {expected:?}, got {actual:?}")]
    StructureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// No CMS connection is configured for the project.
    #[error("CMS integration is not configured: {message}")]
    IntegrationNotConfigured { message: String },

    /// The draft is missing a title or body and cannot be published.
    #[error("draft {draft_id} is incomplete: missing {missing}")]
    DraftIncomplete {
        draft_id: String,
        missing: &'static str,
    },

    /// No hero image was recorded for the draft.
    #[error("draft {draft_id} has no hero image")]
    MissingHeroImage { draft_id: String },

    /// A publish job for the draft is already queued or publishing.
    #[error("a publish job for draft {draft_id} is already in progress ({job_id})")]
    DuplicateJob { draft_id: String, job_id: String },

    /// The job is currently being published and cannot be changed.
    #[error("publish job {job_id} is currently publishing")]
    JobInFlight { job_id: String },

    /// A status change that the lifecycle does not allow.
    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// LLM provider error (non-2xx response or unusable payload).
    #[error("LLM error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Llm {
        status: Option<u16>,
        message: String,
    },

    /// CMS answered with a non-2xx status.
    #[error("CMS error: HTTP {status} {status_text}: {body}")]
    Cms {
        status: u16,
        status_text: String,
        body: String,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SeoflowError>;

impl SeoflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error for the given entity.
    pub fn not_found(entity: &'static str, msg: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            message: msg.into(),
        }
    }

    /// Create a response-shape error from any displayable message.
    pub fn response_shape(msg: impl Into<String>) -> Self {
        Self::ResponseShape {
            message: msg.into(),
        }
    }

    /// Create an invalid-JSON error from any displayable message.
    pub fn invalid_json(msg: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::IntegrationNotConfigured { .. } => ErrorKind::Configuration,
            Self::Validation { .. }
            | Self::NotFound { .. }
            | Self::Ownership { .. }
            | Self::CrossReference { .. }
            | Self::EmptyDraft { .. }
            | Self::DraftIncomplete { .. }
            | Self::MissingHeroImage { .. } => ErrorKind::Validation,
            Self::EmptyResponse
            | Self::InvalidJson { .. }
            | Self::ResponseShape { .. }
            | Self::IncompletePayload { .. }
            | Self::MissingBody
            | Self::StructureMismatch { .. } => ErrorKind::Contract,
            Self::DuplicateJob { .. } | Self::JobInFlight { .. } | Self::InvalidTransition { .. } => {
                ErrorKind::Conflict
            }
            Self::Network(_) | Self::Llm { .. } | Self::Cms { .. } => ErrorKind::Integration,
            Self::Storage(_) | Self::Io { .. } => ErrorKind::Internal,
        }
    }

    /// Whether showing a "try again" affordance makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Contract | ErrorKind::Integration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SeoflowError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = SeoflowError::Cms {
            status: 401,
            status_text: "Unauthorized".into(),
            body: r#"{"code":"rest_not_logged_in"}"#.into(),
        };
        assert!(err.to_string().contains("HTTP 401 Unauthorized"));
        assert!(err.to_string().contains("rest_not_logged_in"));

        let err = SeoflowError::Llm {
            status: Some(429),
            message: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "LLM error (HTTP 429): rate limited");
    }

    #[test]
    fn kinds_separate_affordances() {
        assert_eq!(
            SeoflowError::config("x").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            SeoflowError::MissingHeroImage {
                draft_id: "d1".into()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(SeoflowError::EmptyResponse.kind(), ErrorKind::Contract);
        assert_eq!(
            SeoflowError::DuplicateJob {
                draft_id: "d1".into(),
                job_id: "j1".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            SeoflowError::Cms {
                status: 500,
                status_text: "Internal Server Error".into(),
                body: String::new(),
            }
            .kind(),
            ErrorKind::Integration
        );
    }

    #[test]
    fn only_contract_and_integration_are_retryable() {
        assert!(SeoflowError::MissingBody.is_retryable());
        assert!(SeoflowError::Network("timeout".into()).is_retryable());
        assert!(!SeoflowError::validation("bad id").is_retryable());
        assert!(
            !SeoflowError::JobInFlight {
                job_id: "j1".into()
            }
            .is_retryable()
        );
    }
}
