use std::path::PathBuf;

use thiserror::Error;

/// How an outbound generation call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    Timeout,
    RateLimited,
    ServiceError,
}

/// The external generator could not be reached or did not answer usefully.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Generation call failed ({kind:?}, retryable: {retryable}): {message}")]
    Call {
        kind: GenerationErrorKind,
        retryable: bool,
        message: String,
    },

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },
}

impl GenerationError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Call {
            kind: GenerationErrorKind::Timeout,
            retryable: true,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::Call {
            kind: GenerationErrorKind::RateLimited,
            retryable: true,
            message: message.into(),
        }
    }

    pub fn service(message: impl Into<String>, retryable: bool) -> Self {
        Self::Call {
            kind: GenerationErrorKind::ServiceError,
            retryable,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<GenerationErrorKind> {
        match self {
            Self::Call { kind, .. } => Some(*kind),
            Self::MissingApiKey { .. } => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Call { retryable: true, .. })
    }
}

/// Generator output that could not be turned into structured items.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructureError {
    #[error("Malformed generator output: {reason} (excerpt: {raw_excerpt:?})")]
    Malformed { reason: String, raw_excerpt: String },

    #[error("Generator output held no usable items ({dropped} dropped as invalid)")]
    EmptyResult { dropped: usize },
}

/// Orchestration-level outcomes with end-to-end visibility.
///
/// `NoContent` and `InvalidInput` are terminal. `PartialFailure` and `Timeout`
/// are attached to successful outcomes to describe how they were degraded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("No chunk produced usable output: {}", failures.join("; "))]
    NoContent { failures: Vec<String> },

    #[error("{failed} of {total} chunks failed and were skipped")]
    PartialFailure { failed: usize, total: usize },

    #[error("Overall timeout reached after {completed} of {total} chunks completed")]
    Timeout { completed: usize, total: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Deck {id} not found")]
    NotFound { id: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// First 200 characters of a raw response, for error reports.
pub fn excerpt(raw: &str) -> String {
    const LIMIT: usize = 200;
    match raw.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_is_char_boundary_safe() {
        let raw = "é".repeat(300);
        let short = excerpt(&raw);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 203);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn retryability_follows_kind_constructors() {
        assert!(GenerationError::timeout("slow").is_retryable());
        assert!(GenerationError::rate_limited("429").is_retryable());
        assert!(!GenerationError::service("400", false).is_retryable());
        let missing = GenerationError::MissingApiKey {
            env_var: "GROQ_API_KEY".to_string(),
        };
        assert!(!missing.is_retryable());
        assert_eq!(missing.kind(), None);
    }

    #[test]
    fn no_content_lists_every_failure() {
        let err = PipelineError::NoContent {
            failures: vec!["chunk 1/2 failed".into(), "chunk 2/2 failed".into()],
        };
        assert_eq!(
            err.to_string(),
            "No chunk produced usable output: chunk 1/2 failed; chunk 2/2 failed"
        );
    }
}
