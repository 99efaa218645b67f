use thiserror::Error;

use crate::models::state::Step;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Search API error: {0}")]
    SearchApi(String),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("{service} returned HTTP {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimited(u64),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Analysis not found: {0}")]
    AnalysisNotFound(String),

    #[error("Invalid pipeline graph: {0}")]
    InvalidGraph(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Transient failures worth another attempt. Auth and validation
    /// rejections (4xx other than 429) are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimited(_) | Error::Timeout(_) => true,
            Error::Network(e) => !e.is_decode() && !e.is_builder(),
            Error::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// What went wrong inside a stage, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    Search,
    Generation,
    Persistence,
    Timeout,
    Cancelled,
    DuplicateResult,
}

impl std::fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageErrorKind::Search => write!(f, "search"),
            StageErrorKind::Generation => write!(f, "generation"),
            StageErrorKind::Persistence => write!(f, "persistence"),
            StageErrorKind::Timeout => write!(f, "timeout"),
            StageErrorKind::Cancelled => write!(f, "cancelled"),
            StageErrorKind::DuplicateResult => write!(f, "duplicate result"),
        }
    }
}

/// A failure recorded into workflow state. Stages return these instead of
/// aborting the run.
#[derive(Error, Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[error("{step} failed ({kind}): {message}")]
pub struct StageError {
    pub step: Step,
    pub kind: StageErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(step: Step, kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            step,
            kind,
            message: message.into(),
        }
    }

    /// Classify a collaborator error. Timeouts and cancellation keep their own
    /// kind; everything else takes the stage's default kind.
    pub fn from_error(step: Step, default_kind: StageErrorKind, err: &Error) -> Self {
        let kind = match err {
            Error::Timeout(_) => StageErrorKind::Timeout,
            Error::Cancelled => StageErrorKind::Cancelled,
            _ => default_kind,
        };
        Self::new(step, kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transient = Error::Upstream {
            service: "SerpAPI",
            status: 503,
            message: "unavailable".to_string(),
        };
        let throttled = Error::Upstream {
            service: "Gemini",
            status: 429,
            message: "slow down".to_string(),
        };
        let unauthorized = Error::Upstream {
            service: "Gemini",
            status: 401,
            message: "bad key".to_string(),
        };

        assert!(transient.is_retryable());
        assert!(throttled.is_retryable());
        assert!(Error::Timeout(30).is_retryable());
        assert!(!unauthorized.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::LLMApi("empty response".to_string()).is_retryable());
    }

    #[test]
    fn test_stage_error_kind_from_error() {
        let err = StageError::from_error(Step::NoveltyAnalysis, StageErrorKind::Generation, &Error::Timeout(5));
        assert_eq!(err.kind, StageErrorKind::Timeout);

        let err = StageError::from_error(
            Step::PatentSearch,
            StageErrorKind::Search,
            &Error::SearchApi("boom".to_string()),
        );
        assert_eq!(err.kind, StageErrorKind::Search);
        assert_eq!(err.to_string(), "patent_search failed (search): Search API error: boom");
    }
}
