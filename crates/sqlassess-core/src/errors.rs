use thiserror::Error;

pub type AssessResult<T> = Result<T, AssessError>;

/// Failure taxonomy surfaced by pipeline operations.
///
/// Parse fallbacks are deliberately absent: the response parser degrades to a
/// conservative default and logs instead of failing.
#[derive(Debug, Error)]
pub enum AssessError {
    /// A required input is missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced test, student or question does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The completion service was unreachable, errored or missed the caller deadline.
    #[error("completion service error: {0}")]
    Upstream(String),

    /// A completion had no safe default (flashcards without an answer).
    #[error("format error: {0}")]
    Format(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AssessError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Wraps a provider failure, keeping the full context chain in the message.
    pub fn upstream(err: anyhow::Error) -> Self {
        Self::Upstream(format!("{:#}", err))
    }

    /// HTTP-equivalent status for a request/response shell.
    pub fn status_code(&self) -> u16 {
        match self {
            AssessError::Validation(_) => 400,
            AssessError::NotFound(_) => 404,
            AssessError::Format(_) => 422,
            AssessError::Upstream(_) => 502,
            AssessError::Config(_) | AssessError::Internal(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AssessError::Validation(_) => "validation",
            AssessError::NotFound(_) => "not_found",
            AssessError::Upstream(_) => "upstream",
            AssessError::Format(_) => "format",
            AssessError::Config(_) => "config",
            AssessError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for AssessError {
    fn from(err: anyhow::Error) -> Self {
        // Typed errors that travelled through anyhow keep their class.
        match err.downcast::<AssessError>() {
            Ok(inner) => inner,
            Err(other) => AssessError::Internal(format!("{:#}", other)),
        }
    }
}

pub(crate) fn require_non_blank(field: &str, value: &str) -> AssessResult<()> {
    if value.trim().is_empty() {
        return Err(AssessError::validation(format!("missing required field '{}'", field)));
    }
    Ok(())
}
