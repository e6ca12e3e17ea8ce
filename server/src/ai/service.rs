use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single suggestion attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiError {
    #[error("service overloaded: {0}")]
    Overloaded(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("suggestion {0:?} is not a legal move")]
    InvalidMove(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl AiError {
    /// Overload, unavailability, timeouts and off-list answers are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AiError::Overloaded(_)
                | AiError::Unavailable(_)
                | AiError::Timeout(_)
                | AiError::InvalidMove(_)
        )
    }
}

/// External text model asked for a move.
///
/// The answer is free text with no guarantee of following the prompt, so
/// callers validate everything that comes back.
#[async_trait]
pub trait MoveSuggester: Send + Sync {
    async fn suggest(&self, prompt: &str) -> Result<String, AiError>;

    fn name(&self) -> &str {
        "suggester"
    }
}

const CHECK_PROMPT: &str = "Reply with the single word: ok";

/// Smoke-tests connectivity and credentials. Returns the raw reply.
pub async fn check_connectivity(
    service: &dyn MoveSuggester,
    limit: Duration,
) -> Result<String, AiError> {
    match tokio::time::timeout(limit, service.suggest(CHECK_PROMPT)).await {
        Ok(reply) => reply,
        Err(_) => Err(AiError::Timeout(limit)),
    }
}
