use crate::session::{AnswerSubmission, Feedback, SessionSnapshot};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Failures reported by a session store or feedback backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("interview session {0} was not found")]
    NotFound(String),
    #[error("could not reach the session store: {0}")]
    Transport(String),
    #[error("session store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("could not decode the session store response: {0}")]
    Decode(String),
}

// The store is the single writer of record for interview documents. The turn
// controller never mutates a session except through these operations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InterviewSessionStore: Send + Sync {
    async fn get_session(&self, session_id: &str) -> Result<SessionSnapshot, StoreError>;

    /// Moves a draft session to its first question.
    async fn start_session(&self, session_id: &str) -> Result<SessionSnapshot, StoreError>;

    /// Records the answer for the current question and returns the advanced
    /// session. A completed session carries no current question.
    async fn submit_answer(
        &self,
        session_id: &str,
        submission: &AnswerSubmission,
    ) -> Result<SessionSnapshot, StoreError>;

    async fn end_session(&self, session_id: &str) -> Result<SessionSnapshot, StoreError>;
}

/// Scores a completed interview. Invoked once the store reports completion.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate_feedback(&self, session_id: &str) -> Result<Feedback, StoreError>;
}
