use crate::ports::SpeechError;
use crate::store::StoreError;
use crate::turn::TurnPhase;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("interview session {0} was not found")]
    SessionNotFound(String),
    #[error("interview session {0} has not been started")]
    SessionNotStarted(String),
    #[error("interview session is inconsistent: {0}")]
    InvalidSession(String),
    #[error("speech capture is unavailable: {0}")]
    SpeechCaptureUnavailable(String),
    #[error("speech capture failed: {0}")]
    SpeechCaptureError(String),
    #[error("speech playback failed: {0}")]
    SpeechPlaybackError(String),
    #[error("answer submission failed: {0}")]
    SubmissionFailure(StoreError),
    #[error("session store error: {0}")]
    Store(StoreError),
    #[error("cannot {action} while {phase:?}")]
    InvalidAction {
        action: &'static str,
        phase: TurnPhase,
    },
    #[error("the turn controller is no longer running")]
    ControllerClosed,
}

impl TurnError {
    /// Whether an explicit caller retry can make progress from where the
    /// controller landed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TurnError::SpeechCaptureError(_)
                | TurnError::SubmissionFailure(_)
                | TurnError::SpeechPlaybackError(_)
                | TurnError::Store(_)
        )
    }

    /// Short machine-readable name, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            TurnError::SessionNotFound(_) => "session_not_found",
            TurnError::SessionNotStarted(_) => "session_not_started",
            TurnError::InvalidSession(_) => "invalid_session",
            TurnError::SpeechCaptureUnavailable(_) => "speech_capture_unavailable",
            TurnError::SpeechCaptureError(_) => "speech_capture_error",
            TurnError::SpeechPlaybackError(_) => "speech_playback_error",
            TurnError::SubmissionFailure(_) => "submission_failure",
            TurnError::Store(_) => "store_error",
            TurnError::InvalidAction { .. } => "invalid_action",
            TurnError::ControllerClosed => "controller_closed",
        }
    }

    pub(crate) fn from_capture(error: SpeechError) -> Self {
        match error {
            SpeechError::Unavailable(reason) => TurnError::SpeechCaptureUnavailable(reason),
            SpeechError::Failed(reason) => TurnError::SpeechCaptureError(reason),
        }
    }

    pub(crate) fn from_load(session_id: &str, error: StoreError) -> Self {
        match error {
            StoreError::NotFound(_) => TurnError::SessionNotFound(session_id.to_string()),
            other => TurnError::Store(other),
        }
    }
}
