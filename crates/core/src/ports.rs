//! Contracts for the speech capabilities the turn controller drives.
//!
//! Ports are command-only: `start`, `stop`, `speak` and `cancel` return as
//! soon as the engine accepted the request. Everything the engine reports back
//! (transcripts, utterance boundaries, failures) is posted to the controller's
//! event queue through a [`crate::TurnEvents`] handle the adapter holds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    /// The capability is missing or permission was denied.
    #[error("speech capability unavailable: {0}")]
    Unavailable(String),
    #[error("speech engine failed: {0}")]
    Failed(String),
}

/// Identifies one `speak` request so late events from an earlier utterance can
/// be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtteranceId(pub u64);

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "utterance-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechInputEvent {
    Started,
    /// Provisional text. The user is still talking.
    Interim(String),
    /// Text the engine considers settled.
    Final(String),
    Ended,
    Error(SpeechError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutputEvent {
    Started(UtteranceId),
    Ended(UtteranceId),
}

/// Continuous speech-to-text capture.
///
/// Implementations must accept `start` while already capturing and `stop`
/// while already stopped without erroring or emitting duplicate events.
#[async_trait]
pub trait SpeechInput: Send + Sync {
    async fn start(&mut self) -> Result<(), SpeechError>;
    async fn stop(&mut self) -> Result<(), SpeechError>;
    fn is_active(&self) -> bool;

    /// Called by the controller, in event order, when the engine reported
    /// `Ended` or `Error`: capture is no longer running and the next `start`
    /// must reach the engine.
    fn capture_ended(&mut self) {}
}

/// Text-to-speech playback.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    async fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), SpeechError>;
    /// Aborts the utterance in progress, if any.
    async fn cancel(&mut self) -> Result<(), SpeechError>;
}
