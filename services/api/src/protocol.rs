//! JSON messages exchanged with the interview page over the websocket.
//!
//! Every frame is a text frame holding one object tagged by `type`.

use interview_core::{Feedback, TurnPhase, TurnUpdate, UtteranceId};
use serde::{Deserialize, Serialize};

fn supported() -> bool {
    true
}

/// Browser → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First message on every connection; announces what the browser can do.
    #[serde(rename = "hello", rename_all = "camelCase")]
    Hello {
        #[serde(default = "supported")]
        speech_capture: bool,
        #[serde(default = "supported")]
        speech_synthesis: bool,
    },

    // Capture events echo the `capture` number of the `speech.input.start`
    // that opened them.
    #[serde(rename = "speech.input.started")]
    InputStarted { capture: u64 },
    #[serde(rename = "speech.input.interim")]
    InputInterim { capture: u64, text: String },
    #[serde(rename = "speech.input.final")]
    InputFinal { capture: u64, text: String },
    #[serde(rename = "speech.input.ended")]
    InputEnded { capture: u64 },
    /// `unavailable` marks a missing engine or a denied microphone permission.
    #[serde(rename = "speech.input.error")]
    InputError {
        capture: u64,
        message: String,
        #[serde(default)]
        unavailable: bool,
    },

    #[serde(rename = "speech.output.started")]
    OutputStarted { utterance: UtteranceId },
    #[serde(rename = "speech.output.ended")]
    OutputEnded { utterance: UtteranceId },

    #[serde(rename = "interview.begin")]
    Begin,
    #[serde(rename = "interview.replay")]
    Replay,
    #[serde(rename = "interview.submit")]
    Submit,
    #[serde(rename = "interview.retry_submit")]
    RetrySubmit,
    #[serde(rename = "interview.retry_listening")]
    RetryListening,
    #[serde(rename = "interview.end")]
    End,
}

impl ClientMessage {
    /// The capture a `speech.input.*` event belongs to.
    pub fn capture(&self) -> Option<u64> {
        match self {
            ClientMessage::InputStarted { capture }
            | ClientMessage::InputInterim { capture, .. }
            | ClientMessage::InputFinal { capture, .. }
            | ClientMessage::InputEnded { capture }
            | ClientMessage::InputError { capture, .. } => Some(*capture),
            _ => None,
        }
    }
}

/// Server → browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "speech.output.speak")]
    Speak { utterance: UtteranceId, text: String },
    #[serde(rename = "speech.output.cancel")]
    CancelSpeech,
    #[serde(rename = "speech.input.start")]
    StartCapture { capture: u64 },
    #[serde(rename = "speech.input.stop")]
    StopCapture { capture: u64 },

    #[serde(rename = "turn.phase")]
    Phase { phase: TurnPhase },
    #[serde(rename = "turn.question")]
    Question {
        index: usize,
        total: usize,
        prompt: String,
    },
    #[serde(rename = "turn.transcript")]
    Transcript {
        answer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interim: Option<String>,
    },
    #[serde(rename = "turn.submitted")]
    Submitted { index: usize, skipped: bool },
    #[serde(rename = "turn.not_started")]
    NotStarted,
    #[serde(rename = "turn.error")]
    TurnError {
        kind: String,
        message: String,
        retryable: bool,
    },

    #[serde(rename = "interview.completed", rename_all = "camelCase")]
    Completed {
        session_id: String,
        ended_early: bool,
    },
    #[serde(rename = "interview.feedback")]
    Feedback { feedback: Feedback },

    /// Protocol-level problems that are not tied to a turn.
    #[serde(rename = "error")]
    Error { message: String },
}

impl From<TurnUpdate> for ServerMessage {
    fn from(update: TurnUpdate) -> Self {
        match update {
            TurnUpdate::Phase(phase) => ServerMessage::Phase { phase },
            TurnUpdate::NotStarted => ServerMessage::NotStarted,
            TurnUpdate::QuestionDisplayed {
                index,
                total,
                prompt,
            } => ServerMessage::Question {
                index,
                total,
                prompt,
            },
            TurnUpdate::Transcript { answer, interim } => {
                ServerMessage::Transcript { answer, interim }
            }
            TurnUpdate::AnswerSubmitted { index, skipped } => {
                ServerMessage::Submitted { index, skipped }
            }
            TurnUpdate::Completed {
                session_id,
                ended_early,
            } => ServerMessage::Completed {
                session_id,
                ended_early,
            },
            TurnUpdate::Failed { error, retryable } => ServerMessage::TurnError {
                kind: error.kind().to_string(),
                message: error.to_string(),
                retryable,
            },
        }
    }
}
