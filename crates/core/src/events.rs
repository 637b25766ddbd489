use crate::error::TurnError;
use crate::ports::{SpeechInputEvent, SpeechOutputEvent, UtteranceId};
use crate::turn::TurnPhase;
use tokio::sync::mpsc;

/// Requests relayed from the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Load,
    Begin,
    Replay,
    /// The candidate says they are done before the silence window elapses.
    Submit,
    RetrySubmission,
    RetryListening,
    EndEarly,
    /// The page or process gave the session up. Cleans up without touching the store.
    Relinquish,
}

/// Everything the turn controller reacts to, applied strictly in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Input(SpeechInputEvent),
    Output(SpeechOutputEvent),
    SilenceElapsed { cycle: u64 },
    GraceElapsed { utterance: UtteranceId },
    AdvanceElapsed { token: u64 },
    Action(UserAction),
}

pub type TurnEventReceiver = mpsc::UnboundedReceiver<TurnEvent>;

/// Cloneable handle for posting into a controller's event queue. Speech
/// adapters, timers and the UI bridge each hold one.
#[derive(Debug, Clone)]
pub struct TurnEvents {
    tx: mpsc::UnboundedSender<TurnEvent>,
}

pub fn turn_channel() -> (TurnEvents, TurnEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TurnEvents { tx }, rx)
}

impl TurnEvents {
    /// Returns false once the controller has stopped accepting events.
    pub fn speech_input(&self, event: SpeechInputEvent) -> bool {
        self.send(TurnEvent::Input(event))
    }

    pub fn speech_output(&self, event: SpeechOutputEvent) -> bool {
        self.send(TurnEvent::Output(event))
    }

    pub fn action(&self, action: UserAction) -> Result<(), TurnError> {
        if self.send(TurnEvent::Action(action)) {
            Ok(())
        } else {
            Err(TurnError::ControllerClosed)
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn send(&self, event: TurnEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// State changes published for whoever renders the interview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnUpdate {
    Phase(TurnPhase),
    NotStarted,
    QuestionDisplayed {
        index: usize,
        total: usize,
        prompt: String,
    },
    Transcript {
        answer: String,
        interim: Option<String>,
    },
    AnswerSubmitted {
        index: usize,
        skipped: bool,
    },
    Completed {
        session_id: String,
        ended_early: bool,
    },
    Failed {
        error: TurnError,
        retryable: bool,
    },
}

pub type TurnUpdates = mpsc::UnboundedReceiver<TurnUpdate>;
