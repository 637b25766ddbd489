pub mod config;
pub mod error;
pub mod events;
pub mod ports;
pub mod session;
pub mod store;
pub mod turn;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::TurnConfig;
pub use error::TurnError;
pub use events::{TurnEvent, TurnEventReceiver, TurnEvents, TurnUpdate, TurnUpdates, UserAction, turn_channel};
pub use ports::{SpeechError, SpeechInput, SpeechInputEvent, SpeechOutput, SpeechOutputEvent, UtteranceId};
pub use session::{AnswerSubmission, CategoryScore, Feedback, Question, SessionSnapshot, SessionStatus};
pub use store::{FeedbackGenerator, InterviewSessionStore, StoreError};
pub use turn::{LoadOutcome, SubmitOutcome, TurnController, TurnPhase};
pub use watchdog::SilenceWatchdog;
