//! The interview turn-taking state machine.
//!
//! One controller drives one interview session through repeated turns:
//! speak the question, wait out the grace delay, listen, detect the end of the
//! answer by silence, submit, then advance or finish. All inputs arrive as
//! [`TurnEvent`]s on a single queue and are applied one at a time, so there is
//! exactly one owner of the answer buffer and the timers.

use crate::config::TurnConfig;
use crate::error::TurnError;
use crate::events::{TurnEvent, TurnEventReceiver, TurnEvents, TurnUpdate, TurnUpdates, UserAction};
use crate::ports::{SpeechError, SpeechInput, SpeechInputEvent, SpeechOutput, SpeechOutputEvent, UtteranceId};
use crate::session::{AnswerSubmission, SessionSnapshot, SessionStatus};
use crate::store::InterviewSessionStore;
use crate::watchdog::SilenceWatchdog;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Speaking,
    /// The question finished playing; capture starts after the grace delay.
    ListeningArmed,
    Listening,
    Submitting,
    Completed,
    Error,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        self == TurnPhase::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The session is still a draft; `begin_interview` starts it.
    NotStarted,
    Resumed,
    AlreadyCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    NextQuestion,
    Completed,
}

// Per-question working state. Cleared only after the store acknowledged a
// submission, or when the interview ends.
#[derive(Debug, Default)]
struct TurnState {
    transcript: String,
    question_started: Option<Instant>,
    silent_cycles: u32,
    retry_pending: bool,
}

impl TurnState {
    fn elapsed_secs(&self) -> u64 {
        self.question_started
            .map(|started| started.elapsed().as_secs())
            .unwrap_or(0)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

pub struct TurnController {
    session_id: String,
    config: TurnConfig,
    store: Arc<dyn InterviewSessionStore>,
    input: Box<dyn SpeechInput>,
    output: Box<dyn SpeechOutput>,
    events: TurnEvents,
    updates: mpsc::UnboundedSender<TurnUpdate>,
    phase: TurnPhase,
    session: Option<SessionSnapshot>,
    turn: TurnState,
    watchdog: SilenceWatchdog,
    last_utterance: u64,
    // Utterance requested from the output port that has not ended yet.
    speaking: Option<UtteranceId>,
    // Utterance whose grace delay is running.
    armed_utterance: Option<UtteranceId>,
    advance_token: Option<u64>,
    last_token: u64,
    timer: Option<JoinHandle<()>>,
    last_error: Option<TurnError>,
    relinquished: bool,
}

impl TurnController {
    /// Creates a controller for `session_id`. `events` must be the sender half
    /// of the queue later passed to [`TurnController::run`]; the ports should
    /// post their events through clones of it.
    pub fn new(
        session_id: impl Into<String>,
        config: TurnConfig,
        store: Arc<dyn InterviewSessionStore>,
        input: Box<dyn SpeechInput>,
        output: Box<dyn SpeechOutput>,
        events: TurnEvents,
    ) -> (Self, TurnUpdates) {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let controller = Self {
            session_id: session_id.into(),
            config,
            store,
            input,
            output,
            events,
            updates,
            phase: TurnPhase::Idle,
            session: None,
            turn: TurnState::default(),
            watchdog: SilenceWatchdog::new(),
            last_utterance: 0,
            speaking: None,
            armed_utterance: None,
            advance_token: None,
            last_token: 0,
            timer: None,
            last_error: None,
            relinquished: false,
        };
        (controller, updates_rx)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&SessionSnapshot> {
        self.session.as_ref()
    }

    /// Raw concatenation of the final transcripts heard for the current question.
    pub fn answer_buffer(&self) -> &str {
        &self.turn.transcript
    }

    pub fn last_error(&self) -> Option<&TurnError> {
        self.last_error.as_ref()
    }

    pub fn is_watchdog_armed(&self) -> bool {
        self.watchdog.is_armed()
    }

    /// Consumes events until the interview completes or the session is
    /// relinquished. Returns the phase the controller finished in.
    pub async fn run(mut self, mut events: TurnEventReceiver) -> TurnPhase {
        tracing::debug!("Turn controller for session {} running.", self.session_id);
        while !self.is_finished() {
            let Some(event) = events.recv().await else {
                break;
            };
            self.handle(event).await;
        }
        // Drop queued events so late port callbacks see a closed queue.
        events.close();
        if !self.is_finished() {
            self.release_resources().await;
        }
        tracing::debug!(
            "Turn controller for session {} stopped in {:?}.",
            self.session_id,
            self.phase
        );
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal() || self.relinquished
    }

    /// Applies one event. Events arriving after completion are ignored.
    pub async fn handle(&mut self, event: TurnEvent) {
        if self.is_finished() {
            tracing::trace!("Ignoring {:?}; the turn controller is finished.", event);
            return;
        }
        match event {
            TurnEvent::Input(event) => self.on_speech_input(event).await,
            TurnEvent::Output(event) => self.on_speech_output(event).await,
            TurnEvent::SilenceElapsed { cycle } => self.on_silence(cycle).await,
            TurnEvent::GraceElapsed { utterance } => self.on_grace_elapsed(utterance).await,
            TurnEvent::AdvanceElapsed { token } => self.on_advance(token).await,
            TurnEvent::Action(action) => self.on_action(action).await,
        }
    }

    pub async fn load_session(&mut self) -> Result<LoadOutcome, TurnError> {
        if !matches!(self.phase, TurnPhase::Idle | TurnPhase::Error) {
            return Err(self.reject("load the session"));
        }

        let store = self.store.clone();
        let snapshot = match store.get_session(&self.session_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let error = TurnError::from_load(&self.session_id, e);
                return Err(self.enter_error(error).await);
            }
        };
        self.accept_snapshot(snapshot).await?;
        self.last_error = None;

        match self.session_status() {
            Some(SessionStatus::Draft) => {
                tracing::info!("Session {} has not been started yet.", self.session_id);
                self.set_phase(TurnPhase::Idle);
                self.publish(TurnUpdate::NotStarted);
                Ok(LoadOutcome::NotStarted)
            }
            Some(SessionStatus::Completed) => {
                tracing::info!("Session {} is already completed.", self.session_id);
                self.complete(false).await;
                Ok(LoadOutcome::AlreadyCompleted)
            }
            _ => {
                tracing::info!("Resuming session {}.", self.session_id);
                self.speak_current_question().await?;
                Ok(LoadOutcome::Resumed)
            }
        }
    }

    /// Starts a draft session and speaks its first question.
    pub async fn begin_interview(&mut self) -> Result<(), TurnError> {
        if self.phase != TurnPhase::Idle || self.session_status() != Some(SessionStatus::Draft) {
            return Err(self.reject("begin the interview"));
        }

        let store = self.store.clone();
        let snapshot = match store.start_session(&self.session_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.record(TurnError::Store(e))),
        };
        self.accept_snapshot(snapshot).await?;
        self.last_error = None;

        if self.session_status() == Some(SessionStatus::Completed) {
            self.complete(false).await;
            return Ok(());
        }
        tracing::info!("Session {} started.", self.session_id);
        self.speak_current_question().await
    }

    /// Plays the current question. Capture is paused while the question plays
    /// and re-armed once it ends; the answer buffer is left untouched.
    pub async fn speak_current_question(&mut self) -> Result<(), TurnError> {
        if matches!(self.phase, TurnPhase::Submitting | TurnPhase::Completed) {
            return Err(self.reject("speak the question"));
        }
        let Some(prompt) = self
            .session
            .as_ref()
            .and_then(|s| s.current_question.as_ref())
            .map(|q| q.prompt.clone())
        else {
            return Err(self.reject("speak the question"));
        };

        self.cancel_timer();
        self.watchdog.disarm();
        if self.input.is_active() {
            if let Err(e) = self.input.stop().await {
                tracing::warn!("Failed to pause speech capture before speaking: {}", e);
            }
        }
        if self.speaking.take().is_some() {
            if let Err(e) = self.output.cancel().await {
                tracing::warn!("Failed to cancel the previous utterance: {}", e);
            }
        }

        self.last_utterance += 1;
        let utterance = UtteranceId(self.last_utterance);
        self.speaking = Some(utterance);
        self.set_phase(TurnPhase::Speaking);

        if let Err(e) = self.output.speak(utterance, &prompt).await {
            self.speaking = None;
            return Err(self
                .enter_error(TurnError::SpeechPlaybackError(e.to_string()))
                .await);
        }
        tracing::debug!("Speaking question as {}: \"{}\"", utterance, prompt);
        Ok(())
    }

    pub async fn replay_current_question(&mut self) -> Result<(), TurnError> {
        let has_question = self
            .session
            .as_ref()
            .is_some_and(|s| s.current_question.is_some());
        if matches!(self.phase, TurnPhase::Submitting | TurnPhase::Completed) || !has_question {
            return Err(self.reject("replay the question"));
        }
        tracing::info!("Replaying the current question.");
        self.speak_current_question().await
    }

    /// Submits the answer heard so far. Valid while listening (the candidate
    /// finished early) and after a failed submission.
    pub async fn submit_answer(&mut self) -> Result<SubmitOutcome, TurnError> {
        let allowed = match self.phase {
            TurnPhase::Listening => true,
            TurnPhase::Submitting => self.turn.retry_pending,
            _ => false,
        };
        if !allowed {
            return Err(self.reject("submit the answer"));
        }
        self.submit().await
    }

    pub async fn retry_submission(&mut self) -> Result<SubmitOutcome, TurnError> {
        if self.phase != TurnPhase::Submitting || !self.turn.retry_pending {
            return Err(self.reject("retry the submission"));
        }
        tracing::info!("Retrying answer submission for session {}.", self.session_id);
        self.submit().await
    }

    /// Restarts capture after a capture failure.
    pub async fn retry_listening(&mut self) -> Result<(), TurnError> {
        let capture_failed = matches!(
            self.last_error,
            Some(TurnError::SpeechCaptureError(_)) | Some(TurnError::SpeechCaptureUnavailable(_))
        );
        let allowed = match self.phase {
            TurnPhase::ListeningArmed => self.armed_utterance.is_none(),
            TurnPhase::Error => capture_failed && self.current_question_present(),
            _ => false,
        };
        if !allowed {
            return Err(self.reject("restart listening"));
        }
        self.start_listening().await
    }

    /// Finalizes the interview where it stands. The partial answer is
    /// discarded. The controller ends in `Completed` even when the store
    /// fails; that failure is returned.
    pub async fn end_interview_early(&mut self) -> Result<(), TurnError> {
        if self.phase.is_terminal() {
            return Err(self.reject("end the interview"));
        }
        tracing::info!(
            "Ending session {} early; discarding {} buffered characters.",
            self.session_id,
            self.turn.transcript.len()
        );
        self.release_resources().await;
        self.turn.clear();

        let store = self.store.clone();
        let result = store.end_session(&self.session_id).await;
        let outcome = match result {
            Ok(snapshot) => {
                if snapshot.status != SessionStatus::Completed {
                    tracing::warn!(
                        "Store reported {:?} after ending session {}.",
                        snapshot.status,
                        self.session_id
                    );
                }
                self.session = Some(snapshot);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to end session {}: {}", self.session_id, e);
                Err(TurnError::Store(e))
            }
        };
        self.complete(true).await;
        if let Err(error) = &outcome {
            self.record(error.clone());
        }
        outcome
    }

    /// Gives the session up without touching the store.
    pub async fn relinquish(&mut self) {
        tracing::info!("Relinquishing session {}.", self.session_id);
        self.release_resources().await;
        self.relinquished = true;
    }

    async fn on_action(&mut self, action: UserAction) {
        let result = match action {
            UserAction::Load => self.load_session().await.map(|_| ()),
            UserAction::Begin => self.begin_interview().await,
            UserAction::Replay => self.replay_current_question().await,
            UserAction::Submit => self.submit_answer().await.map(|_| ()),
            UserAction::RetrySubmission => self.retry_submission().await.map(|_| ()),
            UserAction::RetryListening => self.retry_listening().await,
            UserAction::EndEarly => self.end_interview_early().await,
            UserAction::Relinquish => {
                self.relinquish().await;
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::debug!("{:?} did not complete: {}", action, e);
        }
    }

    async fn on_speech_output(&mut self, event: SpeechOutputEvent) {
        match event {
            SpeechOutputEvent::Started(utterance) => {
                if self.speaking != Some(utterance) {
                    tracing::trace!("Ignoring start of stale {}.", utterance);
                    return;
                }
                if self.turn.question_started.is_none() {
                    self.turn.question_started = Some(Instant::now());
                }
                if let Some(session) = &self.session {
                    if let Some(question) = &session.current_question {
                        let update = TurnUpdate::QuestionDisplayed {
                            index: session.current_index,
                            total: session.total_questions,
                            prompt: question.prompt.clone(),
                        };
                        self.publish(update);
                    }
                }
            }
            SpeechOutputEvent::Ended(utterance) => {
                if self.speaking != Some(utterance) || self.phase != TurnPhase::Speaking {
                    tracing::trace!("Ignoring end of stale {}.", utterance);
                    return;
                }
                self.speaking = None;
                if self.turn.question_started.is_none() {
                    self.turn.question_started = Some(Instant::now());
                }
                self.set_phase(TurnPhase::ListeningArmed);
                self.armed_utterance = Some(utterance);
                let delay = self.config.speech_grace_delay();
                self.schedule(delay, TurnEvent::GraceElapsed { utterance });
            }
        }
    }

    async fn on_grace_elapsed(&mut self, utterance: UtteranceId) {
        if self.phase != TurnPhase::ListeningArmed || self.armed_utterance != Some(utterance) {
            tracing::trace!("Ignoring stale grace expiry for {}.", utterance);
            return;
        }
        self.armed_utterance = None;
        self.timer = None;
        if let Err(e) = self.start_listening().await {
            tracing::debug!("Could not start listening: {}", e);
        }
    }

    async fn on_speech_input(&mut self, event: SpeechInputEvent) {
        if matches!(event, SpeechInputEvent::Ended | SpeechInputEvent::Error(_)) {
            self.input.capture_ended();
        }
        if self.phase != TurnPhase::Listening {
            // Engines keep delivering for a moment after stop().
            tracing::trace!("Discarding {:?} outside of listening.", event);
            return;
        }
        match event {
            SpeechInputEvent::Started => {
                tracing::debug!("Speech capture started.");
            }
            SpeechInputEvent::Interim(text) => {
                self.turn.silent_cycles = 0;
                self.watchdog.reset();
                let answer = self.turn.transcript.clone();
                self.publish(TurnUpdate::Transcript {
                    answer,
                    interim: Some(text),
                });
            }
            SpeechInputEvent::Final(text) => {
                self.turn.transcript.push_str(&text);
                self.turn.silent_cycles = 0;
                self.watchdog.reset();
                tracing::debug!("Heard: \"{}\"", text);
                let answer = self.turn.transcript.clone();
                self.publish(TurnUpdate::Transcript {
                    answer,
                    interim: None,
                });
            }
            SpeechInputEvent::Ended => {
                // Engines end recognition on their own after long pauses.
                tracing::debug!("Speech capture ended while listening; reopening.");
                if let Err(e) = self.input.start().await {
                    self.capture_failed(e).await;
                }
            }
            SpeechInputEvent::Error(e) => {
                self.capture_failed(e).await;
            }
        }
    }

    async fn on_silence(&mut self, cycle: u64) {
        if self.phase != TurnPhase::Listening || !self.watchdog.is_current(cycle) {
            tracing::trace!("Ignoring stale silence window {}.", cycle);
            return;
        }

        if !self.turn.transcript.trim().is_empty() {
            tracing::debug!("Silence after the answer; submitting.");
            if let Err(e) = self.submit().await {
                tracing::debug!("Silence-triggered submission did not complete: {}", e);
            }
            return;
        }

        self.turn.silent_cycles += 1;
        let ceiling_reached = self
            .config
            .max_silent_cycles()
            .is_some_and(|max| self.turn.silent_cycles >= max);
        if ceiling_reached {
            tracing::info!(
                "No answer after {} silence windows; skipping the question.",
                self.turn.silent_cycles
            );
            if let Err(e) = self.submit().await {
                tracing::debug!("Skipping the question did not complete: {}", e);
            }
        } else {
            tracing::debug!("Silence before any answer; still waiting.");
            self.watchdog.reset();
        }
    }

    async fn on_advance(&mut self, token: u64) {
        if self.phase != TurnPhase::Idle || self.advance_token != Some(token) {
            tracing::trace!("Ignoring stale advance {}.", token);
            return;
        }
        self.advance_token = None;
        self.timer = None;
        if let Err(e) = self.speak_current_question().await {
            tracing::debug!("Could not speak the next question: {}", e);
        }
    }

    async fn start_listening(&mut self) -> Result<(), TurnError> {
        if let Err(e) = self.input.start().await {
            return Err(self.capture_failed(e).await);
        }
        self.last_error = None;
        self.turn.silent_cycles = 0;
        self.set_phase(TurnPhase::Listening);

        let events = self.events.clone();
        self.watchdog
            .arm(self.config.silence_timeout(), move |cycle| {
                events.send(TurnEvent::SilenceElapsed { cycle });
            });
        Ok(())
    }

    // A missing capability is terminal for the turn. Any other failure leaves
    // the controller armed and waiting for an explicit retry.
    async fn capture_failed(&mut self, error: SpeechError) -> TurnError {
        match error {
            SpeechError::Unavailable(_) => self.enter_error(TurnError::from_capture(error)).await,
            SpeechError::Failed(_) => {
                self.watchdog.disarm();
                if let Err(e) = self.input.stop().await {
                    tracing::warn!("Failed to stop speech capture after an error: {}", e);
                }
                self.set_phase(TurnPhase::ListeningArmed);
                self.record(TurnError::from_capture(error))
            }
        }
    }

    async fn submit(&mut self) -> Result<SubmitOutcome, TurnError> {
        self.watchdog.disarm();
        if self.input.is_active() {
            if let Err(e) = self.input.stop().await {
                tracing::warn!("Failed to stop speech capture before submitting: {}", e);
            }
        }
        self.set_phase(TurnPhase::Submitting);
        self.turn.retry_pending = false;

        let submission =
            AnswerSubmission::from_transcript(&self.turn.transcript, self.turn.elapsed_secs());
        let index = self.session.as_ref().map(|s| s.current_index).unwrap_or(0);
        tracing::info!(
            "Submitting answer {} for session {} ({} s).",
            index + 1,
            self.session_id,
            submission.time_spent_secs
        );

        let store = self.store.clone();
        let snapshot = match store.submit_answer(&self.session_id, &submission).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.turn.retry_pending = true;
                return Err(self.record(TurnError::SubmissionFailure(e)));
            }
        };
        self.accept_snapshot(snapshot).await?;

        self.turn.clear();
        self.last_error = None;
        self.publish(TurnUpdate::AnswerSubmitted {
            index,
            skipped: submission.answer.is_empty(),
        });

        if self.session_status() == Some(SessionStatus::Completed) {
            self.complete(false).await;
            return Ok(SubmitOutcome::Completed);
        }

        self.set_phase(TurnPhase::Idle);
        self.last_token += 1;
        let token = self.last_token;
        self.advance_token = Some(token);
        let delay = self.config.next_question_delay();
        self.schedule(delay, TurnEvent::AdvanceElapsed { token });
        Ok(SubmitOutcome::NextQuestion)
    }

    async fn complete(&mut self, ended_early: bool) {
        self.release_resources().await;
        self.set_phase(TurnPhase::Completed);
        tracing::info!("Session {} completed.", self.session_id);
        self.publish(TurnUpdate::Completed {
            session_id: self.session_id.clone(),
            ended_early,
        });
    }

    async fn enter_error(&mut self, error: TurnError) -> TurnError {
        self.release_resources().await;
        self.set_phase(TurnPhase::Error);
        self.record(error)
    }

    async fn accept_snapshot(&mut self, snapshot: SessionSnapshot) -> Result<(), TurnError> {
        if let Err(reason) = snapshot.validate(self.session.as_ref()) {
            return Err(self.enter_error(TurnError::InvalidSession(reason)).await);
        }
        self.session = Some(snapshot);
        Ok(())
    }

    // Stops capture, silences the watchdog, aborts pending timers and cancels
    // an utterance in flight.
    async fn release_resources(&mut self) {
        self.watchdog.disarm();
        self.cancel_timer();
        if let Err(e) = self.input.stop().await {
            tracing::warn!("Failed to stop speech capture: {}", e);
        }
        if self.speaking.take().is_some() {
            if let Err(e) = self.output.cancel().await {
                tracing::warn!("Failed to cancel speech playback: {}", e);
            }
        }
    }

    fn schedule(&mut self, delay: Duration, event: TurnEvent) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
        let events = self.events.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.send(event);
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
        self.armed_utterance = None;
        self.advance_token = None;
    }

    fn session_status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(|s| s.status)
    }

    fn current_question_present(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.current_question.is_some())
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        if self.phase == phase {
            return;
        }
        tracing::debug!("Turn phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.publish(TurnUpdate::Phase(phase));
    }

    fn record(&mut self, error: TurnError) -> TurnError {
        tracing::warn!("Session {}: {}", self.session_id, error);
        self.last_error = Some(error.clone());
        let retryable = error.is_retryable() && !self.phase.is_terminal();
        self.publish(TurnUpdate::Failed {
            error: error.clone(),
            retryable,
        });
        error
    }

    // Invalid requests do not change state.
    fn reject(&self, action: &'static str) -> TurnError {
        let error = TurnError::InvalidAction {
            action,
            phase: self.phase,
        };
        self.publish(TurnUpdate::Failed {
            error: error.clone(),
            retryable: false,
        });
        error
    }

    fn publish(&self, update: TurnUpdate) {
        if self.updates.send(update).is_err() {
            tracing::trace!("No one is listening for turn updates.");
        }
    }
}
