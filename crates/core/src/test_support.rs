use crate::events::TurnEvents;
use crate::ports::{SpeechError, SpeechInput, SpeechInputEvent, SpeechOutput, SpeechOutputEvent, UtteranceId};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCall {
    InputStart,
    InputStop,
    Speak(UtteranceId, String),
    Cancel,
}

/// Shared record of what the controller asked the ports to do.
#[derive(Debug, Clone, Default)]
pub struct PortLog(Arc<Mutex<Vec<PortCall>>>);

impl PortLog {
    fn push(&self, call: PortCall) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<PortCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn count(&self, wanted: &PortCall) -> usize {
        self.calls().iter().filter(|c| *c == wanted).count()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PortCall::Speak(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_utterance(&self) -> Option<UtteranceId> {
        self.calls().into_iter().rev().find_map(|c| match c {
            PortCall::Speak(id, _) => Some(id),
            _ => None,
        })
    }
}

/// Capture port that logs real engine starts and stops. A scripted answer is
/// posted as a final transcript each time capture actually starts.
pub struct RecordingInput {
    log: PortLog,
    active: bool,
    failure: Option<SpeechError>,
    events: Option<TurnEvents>,
    script: VecDeque<String>,
}

impl RecordingInput {
    pub fn new(log: PortLog) -> Self {
        Self {
            log,
            active: false,
            failure: None,
            events: None,
            script: VecDeque::new(),
        }
    }

    pub fn failing_with(mut self, error: SpeechError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn answering(mut self, events: TurnEvents, answers: &[&str]) -> Self {
        self.events = Some(events);
        self.script = answers.iter().map(|a| a.to_string()).collect();
        self
    }

}

#[async_trait]
impl SpeechInput for RecordingInput {
    async fn start(&mut self) -> Result<(), SpeechError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if self.active {
            return Ok(());
        }
        self.active = true;
        self.log.push(PortCall::InputStart);
        if let Some(events) = &self.events {
            events.speech_input(SpeechInputEvent::Started);
            if let Some(answer) = self.script.pop_front() {
                events.speech_input(SpeechInputEvent::Final(answer));
            }
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SpeechError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        self.log.push(PortCall::InputStop);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn capture_ended(&mut self) {
        self.active = false;
    }
}

/// Playback port that logs requests. With events attached it plays every
/// utterance instantly.
pub struct RecordingOutput {
    log: PortLog,
    events: Option<TurnEvents>,
}

impl RecordingOutput {
    pub fn new(log: PortLog) -> Self {
        Self { log, events: None }
    }

    pub fn playing(mut self, events: TurnEvents) -> Self {
        self.events = Some(events);
        self
    }
}

#[async_trait]
impl SpeechOutput for RecordingOutput {
    async fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), SpeechError> {
        self.log.push(PortCall::Speak(utterance, text.to_string()));
        if let Some(events) = &self.events {
            events.speech_output(SpeechOutputEvent::Started(utterance));
            events.speech_output(SpeechOutputEvent::Ended(utterance));
        }
        Ok(())
    }

    async fn cancel(&mut self) -> Result<(), SpeechError> {
        self.log.push(PortCall::Cancel);
        Ok(())
    }
}
