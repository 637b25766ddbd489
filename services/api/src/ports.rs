use crate::protocol::ServerMessage;
use async_trait::async_trait;
use interview_core::{SpeechError, SpeechInput, SpeechOutput, UtteranceId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub type Outbound = mpsc::Sender<ServerMessage>;

async fn forward(outbound: &Outbound, message: ServerMessage) -> Result<(), SpeechError> {
    outbound
        .send(message)
        .await
        .map_err(|_| SpeechError::Failed("the browser disconnected".to_string()))
}

/// Capture numbering shared by [`WsSpeechInput`], which advances it, and the
/// socket reader, which uses it to drop events from captures that are no
/// longer running.
#[derive(Debug, Default)]
pub struct CaptureTracker {
    current: AtomicU64,
    stopped: AtomicU64,
    reported_end: AtomicU64,
}

impl CaptureTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// True when `capture` is the one the page is running right now.
    pub fn is_live(&self, capture: u64) -> bool {
        capture != 0
            && capture == self.current.load(Ordering::SeqCst)
            && capture != self.stopped.load(Ordering::SeqCst)
    }

    /// Notes that the page reported the end of `capture`. The port acts on
    /// it when the controller reaches the matching event.
    pub fn report_end(&self, capture: u64) {
        self.reported_end.store(capture, Ordering::SeqCst);
    }
}

/// Speech capture running in the browser, driven by `speech.input.*` messages.
pub struct WsSpeechInput {
    outbound: Outbound,
    supported: bool,
    active: bool,
    tracker: Arc<CaptureTracker>,
}

impl WsSpeechInput {
    pub fn new(outbound: Outbound, supported: bool, tracker: Arc<CaptureTracker>) -> Self {
        Self {
            outbound,
            supported,
            active: false,
            tracker,
        }
    }
}

#[async_trait]
impl SpeechInput for WsSpeechInput {
    async fn start(&mut self) -> Result<(), SpeechError> {
        if !self.supported {
            return Err(SpeechError::Unavailable(
                "the browser has no speech recognition".to_string(),
            ));
        }
        if self.active {
            return Ok(());
        }
        let capture = self.tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(e) = forward(&self.outbound, ServerMessage::StartCapture { capture }).await {
            self.tracker.stopped.store(capture, Ordering::SeqCst);
            return Err(e);
        }
        self.active = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SpeechError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        let capture = self.tracker.current.load(Ordering::SeqCst);
        // Marked before the page hears about it so its late end is dropped.
        self.tracker.stopped.store(capture, Ordering::SeqCst);
        forward(&self.outbound, ServerMessage::StopCapture { capture }).await
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn capture_ended(&mut self) {
        let current = self.tracker.current.load(Ordering::SeqCst);
        if self.tracker.reported_end.load(Ordering::SeqCst) == current {
            self.active = false;
        }
    }
}

/// Speech synthesis running in the browser.
pub struct WsSpeechOutput {
    outbound: Outbound,
    supported: bool,
}

impl WsSpeechOutput {
    pub fn new(outbound: Outbound, supported: bool) -> Self {
        Self {
            outbound,
            supported,
        }
    }
}

#[async_trait]
impl SpeechOutput for WsSpeechOutput {
    async fn speak(&mut self, utterance: UtteranceId, text: &str) -> Result<(), SpeechError> {
        if !self.supported {
            return Err(SpeechError::Unavailable(
                "the browser has no speech synthesis".to_string(),
            ));
        }
        let message = ServerMessage::Speak {
            utterance,
            text: text.to_string(),
        };
        forward(&self.outbound, message).await
    }

    async fn cancel(&mut self) -> Result<(), SpeechError> {
        forward(&self.outbound, ServerMessage::CancelSpeech).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(supported: bool) -> (WsSpeechInput, Arc<CaptureTracker>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let tracker = CaptureTracker::new();
        (WsSpeechInput::new(tx, supported, tracker.clone()), tracker, rx)
    }

    #[tokio::test]
    async fn test_capture_start_and_stop_are_idempotent() {
        // Arrange
        let (mut input, _, mut rx) = input(true);

        // Act
        input.start().await.unwrap();
        input.start().await.unwrap();
        input.stop().await.unwrap();
        input.stop().await.unwrap();
        drop(input);

        // Assert
        let mut sent = Vec::new();
        while let Some(message) = rx.recv().await {
            sent.push(message);
        }
        assert_eq!(
            sent,
            vec![
                ServerMessage::StartCapture { capture: 1 },
                ServerMessage::StopCapture { capture: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_capture_reopens_after_the_page_ended_it() {
        let (mut input, tracker, mut rx) = input(true);

        input.start().await.unwrap();
        assert!(tracker.is_live(1));
        tracker.report_end(1);
        input.capture_ended();
        input.start().await.unwrap();

        assert_eq!(rx.recv().await, Some(ServerMessage::StartCapture { capture: 1 }));
        assert_eq!(rx.recv().await, Some(ServerMessage::StartCapture { capture: 2 }));
        assert!(input.is_active());
        assert!(!tracker.is_live(1));
        assert!(tracker.is_live(2));
    }

    #[tokio::test]
    async fn test_late_end_of_an_earlier_capture_keeps_the_current_one() {
        let (mut input, tracker, mut rx) = input(true);

        input.start().await.unwrap();
        input.stop().await.unwrap();
        // The page confirms the stop only after the next capture opened.
        assert!(!tracker.is_live(1));
        input.start().await.unwrap();
        tracker.report_end(1);
        input.capture_ended();

        assert!(input.is_active());
        input.stop().await.unwrap();
        let mut sent = Vec::new();
        rx.close();
        while let Some(message) = rx.recv().await {
            sent.push(message);
        }
        assert_eq!(sent.last(), Some(&ServerMessage::StopCapture { capture: 2 }));
    }

    #[tokio::test]
    async fn test_missing_capabilities_are_unavailable() {
        let (mut input, _, _rx) = input(false);
        let (tx, _out_rx) = mpsc::channel(8);
        let mut output = WsSpeechOutput::new(tx, false);

        assert!(matches!(input.start().await, Err(SpeechError::Unavailable(_))));
        assert!(!input.is_active());
        assert!(matches!(
            output.speak(UtteranceId(1), "Hello").await,
            Err(SpeechError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_socket_fails_the_command() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let mut output = WsSpeechOutput::new(tx, true);

        let result = output.speak(UtteranceId(1), "Hello").await;

        assert!(matches!(result, Err(SpeechError::Failed(_))));
    }
}
