use std::time::Duration;

pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SPEECH_GRACE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_NEXT_QUESTION_DELAY: Duration = Duration::from_millis(1000);

/// Timing knobs for one turn controller, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnConfig {
    silence_timeout: Duration,
    speech_grace_delay: Duration,
    next_question_delay: Duration,
    max_silent_cycles: Option<u32>,
}

pub struct TurnConfigBuilder {
    config: TurnConfig,
}

impl TurnConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TurnConfig::default(),
        }
    }

    pub fn with_silence_timeout(mut self, timeout: Duration) -> Self {
        self.config.silence_timeout = timeout;
        self
    }

    // Keeps the synthesized voice's tail out of the capture.
    pub fn with_speech_grace_delay(mut self, delay: Duration) -> Self {
        self.config.speech_grace_delay = delay;
        self
    }

    pub fn with_next_question_delay(mut self, delay: Duration) -> Self {
        self.config.next_question_delay = delay;
        self
    }

    pub fn with_max_silent_cycles(mut self, cycles: Option<u32>) -> Self {
        self.config.max_silent_cycles = cycles.filter(|c| *c > 0);
        self
    }

    pub fn build(self) -> TurnConfig {
        self.config
    }
}

impl Default for TurnConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            speech_grace_delay: DEFAULT_SPEECH_GRACE_DELAY,
            next_question_delay: DEFAULT_NEXT_QUESTION_DELAY,
            max_silent_cycles: None,
        }
    }
}

impl TurnConfig {
    pub fn builder() -> TurnConfigBuilder {
        TurnConfigBuilder::new()
    }

    pub fn silence_timeout(&self) -> Duration {
        self.silence_timeout
    }

    pub fn speech_grace_delay(&self) -> Duration {
        self.speech_grace_delay
    }

    pub fn next_question_delay(&self) -> Duration {
        self.next_question_delay
    }

    /// Number of consecutive empty silence windows after which the question
    /// is submitted unanswered. `None` waits indefinitely.
    pub fn max_silent_cycles(&self) -> Option<u32> {
        self.max_silent_cycles
    }
}
