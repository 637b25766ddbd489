use serde::{Deserialize, Serialize};

/// Lifecycle of a persisted interview. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Draft,
    InProgress,
    Completed,
}

impl SessionStatus {
    fn rank(self) -> u8 {
        match self {
            SessionStatus::Draft => 0,
            SessionStatus::InProgress => 1,
            SessionStatus::Completed => 2,
        }
    }

    /// True when moving from `self` to `next` does not go backward.
    pub fn can_become(self, next: SessionStatus) -> bool {
        next.rank() >= self.rank()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub prompt: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub time_spent: u64,
}

impl Question {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            answer: String::new(),
            transcript: String::new(),
            time_spent: 0,
        }
    }
}

/// The view of an interview the store hands back after every operation.
///
/// Once the interview is completed the store omits `current_question`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_question: Option<Question>,
    pub current_index: usize,
    pub total_questions: usize,
}

impl SessionSnapshot {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Checks the invariants every snapshot must hold, optionally against the
    /// previously observed snapshot of the same interview.
    pub fn validate(&self, previous: Option<&SessionSnapshot>) -> Result<(), String> {
        if self.current_index > self.total_questions {
            return Err(format!(
                "current index {} exceeds question budget {}",
                self.current_index, self.total_questions
            ));
        }
        if self.status == SessionStatus::InProgress && self.current_question.is_none() {
            return Err("in-progress session has no current question".to_string());
        }
        if let Some(previous) = previous {
            if !previous.status.can_become(self.status) {
                return Err(format!(
                    "status moved backward from {:?} to {:?}",
                    previous.status, self.status
                ));
            }
        }
        Ok(())
    }
}

/// What the caller hands the store when a turn ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub answer: String,
    pub transcript: String,
    #[serde(rename = "timeSpent")]
    pub time_spent_secs: u64,
}

impl AnswerSubmission {
    /// Builds a submission from the raw transcript buffer. The answer is the
    /// transcript with whitespace collapsed.
    pub fn from_transcript(transcript: &str, time_spent_secs: u64) -> Self {
        Self {
            answer: clean_answer(transcript),
            transcript: transcript.to_string(),
            time_spent_secs,
        }
    }
}

pub fn clean_answer(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
    pub category: String,
    pub score: f32,
    #[serde(default)]
    pub comment: String,
}

/// Scoring produced once an interview is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub overall_score: f32,
    #[serde(default)]
    pub categories: Vec<CategoryScore>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}
