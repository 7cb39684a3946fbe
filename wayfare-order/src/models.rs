use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Success,
    Failure,
}

/// One-shot outcome of submitting a draft
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionResult {
    pub status: SubmissionStatus,
    pub confirmation_id: Option<String>,
    pub error_message: Option<String>,
}

impl SubmissionResult {
    pub fn success(confirmation_id: Option<String>) -> Self {
        Self {
            status: SubmissionStatus::Success,
            confirmation_id,
            error_message: None,
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            status: SubmissionStatus::Failure,
            confirmation_id: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SubmissionStatus::Success
    }
}
