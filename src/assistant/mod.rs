pub mod openai;
#[cfg(test)]
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GenResult;

pub use openai::OpenAiAssistant;

/// Lifecycle states of a remote assistant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Terminal states other than `Completed`. Anything else is still pending.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Failed | Self::Incomplete | Self::Expired
        )
    }
}

/// Handle to one submitted job: a fresh thread with a single run on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "id")]
    pub run_id: String,
    pub thread_id: String,
    pub status: JobStatus,
    pub created_at: i64,
    #[serde(default)]
    pub last_error: Option<JobError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

/// One message on a job's thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: String,
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// Text of the first text part, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            MessageContent::Text { text } => Some(text.value.as_str()),
            MessageContent::Other => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextValue {
    pub value: String,
}

/// Remote assistant service. Every call is a single request/response; the
/// caller drives polling.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Cheapest authenticated read, used to check the API key.
    async fn verify_key(&self) -> GenResult<()>;

    async fn verify_assistant(&self) -> GenResult<()>;

    /// Start a new single-turn job for `instruction` on a fresh thread.
    async fn create_job(&self, instruction: &str) -> GenResult<Job>;

    async fn job_status(&self, job: &Job) -> GenResult<Job>;

    /// Messages on the job's thread, newest first.
    async fn job_messages(&self, job: &Job) -> GenResult<Vec<ThreadMessage>>;
}
