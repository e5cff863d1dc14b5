use std::time::Duration;

use thiserror::Error;

use crate::assistant::JobStatus;

#[derive(Error, Debug)]
pub enum GenError {
    /// Required credentials were found in neither the config file nor the environment.
    #[error("Missing required configuration keys: {}", .missing.join(", "))]
    Config { missing: Vec<String> },
    #[error("Invalid API key format. Key should start with '{0}'")]
    InvalidKeyFormat(&'static str),
    /// The remote service rejected the API key or the assistant id.
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("No valid topic/keyword combinations in assistant response")]
    NoValidCombinations,
    #[error("Assistant took too long to respond ({elapsed:?})")]
    Timeout { elapsed: Duration },
    /// The job reached a terminal state other than `completed`.
    #[error("Job ended with status {status:?}: {reason}")]
    JobFailed { status: JobStatus, reason: String },
    /// The response did not match the expected schema.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Status error: {1} (Status {0})")]
    Status(reqwest::StatusCode, String),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenError {
    /// Errors that no later item can recover from. Everything else only
    /// fails the item being generated.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GenError::Config { .. }
                | GenError::InvalidKeyFormat(_)
                | GenError::Auth(_)
                | GenError::NoValidCombinations
        )
    }
}

pub type GenResult<T> = Result<T, GenError>;
