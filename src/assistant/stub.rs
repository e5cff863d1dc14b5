use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{AssistantApi, Job, JobError, JobStatus, MessageContent, TextValue, ThreadMessage};
use crate::errors::{GenError, GenResult};

/// Scripted outcome for one submitted job.
#[derive(Debug, Clone)]
pub enum StubReply {
    /// Stays pending for `pending_polls` status checks, then completes with `text`.
    Complete { text: String, pending_polls: u32 },
    /// Never leaves `in_progress`.
    Never,
    /// Ends in a terminal failure status.
    Fail(JobStatus),
    /// Submission itself fails.
    SubmitError,
    /// Completes with no text part.
    Empty,
    /// Submission is rejected as unauthorized.
    Unauthorized,
}

impl StubReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Complete {
            text: text.into(),
            pending_polls: 0,
        }
    }
}

#[derive(Default)]
struct StubState {
    replies: VecDeque<StubReply>,
    jobs: HashMap<String, (StubReply, u32)>,
    instructions: Vec<String>,
    status_calls: usize,
    cancel_on_submit: Option<(usize, CancellationToken)>,
}

/// In-memory assistant that answers from a queue of scripted replies.
#[derive(Default)]
pub struct StubAssistant {
    state: Mutex<StubState>,
    fallback: Option<String>,
    reject_key: bool,
    verification_hangs: AtomicBool,
}

impl StubAssistant {
    pub fn new(replies: impl IntoIterator<Item = StubReply>) -> Self {
        let stub = Self::default();
        stub.state.lock().unwrap().replies = replies.into_iter().collect();
        stub
    }

    /// Every job without a scripted reply completes at once with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn rejecting_key() -> Self {
        Self {
            reject_key: true,
            ..Self::default()
        }
    }

    /// Make `verify_key` wait forever.
    pub fn hang_verification(&self) {
        self.verification_hangs.store(true, Ordering::SeqCst);
    }

    pub fn push(&self, reply: StubReply) {
        self.state.lock().unwrap().replies.push_back(reply);
    }

    /// Cancel `token` as the `nth` (1-based) job is submitted.
    pub fn cancel_on_submit(&self, nth: usize, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on_submit = Some((nth, token));
    }

    pub fn instructions(&self) -> Vec<String> {
        self.state.lock().unwrap().instructions.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }
}

#[async_trait]
impl AssistantApi for StubAssistant {
    async fn verify_key(&self) -> GenResult<()> {
        if self.verification_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reject_key {
            return Err(GenError::Auth("401 Unauthorized".to_string()));
        }
        Ok(())
    }

    async fn verify_assistant(&self) -> GenResult<()> {
        Ok(())
    }

    async fn create_job(&self, instruction: &str) -> GenResult<Job> {
        let mut state = self.state.lock().unwrap();
        state.instructions.push(instruction.to_string());
        let seq = state.instructions.len();

        if let Some((nth, token)) = &state.cancel_on_submit {
            if *nth == seq {
                token.cancel();
            }
        }

        let reply = match state.replies.pop_front() {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(text) => StubReply::text(text.clone()),
                None => StubReply::Never,
            },
        };
        match reply {
            StubReply::SubmitError => {
                return Err(GenError::Status(
                    reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    "server error".to_string(),
                ))
            }
            StubReply::Unauthorized => {
                return Err(GenError::Auth("401 Unauthorized".to_string()));
            }
            _ => {}
        }

        let run_id = format!("run_{}", seq);
        state.jobs.insert(run_id.clone(), (reply, 0));
        Ok(Job {
            run_id,
            thread_id: format!("thread_{}", seq),
            status: JobStatus::Queued,
            created_at: 0,
            last_error: None,
        })
    }

    async fn job_status(&self, job: &Job) -> GenResult<Job> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;
        let (reply, polls) = state
            .jobs
            .get_mut(&job.run_id)
            .ok_or_else(|| GenError::Status(reqwest::StatusCode::NOT_FOUND, job.run_id.clone()))?;
        *polls += 1;
        let polls = *polls;

        let mut current = job.clone();
        current.status = match &*reply {
            StubReply::Complete { pending_polls, .. } if polls <= *pending_polls => {
                JobStatus::InProgress
            }
            StubReply::Complete { .. } | StubReply::Empty => JobStatus::Completed,
            StubReply::Never | StubReply::SubmitError | StubReply::Unauthorized => {
                JobStatus::InProgress
            }
            StubReply::Fail(status) => {
                current.last_error = Some(JobError {
                    code: "server_error".to_string(),
                    message: "scripted failure".to_string(),
                });
                *status
            }
        };
        Ok(current)
    }

    async fn job_messages(&self, job: &Job) -> GenResult<Vec<ThreadMessage>> {
        let state = self.state.lock().unwrap();
        let content = match state.jobs.get(&job.run_id) {
            Some((StubReply::Complete { text, .. }, _)) => vec![MessageContent::Text {
                text: TextValue {
                    value: text.clone(),
                },
            }],
            _ => vec![],
        };
        Ok(vec![ThreadMessage {
            role: "assistant".to_string(),
            content,
        }])
    }
}
