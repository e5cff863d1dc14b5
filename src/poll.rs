use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::assistant::{AssistantApi, Job, JobStatus};
use crate::errors::{GenError, GenResult};

/// Lower bound on the delay between two status checks.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on a single HTTP request.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollOptions {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Per-request timeout for the HTTP client, so one hung request cannot
    /// outlast the whole job timeout.
    pub fn request_timeout(&self) -> Duration {
        self.timeout.min(MAX_REQUEST_TIMEOUT)
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(120), Duration::from_secs(1))
    }
}

/// Poll `job` until it completes and return the text of its newest message.
///
/// Fails with [`GenError::Timeout`] once `opts.timeout` has elapsed without
/// the job completing, and with [`GenError::JobFailed`] as soon as the job
/// lands in a terminal failure state.
pub async fn poll_until_complete(
    api: &dyn AssistantApi,
    job: &Job,
    opts: &PollOptions,
) -> GenResult<String> {
    let start = Instant::now();
    let mut polls = 0u32;

    loop {
        let current = api.job_status(job).await?;
        polls += 1;

        if current.status == JobStatus::Completed {
            debug!(
                run_id = %job.run_id,
                polls,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "job completed"
            );
            break;
        }

        if current.status.is_failure() {
            let reason = current
                .last_error
                .map(|e| format!("{}: {}", e.code, e.message))
                .unwrap_or_else(|| "no error details".to_string());
            warn!(run_id = %job.run_id, status = ?current.status, "job failed");
            return Err(GenError::JobFailed {
                status: current.status,
                reason,
            });
        }

        let elapsed = start.elapsed();
        if elapsed >= opts.timeout {
            return Err(GenError::Timeout { elapsed });
        }

        tokio::time::sleep(opts.interval.min(opts.timeout - elapsed)).await;
    }

    let messages = api.job_messages(job).await?;
    let text = messages
        .iter()
        .find(|m| m.role == "assistant")
        .and_then(|m| m.first_text())
        .ok_or_else(|| {
            GenError::MalformedResponse(format!(
                "job {} completed without text output",
                job.run_id
            ))
        })?;

    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::stub::{StubAssistant, StubReply};

    fn opts(timeout_secs: u64, interval_ms: u64) -> PollOptions {
        PollOptions::new(
            Duration::from_secs(timeout_secs),
            Duration::from_millis(interval_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_text_after_pending_polls() {
        let api = StubAssistant::new([StubReply::Complete {
            text: "a lighthouse in fog".to_string(),
            pending_polls: 3,
        }]);
        let job = api.create_job("go").await.unwrap();

        let text = poll_until_complete(&api, &job, &opts(30, 500)).await.unwrap();
        assert_eq!(text, "a lighthouse in fog");
        assert_eq!(api.status_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_never_complete() {
        let api = StubAssistant::new([StubReply::Never]);
        let job = api.create_job("go").await.unwrap();

        let start = Instant::now();
        let err = poll_until_complete(&api, &job, &opts(30, 1000)).await.unwrap_err();
        match err {
            GenError::Timeout { elapsed } => assert!(elapsed >= Duration::from_secs(30)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(start.elapsed() >= Duration::from_secs(30));
        // one check per interval, plus the initial one
        assert_eq!(api.status_calls(), 31);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_not_overshot_by_long_interval() {
        let api = StubAssistant::new([StubReply::Never]);
        let job = api.create_job("go").await.unwrap();

        let start = Instant::now();
        let err = poll_until_complete(&api, &job, &opts(5, 60_000)).await.unwrap_err();
        assert!(matches!(err, GenError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_fails_fast() {
        let api = StubAssistant::new([StubReply::Fail(JobStatus::Failed)]);
        let job = api.create_job("go").await.unwrap();

        let err = poll_until_complete(&api, &job, &opts(30, 1000)).await.unwrap_err();
        assert!(matches!(
            err,
            GenError::JobFailed {
                status: JobStatus::Failed,
                ..
            }
        ));
        assert_eq!(api.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_text_is_malformed() {
        let api = StubAssistant::new([StubReply::Empty]);
        let job = api.create_job("go").await.unwrap();

        let err = poll_until_complete(&api, &job, &opts(30, 1000)).await.unwrap_err();
        assert!(matches!(err, GenError::MalformedResponse(_)));
    }

    #[test]
    fn test_interval_floor() {
        let opts = PollOptions::new(Duration::from_secs(10), Duration::ZERO);
        assert_eq!(opts.interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_request_timeout_capped_by_job_timeout() {
        assert_eq!(opts(5, 1000).request_timeout(), Duration::from_secs(5));
        assert_eq!(PollOptions::default().request_timeout(), MAX_REQUEST_TIMEOUT);
    }
}
