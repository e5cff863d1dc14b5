use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{AssistantApi, Job, ThreadMessage};
use crate::config::Credentials;
use crate::errors::{GenError, GenResult};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

/// Assistants v2 client over plain HTTP.
pub struct OpenAiAssistant {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    assistant_id: String,
}

impl OpenAiAssistant {
    pub fn new(
        creds: &Credentials,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> GenResult<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: creds.api_key.clone(),
            assistant_id: creds.assistant_id.clone(),
        })
    }

    /// Like [`OpenAiAssistant::new`], with the base URL taken from
    /// `OPENAI_BASE_URL` when set.
    pub fn from_env(creds: &Credentials, request_timeout: Duration) -> GenResult<Self> {
        let base_url =
            dotenv::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(creds, base_url, request_timeout)
    }

    /// Resolve an API path against the base URL, tolerating a base with or without `/v1`.
    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/{}", base, path)
        } else {
            format!("{}/v1/{}", base, path)
        }
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<R: DeserializeOwned>(&self, req: RequestBuilder) -> GenResult<R> {
        let resp = self.authorize(req).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GenError::Auth(format!("{} {}", status, text)));
        }
        if !status.is_success() {
            return Err(GenError::Status(status, text));
        }

        serde_json::from_str(&text).map_err(|e| GenError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl AssistantApi for OpenAiAssistant {
    async fn verify_key(&self) -> GenResult<()> {
        let _: ListResponse<serde_json::Value> =
            self.send(self.client.get(self.url("models"))).await?;
        Ok(())
    }

    async fn verify_assistant(&self) -> GenResult<()> {
        let assistant_id = &self.assistant_id;
        let req = self.client.get(self.url(&format!("assistants/{}", assistant_id)));
        match self.send::<serde_json::Value>(req).await {
            Ok(_) => Ok(()),
            Err(GenError::Status(status, body)) if status == StatusCode::NOT_FOUND => {
                Err(GenError::Auth(format!(
                    "Failed to retrieve assistant with ID {}: {}",
                    assistant_id, body
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn create_job(&self, instruction: &str) -> GenResult<Job> {
        let body = serde_json::json!({
            "assistant_id": self.assistant_id,
            "thread": {
                "messages": [{ "role": "user", "content": instruction }],
            },
        });
        let job: Job = self
            .send(self.client.post(self.url("threads/runs")).json(&body))
            .await?;
        debug!(
            run_id = %job.run_id,
            thread_id = %job.thread_id,
            created_at = job.created_at,
            "job submitted"
        );
        Ok(job)
    }

    async fn job_status(&self, job: &Job) -> GenResult<Job> {
        let path = format!("threads/{}/runs/{}", job.thread_id, job.run_id);
        self.send(self.client.get(self.url(&path))).await
    }

    async fn job_messages(&self, job: &Job) -> GenResult<Vec<ThreadMessage>> {
        let path = format!("threads/{}/messages", job.thread_id);
        let req = self
            .client
            .get(self.url(&path))
            .query(&[("order", "desc"), ("run_id", job.run_id.as_str())]);
        let list: ListResponse<ThreadMessage> = self.send(req).await?;
        debug!(thread_id = %job.thread_id, count = list.data.len(), "fetched job messages");
        Ok(list.data)
    }
}
