use std::fmt;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::assistant::AssistantApi;
use crate::config::Credentials;
use crate::errors::{GenError, GenResult};
use crate::poll::PollOptions;
use crate::prompts::{flat_instruction, generate_prompt, keyword_instruction};
use crate::sink::{PromptSink, SavedPrompt};
use crate::topics::fetch_combinations;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Authenticating,
    FetchingTopics,
    GeneratingPrompts,
    Interrupted,
    Done,
}

/// What to generate. `total` is always the total number of prompts for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Brainstorm topic/keyword combinations first and spread `total` over them.
    Topics { total: usize },
    /// Skip the topic stage and use one generic instruction.
    Flat { total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedItem {
    pub index: usize,
    pub text: String,
    pub saved: SavedPrompt,
}

/// Everything produced so far. Owned by the runner; never shared with the
/// interrupt handler, which only holds the cancellation token.
#[derive(Debug, Default)]
pub struct RunContext {
    pub items: Vec<GeneratedItem>,
    pub failed: usize,
    pub total_chars: usize,
}

impl RunContext {
    fn record(&mut self, text: String, saved: SavedPrompt) -> &GeneratedItem {
        self.total_chars += text.chars().count();
        let index = self.items.len() + 1;
        self.items.push(GeneratedItem { index, text, saved });
        &self.items[index - 1]
    }

    fn last_output(&self) -> Option<PathBuf> {
        self.items.last().map(|item| item.saved.path.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub generated: usize,
    pub failed: usize,
    pub total_chars: usize,
    pub output: Option<PathBuf>,
    pub interrupted: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.interrupted {
            writeln!(f, "Interrupted by user.")?;
        }
        match &self.output {
            Some(path) => write!(
                f,
                "Successfully generated and saved {} prompts ({} characters) to {}",
                self.generated,
                self.total_chars,
                path.display()
            )?,
            None => write!(f, "No prompts were generated")?,
        }
        if self.failed > 0 {
            write!(f, "; {} failed", self.failed)?;
        }
        Ok(())
    }
}

enum ItemOutcome {
    Saved,
    Failed,
    Interrupted,
    Fatal(GenError),
}

/// Split `total` across `buckets`; the first `total % buckets` get one extra.
pub fn distribute(total: usize, buckets: usize) -> Vec<usize> {
    if buckets == 0 {
        return Vec::new();
    }
    let base = total / buckets;
    let extra = total % buckets;
    (0..buckets).map(|i| base + usize::from(i < extra)).collect()
}

pub struct Runner<'a> {
    api: &'a dyn AssistantApi,
    poll: PollOptions,
    sink: PromptSink,
    cancel: CancellationToken,
    state: RunState,
    ctx: RunContext,
}

impl<'a> Runner<'a> {
    pub fn new(
        api: &'a dyn AssistantApi,
        poll: PollOptions,
        sink: PromptSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            poll,
            sink,
            cancel,
            state: RunState::Authenticating,
            ctx: RunContext::default(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        info!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }

    /// Check the key format locally, then the key and assistant remotely.
    /// An interrupt while the remote checks are pending moves the runner to
    /// `Interrupted` and returns `Ok`.
    pub async fn authenticate(&mut self, creds: &Credentials) -> GenResult<()> {
        creds.validate()?;

        let api = self.api;
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.transition(RunState::Interrupted);
                Ok(())
            }
            verified = Self::verify_remote(api, creds) => verified,
        }
    }

    async fn verify_remote(api: &dyn AssistantApi, creds: &Credentials) -> GenResult<()> {
        api.verify_key().await.map_err(|e| match e {
            GenError::Auth(_) => e,
            other => GenError::Auth(format!("Failed to verify API key: {}", other)),
        })?;
        api.verify_assistant().await.map_err(|e| match e {
            GenError::Auth(_) => e,
            other => GenError::Auth(format!(
                "Failed to retrieve assistant with ID {}: {}",
                creds.assistant_id, other
            )),
        })?;

        info!("Successfully authenticated and verified assistant ID");
        Ok(())
    }

    pub async fn run(mut self, plan: Plan) -> GenResult<RunSummary> {
        if self.state == RunState::Interrupted {
            return Ok(self.finish());
        }

        let batches = match plan {
            Plan::Flat { total } => vec![(None, flat_instruction(), total)],
            Plan::Topics { total } => {
                self.transition(RunState::FetchingTopics);
                let combos = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        self.transition(RunState::Interrupted);
                        return Ok(self.finish());
                    }
                    combos = fetch_combinations(self.api, &self.poll) => combos?,
                };
                let counts = distribute(total, combos.len());
                combos
                    .into_iter()
                    .zip(counts)
                    .filter(|(_, count)| *count > 0)
                    .map(|(combo, count)| {
                        let instruction = keyword_instruction(&combo.topic, &combo.keywords);
                        (Some(combo), instruction, count)
                    })
                    .collect()
            }
        };

        self.transition(RunState::GeneratingPrompts);
        'outer: for (combo, instruction, count) in batches {
            if let Some(combo) = &combo {
                info!(%combo, count, "Generating prompts for topic");
            }
            for i in 1..=count {
                match self.generate_one(&instruction, i, count).await {
                    ItemOutcome::Saved | ItemOutcome::Failed => {}
                    ItemOutcome::Interrupted => break 'outer,
                    ItemOutcome::Fatal(e) => {
                        error!(generated = self.ctx.items.len(), "Stopping run: {}", e);
                        return Err(e);
                    }
                }
            }
        }

        if self.cancel.is_cancelled() {
            self.transition(RunState::Interrupted);
        } else {
            self.transition(RunState::Done);
        }
        Ok(self.finish())
    }

    /// Generate and persist one prompt. Cancellation drops the in-flight job;
    /// the append itself is never raced against it.
    async fn generate_one(&mut self, instruction: &str, i: usize, count: usize) -> ItemOutcome {
        if self.cancel.is_cancelled() {
            return ItemOutcome::Interrupted;
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(item = i, "in-flight prompt dropped");
                return ItemOutcome::Interrupted;
            }
            result = generate_prompt(self.api, &self.poll, instruction) => result,
        };

        let saved = result.and_then(|text| {
            let saved = self.sink.append(&text)?;
            Ok((text, saved))
        });

        match saved {
            Ok((text, saved)) => {
                let item = self.ctx.record(text, saved);
                info!(
                    progress = %format!("{}/{}", i, count),
                    index = item.index,
                    number = item.saved.number,
                    "Generated and saved prompt"
                );
                println!("{}\n", item.text);
                ItemOutcome::Saved
            }
            Err(e) if e.is_fatal() => ItemOutcome::Fatal(e),
            Err(e) => {
                error!(item = i, "Error generating prompt {}/{}: {}", i, count, e);
                self.ctx.failed += 1;
                ItemOutcome::Failed
            }
        }
    }

    fn finish(self) -> RunSummary {
        RunSummary {
            generated: self.ctx.items.len(),
            failed: self.ctx.failed,
            total_chars: self.ctx.total_chars,
            output: self.ctx.last_output(),
            interrupted: self.state == RunState::Interrupted,
        }
    }
}
