mod assistant;
mod config;
mod errors;
mod poll;
mod prompts;
mod run;
mod sink;
mod topics;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use assistant::OpenAiAssistant;
use config::Credentials;
use poll::PollOptions;
use run::{Plan, RunState, Runner};
use sink::PromptSink;

/// Generate Midjourney prompts using an OpenAI Assistant.
///
/// Credentials come from the config file (`OPENAI_API_KEY=...`,
/// `ASSISTANT_ID=...`) or from environment variables of the same names.
#[derive(Parser, Debug)]
#[command(name = "midjourney-prompts", version)]
struct Args {
    /// Total number of prompts to generate
    #[arg(short = 'n', long, default_value_t = 500)]
    num_prompts: usize,

    /// Skip the topic/keyword stage and use a single generic instruction
    #[arg(long)]
    flat: bool,

    /// KEY=VALUE credentials file
    #[arg(long, default_value = "config.txt")]
    config: PathBuf,

    /// Directory for midjourney_prompts_<YYMMDD>.txt
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Seconds to wait for a single assistant job
    #[arg(long, default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: u64,

    /// Delay between job status checks
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_ms: u64,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let creds = Credentials::load(&args.config).context("Failed to load configuration")?;

    let poll = PollOptions::new(
        Duration::from_secs(args.timeout_secs),
        Duration::from_millis(args.poll_interval_ms),
    );
    let api = OpenAiAssistant::from_env(&creds, poll.request_timeout())
        .context("Failed to create assistant client")?;
    let sink = PromptSink::new(&args.output_dir);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for interrupt: {}", e);
            return;
        }
        info!("Interrupt received, finishing up (press Ctrl-C again to quit now)");
        interrupt.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, exiting immediately");
            std::process::exit(130);
        }
    });

    let mut runner = Runner::new(&api, poll, sink, cancel);
    runner
        .authenticate(&creds)
        .await
        .context("Setup error")?;
    if runner.state() == RunState::Interrupted {
        info!("Interrupted before generation started");
    }

    let plan = if args.flat {
        Plan::Flat {
            total: args.num_prompts,
        }
    } else {
        Plan::Topics {
            total: args.num_prompts,
        }
    };
    info!(?plan, output_dir = %args.output_dir.display(), "Starting generation");

    let summary = runner.run(plan).await?;
    println!("\n{}", summary);

    Ok(())
}
