//! `keelson` command-line runner.
//!
//! Configuration comes from flags, environment variables and an optional
//! `.env` file in the working directory.

mod config;
mod output;
mod tools;

use anyhow::Context;
use clap::Parser;
use keelson::{AgentLoop, CancellationToken, RunRequest};

use crate::config::{Cli, Command};
use crate::output::{print_response, write_sse};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let store = cli
        .checkpoint
        .backend()?
        .connect()
        .await
        .context("checkpoint backend")?;

    let config = cli.loop_config();
    let mut builder = AgentLoop::builder()
        .with_shared_checkpointer(store)
        .with_tools(tools::builtin_registry()?)
        .with_config(config.clone());

    // read-only commands work without LLM settings
    builder = if cli.command.is_offline() {
        builder.with_planner(Unconfigured)
    } else {
        builder.with_planner(cli.llm.client(config.planner_timeout)?)
    };
    let agent = builder.build()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling after the current stage");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::Run {
            message,
            thread_id,
            max_iterations,
            stream,
        } => {
            let mut request =
                RunRequest::new(message, cli.identity.user()?).with_max_iterations(max_iterations);
            if let Some(thread_id) = thread_id {
                request = request.with_thread_id(thread_id);
            }

            if stream {
                let events = agent.stream_with_cancellation(request, cancel).await?;
                write_sse(events, &mut std::io::stdout().lock()).await?;
            } else {
                let response = agent.run_with_cancellation(request, cancel).await?;
                print_response(&response)?;
            }
        }
        Command::Resume { thread_id } => {
            let response = agent.resume(&thread_id, &cli.identity.user()?, cancel).await?;
            print_response(&response)?;
        }
        Command::State { thread_id } => {
            let state = agent
                .state(&thread_id)
                .await?
                .with_context(|| format!("no checkpoint for thread '{thread_id}'"))?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Threads => {
            let threads = agent.list_threads(&cli.identity.user()?).await?;
            println!("{}", serde_json::to_string_pretty(&threads)?);
        }
        Command::Delete { thread_id } => {
            if !agent.delete_thread(&thread_id, &cli.identity.user()?).await? {
                anyhow::bail!("no checkpoint for thread '{thread_id}'");
            }
            tracing::info!(thread_id = %thread_id, "thread deleted");
        }
    }

    Ok(())
}

/// Placeholder planner for commands that never reach a stage.
struct Unconfigured;

#[async_trait::async_trait]
impl keelson::ChatCompletion for Unconfigured {
    async fn complete(
        &self,
        _messages: Vec<keelson::Message>,
    ) -> Result<String, keelson::KeelsonError> {
        Err(keelson::KeelsonError::InvalidConfig(
            "no LLM endpoint configured".to_string(),
        ))
    }
}
