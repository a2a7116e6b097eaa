//! ClawReview worker binary.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use clawreview::github::GithubClient;
use clawreview::providers::{AnthropicProvider, OpenAiProvider};
use clawreview::queue::{DurableQueue, SqliteQueue};
use clawreview::store::SqliteStore;
use clawreview::task::ReviewTask;
use clawreview::{Config, Orchestrator};

#[derive(Parser)]
#[command(name = "clawreview", version, about = "Multi-agent pull request review worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the review worker until ctrl-c.
    Worker,
    /// Push a review task for a pull request onto the queue.
    Enqueue {
        /// Repository full name, e.g. acme/widgets.
        #[arg(long)]
        repo: String,
        /// Pull request number.
        #[arg(long)]
        number: u64,
    },
    /// Show queue depth and dead-letter count.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clawreview=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Worker => run_worker(config).await,
        Command::Enqueue { repo, number } => {
            let (owner, repo_name) = repo
                .split_once('/')
                .ok_or_else(|| anyhow::anyhow!("repo must be owner/name, got '{repo}'"))?;
            let queue = SqliteQueue::new(&config.database_path)?;
            queue
                .enqueue(&ReviewTask::new(owner, repo_name, number))
                .await?;
            println!("enqueued {repo}#{number}");
            Ok(())
        }
        Command::Stats => {
            let queue = SqliteQueue::new(&config.database_path)?;
            println!("queued: {}", queue.len().await?);
            println!("dead-lettered: {}", queue.dead_letter_len().await?);
            Ok(())
        }
    }
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    if !config.has_credentials() {
        anyhow::bail!(
            "missing credentials: set GITHUB_TOKEN, OPENAI_API_KEY, and ANTHROPIC_API_KEY"
        );
    }

    let queue = Arc::new(SqliteQueue::new(&config.database_path)?);
    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    let github = Arc::new(GithubClient::new(config.github_token.clone()));
    let openai = Arc::new(OpenAiProvider::new(config.openai_api_key.clone()));
    let anthropic = Arc::new(AnthropicProvider::new(config.anthropic_api_key.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        queue,
        store.clone(),
        store,
        github,
        openai,
        anthropic,
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received shutdown signal");
                shutdown.cancel();
            }
        });
    }

    let worker = tokio::spawn(orchestrator.run(shutdown.clone()));
    worker.await?;

    // Give any in-flight status writes a moment before the process exits.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
