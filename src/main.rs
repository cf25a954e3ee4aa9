//! Reverie - terminal chat over the turn orchestrator

use clap::Parser;
use reverie::Orchestrator;
use reverie_core::{ReverieConfig, SessionKey, UserId};
use reverie_model::LlamaServerBackend;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "reverie", about = "Reverie — locally-hosted conversational agent")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "reverie.toml")]
    config: PathBuf,

    /// Path to the llama-server binary
    #[arg(long, default_value = "llama-server")]
    server_bin: PathBuf,

    /// User identity for affective tracking
    #[arg(short, long, default_value = "local")]
    user: String,

    /// Resume a session instead of starting a fresh one
    #[arg(short, long)]
    session: Option<String>,

    /// Validate the configuration and exit
    #[arg(long, default_value_t = false)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reverie=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ReverieConfig::load(&cli.config)?;

    if cli.check {
        let problems = config.validate();
        if problems.is_empty() {
            println!("{}: ok", cli.config.display());
            return Ok(());
        }
        for p in &problems {
            eprintln!("{}: {p}", cli.config.display());
        }
        anyhow::bail!("configuration invalid");
    }

    let backend = Arc::new(LlamaServerBackend::new(&cli.server_bin));
    let orchestrator = Arc::new(Orchestrator::new(backend, &config)?);

    let session = SessionKey::new(
        cli.session
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
    );
    let user = UserId::new(&cli.user);
    info!(session = %session, user = %user, "session started");

    println!("reverie {} — /status, /quit", env!("CARGO_PKG_VERSION"));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "/quit" | "/exit" => break,
            "/status" => {
                let status = orchestrator.status().await;
                println!("{}", serde_json::to_string_pretty(&status)?);
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        match orchestrator
            .handle_turn(&session, &user, input, &cancel)
            .await
        {
            Ok(result) => {
                println!("{}", result.text);
                if result.degraded {
                    eprintln!("(degraded turn: some facets were unavailable)");
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}
