//! KCA Connect - Line-mode chat client
//!
//! Reads questions from stdin and streams the assistant's answers to stdout
//! as they arrive.
//!
//! # Usage
//!
//! ```bash
//! # Interactive session against the configured endpoint
//! kca-connect
//!
//! # One question, then exit
//! kca-connect --ask "When is my exam?"
//!
//! # Explicit endpoint
//! kca-connect --url https://abc.supabase.co --api-key "$ANON_KEY"
//!
//! # Verbose logging (stderr)
//! RUST_LOG=debug kca-connect
//! ```
//!
//! # Keys
//!
//! - `Ctrl+C` while a reply is streaming: stop the reply, keep what arrived
//! - `Ctrl+C` at the prompt, `/quit`, or EOF: exit

mod render;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

use connect_core::{
    load_config_from_path, ChatConfig, ConfigOverrides, ConversationSession,
    HttpCompletionBackend, SendOutcome, SessionId,
};

use render::{Renderer, PROMPT};

type Session = ConversationSession<HttpCompletionBackend>;

/// KCA Connect - chat with the university assistant from a terminal
#[derive(Parser, Debug)]
#[command(name = "kca-connect")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "KCA_CONNECT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Endpoint base URL
    #[arg(short = 'u', long, value_name = "URL")]
    url: Option<String>,

    /// Bearer credential for the endpoint
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Conversation ID forwarded with every exchange
    #[arg(short = 's', long, value_name = "ID")]
    session_id: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Ask a single question and exit
    #[arg(short = 'a', long, value_name = "TEXT")]
    ask: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "KCA_CONNECT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.url.clone(),
            api_key: self.api_key.clone(),
            session_id: self.session_id.clone(),
            connect_timeout_ms: self.connect_timeout_ms,
        }
    }
}

/// Load file and environment settings, then apply command-line overrides
fn resolve_config(args: &Args) -> Result<ChatConfig> {
    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    ensure_session_id(&mut config);
    Ok(config)
}

/// Give the conversation an ID when none was configured
///
/// Returns `true` if a new one was generated.
fn ensure_session_id(config: &mut ChatConfig) -> bool {
    if config.session_id.is_some() {
        return false;
    }
    config.session_id = Some(SessionId::new());
    true
}

fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("kca_connect={level}").parse()?)
                .add_directive(format!("connect_core={level}").parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = resolve_config(&args)?;
    info!(
        base_url = %config.base_url,
        source = %config.source(),
        session_id = ?config.session_id,
        "Configuration loaded"
    );
    if config.api_key.is_empty() {
        warn!("No API key configured; the endpoint will likely reject requests");
    }

    let backend =
        HttpCompletionBackend::from_config(&config).context("Failed to create HTTP backend")?;
    let session = ConversationSession::from_config(backend, &config);

    match args.ask {
        Some(question) => {
            let result = ask_once(&session, question).await;
            session.shutdown();
            result
        }
        None => run_interactive(session).await,
    }
}

/// Send one question and print the settled reply
async fn ask_once(session: &Session, question: String) -> Result<()> {
    let outcome = send_with_interrupt(session, question).await;

    let reply = session
        .transcript()
        .last()
        .map(|turn| turn.content.clone())
        .unwrap_or_default();
    let mut stdout = tokio::io::stdout();
    stdout.write_all(reply.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    match outcome {
        SendOutcome::Completed { .. } | SendOutcome::Cancelled => Ok(()),
        SendOutcome::Failed => bail!("Chat exchange failed"),
        SendOutcome::Skipped(reason) => bail!("Nothing sent: {reason:?}"),
    }
}

/// Prompt loop: one exchange per input line
async fn run_interactive(session: Session) -> Result<()> {
    let mut updates = session.subscribe();
    let greeting = session.transcript().first().map(Renderer::greeting);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        let mut renderer = Renderer::new();
        if let Some(text) = greeting {
            stdout.write_all(text.as_bytes()).await?;
            stdout.flush().await?;
        }
        while let Some(update) = updates.recv().await {
            if let Some(text) = renderer.render(&update) {
                stdout.write_all(text.as_bytes()).await?;
                stdout.flush().await?;
            }
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interruptible = true;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            result = signal::ctrl_c(), if interruptible => match result {
                Ok(()) => {
                    info!("Received Ctrl+C, exiting");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install Ctrl+C handler");
                    interruptible = false;
                    continue;
                }
            },
        };

        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "/quit" | "/exit" => break,
            "" => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(PROMPT.as_bytes()).await?;
                stdout.flush().await?;
            }
            _ => {
                send_with_interrupt(&session, line).await;
            }
        }
    }

    // Dropping the session closes the update channel; the writer drains it
    session.shutdown();
    drop(session);
    writer
        .await
        .context("Output task failed")?
        .context("Failed to write to stdout")?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Send, cancelling the exchange if Ctrl+C arrives before it settles
async fn send_with_interrupt(session: &Session, utterance: String) -> SendOutcome {
    let send = session.send(utterance);
    tokio::pin!(send);

    let mut interruptible = true;
    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome,
            result = signal::ctrl_c(), if interruptible => match result {
                Ok(()) => {
                    if session.cancel() {
                        info!("Stopping reply");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install Ctrl+C handler");
                    interruptible = false;
                }
            },
        }
    };

    match &outcome {
        SendOutcome::Failed => warn!("Reply replaced with apology"),
        SendOutcome::Skipped(reason) => info!(?reason, "Send skipped"),
        SendOutcome::Completed { .. } | SendOutcome::Cancelled => {}
    }
    outcome
}
