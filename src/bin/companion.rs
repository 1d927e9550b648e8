//! Headless companion binary.
//!
//! Reads lines from stdin. Plain lines are spoken as the user; lines starting
//! with `/` are commands:
//!
//! - `/login <user> <password>` and `/register <user> <password>`
//! - `/logout`
//! - `/clear-memory`
//! - `/end`
//!
//! After every line the session snapshot and transcript are written to
//! stdout as one JSON object. Diagnostics go to stderr.

use std::sync::Arc;

use alfred::session::{ConnectionStatus, MessageSource, NoopTransport, TransportEvent};
use alfred::{Companion, CompanionConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

fn load_config() -> anyhow::Result<CompanionConfig> {
    let path = CompanionConfig::default_config_path();
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        return Ok(CompanionConfig::default());
    }
    CompanionConfig::from_file(&path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))
}

/// Start a conversation if none is live, connecting the no-op transport by hand.
async fn ensure_conversation(companion: &Companion) -> alfred::Result<()> {
    match companion.session().snapshot().status {
        ConnectionStatus::Connected => return Ok(()),
        ConnectionStatus::Connecting => companion.end_conversation().await,
        ConnectionStatus::Disconnected | ConnectionStatus::Error => {}
    }
    companion.start_conversation().await?;
    companion.session().handle_event(TransportEvent::Connect);
    Ok(())
}

async fn handle_line(companion: &Companion, line: &str) -> alfred::Result<Option<String>> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("/login" | "/register") => {
            let username = words.next().unwrap_or_default();
            let password = words.next().unwrap_or_default();
            let user = if line.starts_with("/login") {
                companion.login(username, password).await?
            } else {
                companion.register(username, password).await?
            };
            Ok(Some(format!("logged in as {}", user.username)))
        }
        Some("/logout") => {
            companion.logout().await?;
            Ok(Some("logged out".to_owned()))
        }
        Some("/clear-memory") => {
            companion.clear_memory().await?;
            Ok(Some("memory cleared".to_owned()))
        }
        Some("/end") => {
            companion.end_conversation().await;
            Ok(Some("conversation ended".to_owned()))
        }
        Some(command) if command.starts_with('/') => {
            Ok(Some(format!("unknown command {command}")))
        }
        _ => {
            ensure_conversation(companion).await?;
            companion.session().handle_event(TransportEvent::Message {
                source: MessageSource::User,
                message: line.to_owned(),
            });
            companion.session().wait_for_classifications().await;
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries snapshots; keep diagnostics on stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("alfred=info")),
        )
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env file loaded");
    }

    let config = load_config()?;
    let companion = Companion::from_config(&config, Arc::new(NoopTransport))
        .map_err(|e| anyhow::anyhow!("failed to initialise companion: {e}"))?;
    if let Some(username) = companion.resume()? {
        tracing::info!(%username, "welcome back");
    }

    tracing::info!("alfred-companion ready");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (note, error) = match handle_line(&companion, line).await {
            Ok(note) => (note, None),
            Err(e) => {
                tracing::warn!(error = %e, "command failed");
                (None, Some(e.to_string()))
            }
        };
        let snapshot = companion.session().snapshot();
        let output = serde_json::json!({
            "indicator": snapshot.indicator(),
            "snapshot": snapshot,
            "transcript": companion.session().messages(),
            "note": note,
            "error": error,
        });
        println!("{output}");
    }

    companion.end_conversation().await;
    tracing::info!("alfred-companion shut down cleanly");
    Ok(())
}
