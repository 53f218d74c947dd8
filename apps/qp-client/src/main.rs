//! QuietPost command-line client.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use qp_client::config::ClientConfig;
use qp_client::engine::SyncEngine;
use qp_client::error::ClientError;
use qp_client::events::EventLog;
use qp_client::relay::RelayClient;
use qp_client::sync::{spawn_sync_loop, SyncStatus};
use qp_client::{handshake, keyfile, message};
use qp_store::db::Store;
use qp_store::models::Direction;

#[derive(Parser)]
#[command(name = "qp-client", version, about = "QuietPost relay messaging client")]
struct Cli {
    /// Configuration file, created with defaults on first run.
    #[arg(long, default_value = "quietpost.toml")]
    config: PathBuf,

    /// Identity keyfile (see `keygen`).
    #[arg(long, default_value = "identity.key")]
    key_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new identity keyfile and print the public key.
    Keygen,
    /// Register a contact by name and verification key.
    AddContact { name: String, verification_key: String },
    /// List known contacts.
    Contacts,
    /// Remove a contact and everything derived from it.
    RemoveContact { name: String },
    /// Start a key exchange with a contact.
    Handshake { name: String },
    /// Send a message to a contact (requires a completed handshake).
    Send { name: String, text: String },
    /// Print message history with a contact.
    History { name: String },
    /// Run the background sync loop, printing events as they happen.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qp_client=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Command::Keygen = cli.command {
        let identity = keyfile::generate_to(&cli.key_file)?;
        println!("{}", identity.public_b64());
        return Ok(());
    }

    let config = ClientConfig::load_or_init(&cli.config)?;
    let identity = Arc::new(keyfile::load_identity(&cli.key_file)?);
    let store = Store::open(&config.database.path).await?;
    let events = Arc::new(match &config.log.path {
        Some(path) => EventLog::with_file(path)?,
        None => EventLog::new(),
    });
    let relay = Arc::new(RelayClient::new(&config.server)?);
    let engine = SyncEngine::new(store, relay, identity, events);

    match cli.command {
        Command::Keygen => unreachable!(),
        Command::AddContact { name, verification_key } => {
            run(add_contact(&engine, &name, &verification_key)).await
        }
        Command::Contacts => run(list_contacts(&engine)).await,
        Command::RemoveContact { name } => run(remove_contact(&engine, &name)).await,
        Command::Handshake { name } => run(start_handshake(&engine, &name)).await,
        Command::Send { name, text } => run(send_message(&engine, &name, &text)).await,
        Command::History { name } => run(history(&engine, &name)).await,
        Command::Run => {
            run_loop(engine, &config).await;
            Ok(())
        }
    }
}

/// Print a failure with its category label; exit nonzero.
async fn run(fut: impl std::future::Future<Output = Result<(), ClientError>>) -> anyhow::Result<()> {
    match fut.await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("[{}] {e}", e.category());
            std::process::exit(1);
        }
    }
}

async fn add_contact(
    engine: &SyncEngine,
    name: &str,
    verification_key: &str,
) -> Result<(), ClientError> {
    let contact = engine.store.add_contact(name, verification_key).await?;
    println!("added contact {} (id {})", contact.name, contact.id);
    Ok(())
}

async fn list_contacts(engine: &SyncEngine) -> Result<(), ClientError> {
    for contact in engine.store.list_contacts().await? {
        let keys = engine.store.shared_keys_for_contact(contact.id).await?;
        let state = if keys.is_empty() { "no shared key" } else { "ready" };
        println!("{}  {}  [{state}]", contact.name, contact.verification_key);
    }
    Ok(())
}

async fn remove_contact(engine: &SyncEngine, name: &str) -> Result<(), ClientError> {
    let contact = lookup(engine, name).await?;
    engine.store.delete_contact(contact.id).await?;
    println!("removed contact {name}");
    Ok(())
}

async fn start_handshake(engine: &SyncEngine, name: &str) -> Result<(), ClientError> {
    let contact = lookup(engine, name).await?;
    handshake::initiate(engine, &contact).await?;
    println!("handshake offer posted to {name}");
    Ok(())
}

async fn send_message(engine: &SyncEngine, name: &str, text: &str) -> Result<(), ClientError> {
    let contact = lookup(engine, name).await?;
    message::send(engine, &contact, text).await?;
    println!("sent");
    Ok(())
}

async fn history(engine: &SyncEngine, name: &str) -> Result<(), ClientError> {
    let contact = lookup(engine, name).await?;
    let rows = engine
        .store
        .messages_for_contact(contact.id, &HashSet::new())
        .await?;
    for row in rows {
        let who = match row.direction {
            Direction::Sent => "me",
            Direction::Received => name,
        };
        println!("{} {who}: {}", row.timestamp.format("%Y-%m-%d %H:%M:%S"), row.body);
    }
    Ok(())
}

async fn lookup(engine: &SyncEngine, name: &str) -> Result<qp_store::models::ContactRow, ClientError> {
    engine
        .store
        .contact_by_name(name)
        .await?
        .ok_or_else(|| ClientError::UnknownContact(name.to_string()))
}

/// Foreground of `run`: tail the event log until interrupted.
async fn run_loop(engine: SyncEngine, config: &ClientConfig) {
    let status = Arc::new(SyncStatus::default());
    let events = engine.events.clone();
    let handle = spawn_sync_loop(engine, (&config.server).into(), status.clone());

    let mut seen = 0usize;
    loop {
        if handle.is_finished() {
            break;
        }
        let total = events.len();
        if total > seen {
            for entry in events.recent(total - seen) {
                println!(
                    "{} [{:?}] {}: {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.severity,
                    entry.title,
                    entry.detail
                );
            }
            seen = total;
        }
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
}
