//! Background sync loop.
//!
//! One task alternates between two states. Disconnected: probe the
//! relay every `ping_interval` until it answers. Connected: fetch and
//! apply every `fetch_interval`, sweeping unanswered handshake offers
//! every `respond_every`th cycle. A timeout anywhere flips back to
//! disconnected; no error stops the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::ClientError;
use crate::events::EventLog;
use crate::handshake;
use crate::relay::RelayError;
use crate::SyncEngine;

/// Shared connectivity flag the foreground reads for its status line.
#[derive(Default)]
pub struct SyncStatus {
    connected: AtomicBool,
}

impl SyncStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Relaxed);
    }
}

pub struct SyncIntervals {
    pub ping_interval: Duration,
    pub fetch_interval: Duration,
    pub respond_every: u64,
}

impl From<&ServerConfig> for SyncIntervals {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            fetch_interval: config.fetch_interval(),
            respond_every: config.respond_every.max(1),
        }
    }
}

pub fn spawn_sync_loop(
    engine: SyncEngine,
    intervals: SyncIntervals,
    status: Arc<SyncStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_sync_loop(engine, intervals, status).await;
    })
}

async fn run_sync_loop(engine: SyncEngine, intervals: SyncIntervals, status: Arc<SyncStatus>) {
    let events: &EventLog = &engine.events;
    let mut cycle: u64 = 0;

    loop {
        if !status.is_connected() {
            match engine.relay.ping().await {
                Ok(()) => {
                    status.set_connected(true);
                    events.info("Connection Established", "Server is reachable");
                }
                Err(_) => {
                    tokio::time::sleep(intervals.ping_interval).await;
                    continue;
                }
            }
        }

        cycle += 1;
        let result = run_cycle(&engine, cycle % intervals.respond_every == 0).await;
        match result {
            Ok(()) => {}
            Err(ClientError::Relay(RelayError::Timeout)) => {
                status.set_connected(false);
                events.warn(
                    "Server Connection Error",
                    "Request timed out. Attempting to reconnect...",
                );
                // Probes run on ping_interval; the first one too.
                tokio::time::sleep(intervals.ping_interval).await;
                continue;
            }
            Err(e) => {
                events.error("Sync Error", e.to_string());
            }
        }

        tokio::time::sleep(intervals.fetch_interval).await;
    }
}

async fn run_cycle(engine: &SyncEngine, sweep: bool) -> Result<(), ClientError> {
    engine.fetch_and_apply().await?;
    if sweep {
        handshake::respond_to_unmatched(engine).await?;
    }
    Ok(())
}
