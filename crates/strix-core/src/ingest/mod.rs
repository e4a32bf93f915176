//! Event ingestion.
//!
//! One producer per run, selected from configuration, feeding the pipeline
//! through a bounded channel. Every producer runs on its own named thread
//! and observes the shared running flag each loop iteration, so stop is
//! cooperative: the producer winds down after its current sleep or receive
//! timeout.

pub mod http_poll;
pub mod mock;
pub mod socket;
pub mod websocket;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError};
use tracing::info;

use crate::config::{StreamConfig, StreamMode};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::metrics;

pub struct IngestManager {
    mode: StreamMode,
    handle: Option<JoinHandle<()>>,
}

impl IngestManager {
    /// Spawn the configured producer. The producer owns its transport and
    /// stops when `running` clears or the channel disconnects.
    pub fn spawn(
        config: &StreamConfig,
        tx: Sender<Event>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let handle = match config.mode {
            StreamMode::Mock => mock::spawn(config.mock.clone(), tx, running)?,
            StreamMode::Socket => socket::spawn(config.socket.clone(), tx, running)?,
            StreamMode::Websocket => websocket::spawn(config.websocket.clone(), tx, running)?,
            StreamMode::Http => http_poll::spawn(config.http.clone(), tx, running)?,
        };

        info!(mode = ?config.mode, "ingest producer started");
        Ok(Self {
            mode: config.mode,
            handle: Some(handle),
        })
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Wait for the producer thread to wind down.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!(mode = ?self.mode, "ingest producer stopped");
    }
}

/// Push one event toward the pipeline, backing off while the channel is
/// full. Returns false when the run is over (flag cleared or consumer gone);
/// an event pending during shutdown is counted as dropped.
pub(crate) fn forward(tx: &Sender<Event>, running: &AtomicBool, event: Event) -> bool {
    metrics::INGEST_TOTAL.inc();
    let mut event = event;
    loop {
        match tx.try_send(event) {
            Ok(()) => return true,
            Err(TrySendError::Full(ev)) => {
                if !running.load(Ordering::Relaxed) {
                    metrics::DROPPED_TOTAL.inc();
                    return false;
                }
                event = ev;
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(TrySendError::Disconnected(_)) => {
                metrics::DROPPED_TOTAL.inc();
                return false;
            }
        }
    }
}

pub(crate) fn named_thread<F>(name: &str, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| Error::Transport(format!("failed to spawn {}: {}", name, e)))
}
