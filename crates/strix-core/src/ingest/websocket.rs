//! WebSocket frame collector.
//!
//! Runs the network loop on a dedicated worker thread with its own
//! current-thread runtime; each text frame is one JSON event. The hand-off
//! to the pipeline is the shared bounded channel, and a dropped connection
//! reconnects after the configured interval while the run is live.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::config::WebsocketConfig;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::ingest::{forward, named_thread};
use crate::metrics;

pub fn spawn(
    config: WebsocketConfig,
    tx: crossbeam_channel::Sender<Event>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Transport(format!("websocket runtime: {}", e)))?;

    named_thread("strix-ingest-ws", move || {
        runtime.block_on(run(config, tx, running));
    })
}

async fn run(
    config: WebsocketConfig,
    tx: crossbeam_channel::Sender<Event>,
    running: Arc<AtomicBool>,
) {
    let backoff = Duration::from_secs(config.reconnect_interval_secs.max(1));

    while running.load(Ordering::Relaxed) {
        match connect_async(config.url.as_str()).await {
            Ok((mut stream, _)) => {
                info!(url = %config.url, "websocket connected");

                while running.load(Ordering::Relaxed) {
                    let frame = tokio::select! {
                        frame = stream.next() => frame,
                        _ = tokio::time::sleep(Duration::from_millis(500)) => continue,
                    };

                    match frame {
                        Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                            Some(event) => {
                                if !forward(&tx, &running, event) {
                                    return;
                                }
                            }
                            None => {
                                metrics::MALFORMED_TOTAL.inc();
                                warn!(frame = %text, "skipping malformed frame");
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            warn!(url = %config.url, "websocket closed by peer");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(url = %config.url, error = %e, "websocket receive failed");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!(url = %config.url, error = %e, "websocket connect failed");
            }
        }

        if running.load(Ordering::Relaxed) {
            info!(seconds = backoff.as_secs(), "websocket reconnecting after backoff");
            tokio::time::sleep(backoff).await;
        }
    }

    info!(url = %config.url, "websocket collector stopped");
}

fn parse_frame(text: &str) -> Option<Event> {
    serde_json::from_str::<Event>(text).ok()
}
