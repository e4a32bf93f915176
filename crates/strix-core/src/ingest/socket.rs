//! TCP line-stream collector.
//!
//! Connects to a feeder emitting one UTF-8 JSON object per line. Reads block
//! with a timeout so the running flag is observed even on a silent peer;
//! connection loss backs off and reconnects while the run is live. Malformed
//! lines are logged and skipped.

use std::io::{BufRead, BufReader, ErrorKind};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::SocketConfig;
use crate::error::Result;
use crate::event::Event;
use crate::ingest::{forward, named_thread};
use crate::metrics;

pub fn spawn(
    config: SocketConfig,
    tx: crossbeam_channel::Sender<Event>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    named_thread("strix-ingest-socket", move || {
        let addr = format!("{}:{}", config.host, config.port);
        let backoff = Duration::from_secs(config.reconnect_interval_secs.max(1));

        while running.load(Ordering::Relaxed) {
            match connect(&addr, config.recv_timeout_secs) {
                Ok(stream) => {
                    info!(addr = %addr, "socket connected");
                    read_lines(stream, &tx, &running);
                    if running.load(Ordering::Relaxed) {
                        warn!(addr = %addr, "socket disconnected; reconnecting");
                    }
                }
                Err(e) => {
                    error!(addr = %addr, error = %e, "socket connect failed");
                }
            }

            if running.load(Ordering::Relaxed) {
                std::thread::sleep(backoff);
            }
        }

        info!(addr = %addr, "socket collector stopped");
    })
}

fn connect(addr: &str, timeout_secs: u64) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(timeout_secs.max(1))))?;
    Ok(stream)
}

/// Drain lines until the peer goes away or the run stops. Receive timeouts
/// just re-check the running flag.
fn read_lines(
    stream: TcpStream,
    tx: &crossbeam_channel::Sender<Event>,
    running: &AtomicBool,
) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while running.load(Ordering::Relaxed) {
        match reader.read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    match parse_line(trimmed) {
                        Some(event) => {
                            if !forward(tx, running, event) {
                                return;
                            }
                        }
                        None => {
                            metrics::MALFORMED_TOTAL.inc();
                            warn!(line = %trimmed, "skipping malformed line");
                        }
                    }
                }
                line.clear();
            }
            // Timeout mid-line: keep the partial buffer and retry, so the
            // running flag is observed on a silent peer.
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                error!(error = %e, "socket read failed");
                return;
            }
        }
    }
}

fn parse_line(line: &str) -> Option<Event> {
    let mut bytes = line.as_bytes().to_vec();
    simd_json::from_slice::<Event>(&mut bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn test_parse_line() {
        let event = parse_line(r#"{"endpoint": "/api/x", "status_code": 503}"#).unwrap();
        assert_eq!(event.endpoint.as_deref(), Some("/api/x"));
        assert_eq!(event.status_code, Some(503));

        assert!(parse_line("not json").is_none());
    }

    #[test]
    fn test_collects_lines_and_skips_malformed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(b"{\"status_code\": 200}\n").unwrap();
            conn.write_all(b"garbage line\n").unwrap();
            conn.write_all(b"{\"status_code\": 500}\n").unwrap();
        });

        let config = SocketConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            recv_timeout_secs: 1,
            reconnect_interval_secs: 1,
        };
        let (tx, rx) = bounded(16);
        let running = Arc::new(AtomicBool::new(true));
        let handle = spawn(config, tx, running.clone()).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.status_code, Some(200));
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(second.status_code, Some(500));

        running.store(false, Ordering::Relaxed);
        server.join().unwrap();
        handle.join().unwrap();
    }
}
