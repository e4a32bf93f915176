//! Periodic HTTP poller.
//!
//! Probes the configured URL list every interval with the configured method
//! and headers; each response becomes one event carrying the URL as the
//! endpoint, the status code, and the elapsed time. A failed request emits a
//! synthetic event with status code 0 so an outage stays visible to the
//! detectors.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use tracing::{info, warn};

use crate::config::HttpPollConfig;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::ingest::{forward, named_thread};

pub fn spawn(
    config: HttpPollConfig,
    tx: crossbeam_channel::Sender<Event>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    if config.urls.is_empty() {
        return Err(Error::Transport("http poller needs at least one url".to_string()));
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()
        .map_err(|e| Error::Transport(format!("http client: {}", e)))?;
    let method = Method::from_str(&config.method.to_uppercase()).unwrap_or(Method::GET);
    let headers = build_headers(&config);

    named_thread("strix-ingest-http", move || {
        let interval = Duration::from_secs_f64(config.interval_secs.max(0.1));
        info!(urls = config.urls.len(), interval = ?interval, "http poller started");

        let mut polls: u64 = 0;
        while running.load(Ordering::Relaxed) {
            for url in &config.urls {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                let event = poll_once(&client, method.clone(), headers.clone(), url);
                if !forward(&tx, &running, event) {
                    return;
                }
            }

            polls += 1;
            if polls % 60 == 0 {
                info!(polls, "http poller heartbeat");
            }
            std::thread::sleep(interval);
        }

        info!(polls, "http poller stopped");
    })
}

fn build_headers(config: &HttpPollConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        match (
            HeaderName::from_str(name),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "skipping invalid header"),
        }
    }
    headers
}

fn poll_once(client: &Client, method: Method, headers: HeaderMap, url: &str) -> Event {
    let started = Instant::now();
    let response = client.request(method, url).headers(headers).send();
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let status_code = match response {
        Ok(resp) => resp.status().as_u16() as i64,
        Err(e) => {
            warn!(url = %url, error = %e, "poll failed; emitting status 0");
            0
        }
    };

    Event {
        timestamp: Some(Event::now_string()),
        endpoint: Some(url.to_string()),
        status_code: Some(status_code),
        response_time: Some(elapsed_ms),
        ..Default::default()
    }
}
