//! Synthetic event generator.
//!
//! Emits paced telemetry with a configurable anomaly probability. Anomalous
//! events pick one of three patterns: a latency/resource spike, a suspicious
//! across-the-board drop, or a server-error burst with extreme latency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::info;

use crate::config::MockConfig;
use crate::error::Result;
use crate::event::Event;
use crate::ingest::{forward, named_thread};

const ENDPOINTS: [&str; 7] = [
    "/api/users",
    "/api/products",
    "/api/orders",
    "/api/payments",
    "/api/auth",
    "/api/search",
    "/api/recommendations",
];

const STATUS_CODES: [i64; 5] = [200, 201, 400, 404, 500];
const STATUS_WEIGHTS: [u32; 5] = [70, 5, 10, 10, 5];

pub struct MockGenerator {
    anomaly_probability: f64,
    weighted_status: WeightedIndex<u32>,
    pub event_count: u64,
}

impl MockGenerator {
    pub fn new(anomaly_probability: f64) -> Self {
        Self {
            anomaly_probability,
            weighted_status: WeightedIndex::new(STATUS_WEIGHTS)
                .expect("static weights are valid"),
            event_count: 0,
        }
    }

    pub fn next_event(&mut self) -> Event {
        self.event_count += 1;
        let mut rng = rand::rng();
        if rng.random::<f64>() < self.anomaly_probability {
            let mut event = self.anomaly_event(&mut rng);
            event.is_anomaly = Some(true);
            event
        } else {
            let mut event = self.normal_event(&mut rng);
            event.is_anomaly = Some(false);
            event
        }
    }

    fn normal_event<R: Rng>(&self, rng: &mut R) -> Event {
        Event {
            timestamp: Some(Event::now_string()),
            endpoint: Some(ENDPOINTS.choose(rng).unwrap().to_string()),
            status_code: Some(STATUS_CODES[self.weighted_status.sample(rng)]),
            response_time: Some(rng.random_range(50.0..200.0)),
            cpu_usage: Some(rng.random_range(20.0..60.0)),
            memory_usage: Some(rng.random_range(30.0..70.0)),
            ..Default::default()
        }
    }

    fn anomaly_event<R: Rng>(&self, rng: &mut R) -> Event {
        let endpoint = Some(ENDPOINTS.choose(rng).unwrap().to_string());
        let pattern = ["spike", "drop", "error_spike"].choose(rng).copied().unwrap();

        match pattern {
            "spike" => Event {
                timestamp: Some(Event::now_string()),
                endpoint,
                status_code: Some(200),
                response_time: Some(rng.random_range(1000.0..5000.0)),
                cpu_usage: Some(rng.random_range(80.0..95.0)),
                memory_usage: Some(rng.random_range(85.0..95.0)),
                ..Default::default()
            },
            "drop" => Event {
                timestamp: Some(Event::now_string()),
                endpoint,
                status_code: Some(200),
                response_time: Some(rng.random_range(10.0..30.0)),
                cpu_usage: Some(rng.random_range(5.0..15.0)),
                memory_usage: Some(rng.random_range(10.0..20.0)),
                ..Default::default()
            },
            _ => Event {
                timestamp: Some(Event::now_string()),
                endpoint,
                status_code: Some(*[500i64, 503, 504].choose(rng).unwrap()),
                response_time: Some(rng.random_range(3000.0..10_000.0)),
                cpu_usage: Some(rng.random_range(70.0..90.0)),
                memory_usage: Some(rng.random_range(75.0..90.0)),
                ..Default::default()
            },
        }
    }
}

pub fn spawn(
    config: MockConfig,
    tx: crossbeam_channel::Sender<Event>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    named_thread("strix-ingest-mock", move || {
        let interval = Duration::from_secs_f64(1.0 / config.events_per_second.max(0.001));
        let mut generator = MockGenerator::new(config.anomaly_probability);
        let started = Instant::now();

        info!(
            eps = config.events_per_second,
            anomaly_probability = config.anomaly_probability,
            "mock stream started"
        );

        while running.load(Ordering::Relaxed) {
            if config.duration_seconds > 0
                && started.elapsed() >= Duration::from_secs(config.duration_seconds)
            {
                info!(events = generator.event_count, "mock stream duration reached");
                break;
            }

            let event = generator.next_event();
            if !forward(&tx, &running, event) {
                break;
            }
            std::thread::sleep(interval);
        }

        info!(events = generator.event_count, "mock stream stopped");
    })
}
