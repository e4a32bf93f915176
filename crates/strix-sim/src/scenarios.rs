//! Scenario shaping for generated traffic.
//!
//! The base generator emits healthy telemetry; a scenario overlays a fault
//! pattern during a configured window so a listening pipeline has something
//! to find: a latency spike, an error burst, or a single-IP flood.

use std::time::Instant;

use clap::ValueEnum;
use rand::distr::Distribution;
use rand_distr::LogNormal;
use serde_json::Value;
use uuid::Uuid;

use strix_core::event::Event;
use strix_core::ingest::mock::MockGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Healthy traffic only.
    Steady,
    /// Response times and resource usage blow up during the window.
    LatencySpike,
    /// Server errors with extreme latency during the window.
    ErrorBurst,
    /// One client hammers the login endpoint during the window.
    IpFlood,
}

pub struct ShapedGenerator {
    inner: MockGenerator,
    scenario: Scenario,
    inject_after_secs: u64,
    inject_duration_secs: u64,
    started: Instant,
}

impl ShapedGenerator {
    pub fn new(
        anomaly_probability: f64,
        scenario: Scenario,
        inject_after_secs: u64,
        inject_duration_secs: u64,
    ) -> Self {
        Self {
            inner: MockGenerator::new(anomaly_probability),
            scenario,
            inject_after_secs,
            inject_duration_secs,
            started: Instant::now(),
        }
    }

    pub fn event_count(&self) -> u64 {
        self.inner.event_count
    }

    fn injecting(&self) -> bool {
        if self.scenario == Scenario::Steady {
            return false;
        }
        let elapsed = self.started.elapsed().as_secs();
        elapsed >= self.inject_after_secs
            && elapsed < self.inject_after_secs + self.inject_duration_secs
    }

    pub fn next_event(&mut self) -> Event {
        let mut event = self.inner.next_event();
        event.extra.insert(
            "request_id".to_string(),
            Value::from(Uuid::new_v4().to_string()),
        );

        if !self.injecting() {
            return event;
        }

        match self.scenario {
            Scenario::Steady => {}
            Scenario::LatencySpike => {
                // Log-normal multiplier around 10x for a realistic tail.
                let multiplier = LogNormal::new(10f64.ln(), 0.3)
                    .map(|d| d.sample(&mut rand::rng()))
                    .unwrap_or(10.0);
                event.response_time = event.response_time.map(|rt| rt * multiplier);
                event.cpu_usage = Some(92.0);
                event.memory_usage = Some(90.0);
                event.is_anomaly = Some(true);
            }
            Scenario::ErrorBurst => {
                event.status_code = Some(503);
                event.response_time = event.response_time.map(|rt| rt * 20.0);
                event.is_anomaly = Some(true);
            }
            Scenario::IpFlood => {
                event.endpoint = Some("/login".to_string());
                event.ip = Some("203.0.113.7".to_string());
                event.user_agent = Some("strix-sim/flood".to_string());
                event.is_anomaly = Some(true);
            }
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_never_injects() {
        let mut g = ShapedGenerator::new(0.0, Scenario::Steady, 0, 3600);
        for _ in 0..50 {
            let ev = g.next_event();
            assert_eq!(ev.is_anomaly, Some(false));
            assert!(ev.extra.contains_key("request_id"));
        }
    }

    #[test]
    fn test_error_burst_window_is_immediate_with_zero_delay() {
        let mut g = ShapedGenerator::new(0.0, Scenario::ErrorBurst, 0, 3600);
        let ev = g.next_event();
        assert_eq!(ev.status_code, Some(503));
        assert_eq!(ev.is_anomaly, Some(true));
    }

    #[test]
    fn test_ip_flood_sets_client_fields() {
        let mut g = ShapedGenerator::new(0.0, Scenario::IpFlood, 0, 3600);
        let ev = g.next_event();
        assert_eq!(ev.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ev.endpoint.as_deref(), Some("/login"));
    }

    #[test]
    fn test_injection_waits_for_start() {
        let mut g = ShapedGenerator::new(0.0, Scenario::ErrorBurst, 3600, 60);
        let ev = g.next_event();
        // Outside the injection window the base label survives.
        assert_eq!(ev.is_anomaly, Some(false));
    }
}
