//! The streaming pipeline.
//!
//! `PipelineCore` owns every piece of rolling state and is the single
//! writer: window manager, preprocessor, feature engineer, the detector
//! ensemble and the alert manager. `Pipeline` wires a configured ingest
//! producer to a consumer worker thread around the shared core, with
//! cooperative start/stop and a stopped-only reset. Buffers survive
//! stop/start cycles until reset clears them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::alert::{Alert, AlertManager, AlertStats};
use crate::config::AppConfig;
use crate::detect::comprehensive::{ComprehensiveDetector, ComprehensiveStats};
use crate::detect::{Detection, DetectorManager, DetectorStats};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::features::FeatureEngineer;
use crate::ingest::IngestManager;
use crate::metrics;
use crate::preprocess::Preprocessor;
use crate::window::{WindowManager, WindowStats};

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub running: bool,
    pub events_processed: u64,
    pub anomalies_detected: u64,
    pub window: WindowStats,
    pub detectors: DetectorStats,
    pub comprehensive: ComprehensiveStats,
    pub alerts: AlertStats,
}

/// All pipeline state, processed strictly serially in arrival order.
pub struct PipelineCore {
    window: WindowManager,
    preprocessor: Preprocessor,
    features: FeatureEngineer,
    detectors: DetectorManager,
    comprehensive: ComprehensiveDetector,
    alerts: AlertManager,
    feature_window: usize,
    events_processed: u64,
    anomalies_detected: u64,
    last_detection: Option<Detection>,
}

impl PipelineCore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            window: WindowManager::new(&config.window),
            preprocessor: Preprocessor::default(),
            features: FeatureEngineer::new(config.anomaly.zscore.window_size),
            detectors: DetectorManager::new(&config.anomaly),
            comprehensive: ComprehensiveDetector::new(),
            alerts: AlertManager::new(&config.alert),
            feature_window: config.window.feature_window.max(1),
            events_processed: 0,
            anomalies_detected: 0,
            last_detection: None,
        }
    }

    /// Run one event through the full path: preprocess, window append,
    /// feature extraction, the statistical ensemble, the comprehensive
    /// detector, and alerting for both results. Returns the alerts emitted
    /// for this event.
    pub fn process_event(&mut self, event: Event) -> Vec<Alert> {
        let timer = metrics::PROCESSING_LATENCY.start_timer();

        let processed = self.preprocessor.preprocess_event(&event);
        self.window.add_event(processed);

        let recent = self.window.get_recent_events(Some(self.feature_window));
        let current = recent
            .last()
            .cloned()
            .unwrap_or_default();

        let features = self.features.extract_features(&recent, None);
        let detection = self.detectors.detect(&features);

        let comprehensive = self.comprehensive.detect(&current, &recent);
        let comprehensive_detection = Detection {
            is_anomaly: comprehensive.is_anomaly,
            anomaly_score: comprehensive.anomaly_score,
            method: "comprehensive".to_string(),
            details: json!(comprehensive),
        };

        if detection.is_anomaly || comprehensive.is_anomaly {
            metrics::ANOMALY_TOTAL.inc();
            self.anomalies_detected += 1;
        }

        let mut emitted = Vec::new();
        if let Some(alert) = self.alerts.create_alert(&detection, Some(&current)) {
            emitted.push(alert);
        }
        if let Some(alert) = self
            .alerts
            .create_alert(&comprehensive_detection, Some(&current))
        {
            emitted.push(alert);
        }
        if !emitted.is_empty() {
            metrics::ALERTS_TOTAL.inc_by(emitted.len() as f64);
        }

        self.events_processed += 1;
        self.last_detection = Some(detection);
        metrics::WINDOW_EVENTS.set(self.window.len() as f64);
        timer.observe_duration();

        emitted
    }

    /// Most recent statistical detection result (with the change-point
    /// overlay attached), for dashboards that render the latest verdict.
    pub fn last_detection(&self) -> Option<&Detection> {
        self.last_detection.as_ref()
    }

    /// Clear every buffer and all detector training state.
    pub fn reset(&mut self) {
        self.window.clear(None);
        self.detectors.reset();
        self.comprehensive.reset();
        self.alerts.clear_alerts(None);
        self.events_processed = 0;
        self.anomalies_detected = 0;
        self.last_detection = None;
        metrics::WINDOW_EVENTS.set(0.0);
        info!("pipeline state reset");
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn alerts_mut(&mut self) -> &mut AlertManager {
        &mut self.alerts
    }

    pub fn window(&self) -> &WindowManager {
        &self.window
    }

    pub fn stats(&self, running: bool) -> PipelineStats {
        PipelineStats {
            running,
            events_processed: self.events_processed,
            anomalies_detected: self.anomalies_detected,
            window: self.window.stats(),
            detectors: self.detectors.stats(),
            comprehensive: self.comprehensive.stats(),
            alerts: self.alerts.get_stats(),
        }
    }
}

/// Ingest producer + consumer worker around a shared core.
pub struct Pipeline {
    config: AppConfig,
    core: Arc<Mutex<PipelineCore>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    ingest: Option<IngestManager>,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        let core = Arc::new(Mutex::new(PipelineCore::new(&config)));
        Self {
            config,
            core,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            ingest: None,
        }
    }

    /// Shared handle for readers (the status API).
    pub fn core(&self) -> Arc<Mutex<PipelineCore>> {
        self.core.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the producer and the consumer worker. Buffers from a previous
    /// run are kept.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::PipelineState("pipeline is already running"));
        }

        let (tx, rx) = crossbeam_channel::bounded::<Event>(
            self.config.stream.channel_capacity.max(1),
        );
        self.running.store(true, Ordering::Relaxed);

        self.ingest = Some(IngestManager::spawn(
            &self.config.stream,
            tx,
            self.running.clone(),
        )?);

        let core = self.core.clone();
        let running = self.running.clone();
        let worker = std::thread::Builder::new()
            .name("strix-pipeline".to_string())
            .spawn(move || {
                info!("pipeline worker active");
                loop {
                    match rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(event) => {
                            let mut core = core.lock().unwrap_or_else(|p| p.into_inner());
                            core.process_event(event);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if !running.load(Ordering::Relaxed) {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("pipeline worker stopped");
            })
            .map_err(|e| Error::Transport(format!("failed to spawn worker: {}", e)))?;
        self.worker = Some(worker);

        info!("pipeline started");
        Ok(())
    }

    /// Cooperative stop: clear the flag, then join the producer and the
    /// worker. All buffers are preserved.
    pub fn stop(&mut self) {
        if !self.is_running() && self.worker.is_none() {
            return;
        }
        self.running.store(false, Ordering::Relaxed);

        if let Some(ingest) = self.ingest.take() {
            ingest.join();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        info!("pipeline stopped");
    }

    /// Clear all buffers and detector training state. Only valid while
    /// stopped, so the reset can never race a live producer.
    pub fn reset(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::PipelineState(
                "pipeline must be stopped before reset",
            ));
        }
        self.lock_core().reset();
        Ok(())
    }

    pub fn stats(&self) -> PipelineStats {
        let running = self.is_running();
        self.lock_core().stats(running)
    }

    fn lock_core(&self) -> MutexGuard<'_, PipelineCore> {
        self.core.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MockConfig, StreamMode};

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.stream.mode = StreamMode::Mock;
        config.stream.mock = MockConfig {
            events_per_second: 500.0,
            anomaly_probability: 0.0,
            duration_seconds: 0,
        };
        config
    }

    #[test]
    fn test_core_counts_events() {
        let mut core = PipelineCore::new(&test_config());
        for _ in 0..5 {
            core.process_event(Event::default());
        }
        let stats = core.stats(false);
        assert_eq!(stats.events_processed, 5);
        assert_eq!(stats.window.buffer_size, 5);
    }

    #[test]
    fn test_start_stop_preserves_buffers_and_reset_clears() {
        let mut pipeline = Pipeline::new(test_config());
        pipeline.start().unwrap();
        assert!(pipeline.is_running());
        // Starting twice is a state error.
        assert!(pipeline.start().is_err());
        // Reset while running is refused.
        assert!(pipeline.reset().is_err());

        // Let some events flow.
        std::thread::sleep(Duration::from_millis(300));
        pipeline.stop();
        assert!(!pipeline.is_running());

        let stats = pipeline.stats();
        assert!(stats.events_processed > 0, "no events processed");
        assert_eq!(stats.window.buffer_size as u64, stats.events_processed.min(1000));

        pipeline.reset().unwrap();
        let stats = pipeline.stats();
        assert_eq!(stats.events_processed, 0);
        assert_eq!(stats.window.buffer_size, 0);
        assert_eq!(stats.alerts.total_alerts, 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut pipeline = Pipeline::new(test_config());
        pipeline.stop();
        pipeline.start().unwrap();
        pipeline.stop();
        pipeline.stop();
    }
}
