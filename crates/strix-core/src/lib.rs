//! strix-core: Real-Time Telemetry Anomaly-Detection Pipeline
//!
//! Streaming engine that ingests HTTP-transaction and host-metric events,
//! extracts statistical features over sliding windows, and runs an ensemble
//! of detectors:
//! - Per-feature rolling z-score
//! - Multivariate isolation forest (trained online)
//! - Windowed change-point comparison (spike / drop / pattern shift)
//! - Rule+statistics comprehensive detector (HTTP errors, performance,
//!   resources, suspicious traffic)
//!
//! Detections are fused into severity-graded, deduplicated alerts held in a
//! bounded ring and served by the `strixd` daemon. All rolling state is
//! memory-bounded, owned by a single writer thread fed through a bounded
//! channel.

pub mod alert;
pub mod config;
pub mod detect;
pub mod error;
pub mod event;
pub mod features;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod stats;
pub mod window;

pub use alert::{Alert, AlertLevel, AlertManager};
pub use config::AppConfig;
pub use detect::{Detection, DetectorManager};
pub use error::Error;
pub use event::Event;
pub use features::FeatureEngineer;
pub use ingest::IngestManager;
pub use pipeline::{Pipeline, PipelineCore};
pub use preprocess::Preprocessor;
pub use window::WindowManager;
