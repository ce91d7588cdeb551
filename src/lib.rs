//! Pothole Reporter - road damage detection service.
//!
//! Accepts a photo upload over HTTP, runs a YOLO/Darknet model over it to find
//! potholes, and e-mails a report with the photo attached.
//!
//! # Core Components
//!
//! * [`storage`] - Persists uploads before inference
//! * [`detector`] - Model wrapper producing labelled detections
//! * [`report`] - Builds the report subject and body
//! * [`alerts`] - SMTP notifier
//! * [`routes`] - HTTP endpoints and the per-request pipeline
//! * [`server`] - Shared state and HTTP server startup
//! * [`config`] - Environment configuration and constants
//! * [`error`] - Error types
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pothole_reporter::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let detector =
//!     PotholeDetector::from_files(&config.model_cfg, &config.weights, &config.label_file)?;
//! let state = AppState::from_config(&config, detector)?;
//! actix_web::rt::System::new().block_on(server::run(config, state))?;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod config;
pub mod detector;
pub mod error;
pub mod report;
pub mod routes;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use alerts::{AlertService, MailTransport, SmtpMailer};
pub use config::Config;
pub use detector::{Detection, DetectionResult, ObjectModel, PotholeDetector, RawPrediction};
pub use error::ReporterError;
pub use report::{Report, compose};
pub use routes::{ResponsePayload, UploadedImage, handle_detection_request};
pub use server::AppState;
pub use storage::ArtifactStore;
