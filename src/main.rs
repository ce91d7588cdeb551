use anyhow::{Context, Result};
use log::info;

use pothole_reporter::{
    AppState, Config, PotholeDetector, detector::DarknetModel, server,
};

/// Pothole Reporter - road damage detection service.
///
/// Serves `POST /api/detect-bache`: the uploaded photo is stored, run through
/// the pothole model, and a report with the photo attached is e-mailed to a
/// fixed recipient. The client gets the detection result as JSON.
///
/// # Environment Variables
///
/// Required:
/// * `EMAIL_USER` - Sender mailbox, also the SMTP login
/// * `EMAIL_PASS` - SMTP password
///
/// Optional (with defaults):
/// * `EMAIL_RECIPIENT` - Report recipient (default: "appbaches@gmail.com")
/// * `SMTP_HOST` / `SMTP_PORT` - Submission server (default: "smtp.gmail.com" / 587)
/// * `UPLOAD_DIR` - Upload directory (default: "./uploads")
/// * `STATIC_DIR` - Static assets (default: "./static")
/// * `LABEL_FILE` - Path to label file (default: "./labels.txt")
/// * `MODEL_CFG` - Path to model config file (default: "./model.cfg")
/// * `WEIGHTS_FILE` - Path to weights file (default: "./model/best.weights")
/// * `MODEL_WEIGHTS_URL` - Where to download missing weights from
/// * `LOCATION` - Location stamped on reports
/// * `BIND_ADDRESS` / `PORT` - Listen address (default: "0.0.0.0" / 8000)
/// * `MAX_UPLOAD_BYTES` - Largest accepted upload (default: 10 MiB)
///
/// # Usage
///
/// ```bash
/// export EMAIL_USER="reportes@example.com"
/// export EMAIL_PASS="app-password"
/// ./pothole-reporter
/// ```
fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logger to output to stdout, using RUST_LOG env var or info level by default
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stdout)
        .filter_level(
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(log::LevelFilter::Info),
        )
        .init();

    let config = Config::load()
        .context("Failed to load configuration. EMAIL_USER and EMAIL_PASS must be set")?;

    info!("Pothole Reporter starting...");

    // Download model weights if needed
    DarknetModel::ensure_weights_downloaded(&config.weights, &config.weights_url)?;

    let detector =
        PotholeDetector::from_files(&config.model_cfg, &config.weights, &config.label_file)
            .context("Failed to load detection model")?;
    info!(
        "Pothole detector initialized with labels: {}",
        detector.labels().join(", ")
    );

    let state = AppState::from_config(&config, detector)?;

    actix_web::rt::System::new().block_on(server::run(config, state))?;
    Ok(())
}
