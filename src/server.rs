use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use log::info;

use crate::alerts::{AlertService, SmtpMailer};
use crate::config::{Config, constants};
use crate::detector::PotholeDetector;
use crate::error::AlertError;
use crate::routes::configure_routes;
use crate::storage::ArtifactStore;

/// Everything a detection request needs, built once at startup and shared by
/// all workers.
#[derive(Clone)]
pub struct AppState {
    pub store: ArtifactStore,
    pub detector: Arc<PotholeDetector>,
    pub alerts: AlertService,
    pub location: String,
    /// Uploads larger than this are rejected with 400.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        store: ArtifactStore,
        detector: PotholeDetector,
        alerts: AlertService,
        location: String,
    ) -> Self {
        Self {
            store,
            detector: Arc::new(detector),
            alerts,
            location,
            max_upload_bytes: constants::MAX_UPLOAD_BYTES,
        }
    }

    /// Replace the default upload size limit.
    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Wire the SMTP notifier and the upload store from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP transport cannot be configured.
    pub fn from_config(config: &Config, detector: PotholeDetector) -> Result<Self, AlertError> {
        let mailer = SmtpMailer::new(
            &config.smtp_host,
            config.smtp_port,
            config.email_user.clone(),
            config.email_pass.clone(),
        )?;
        let alerts = AlertService::new(
            Arc::new(mailer),
            config.email_user.clone(),
            config.email_recipient.clone(),
        );

        Ok(Self::new(
            ArtifactStore::new(config.upload_dir.clone()),
            detector,
            alerts,
            config.location.clone(),
        )
        .with_max_upload_bytes(config.max_upload_bytes))
    }
}

/// Serve the HTTP API until the process is stopped.
pub async fn run(config: Config, state: AppState) -> std::io::Result<()> {
    let bind_address = format!("{}:{}", config.bind_address, config.port);
    let static_dir = config.static_dir.display().to_string();
    let state = web::Data::new(state);

    info!("Uploads are stored in {}", state.store.root().display());
    info!("Reports are sent to {}", state.alerts.recipient());
    info!("Uploads are limited to {} bytes", state.max_upload_bytes);
    info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allow_any_header()
                    .max_age(3600),
            )
            .app_data(state.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
