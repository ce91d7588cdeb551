use std::sync::Arc;

use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{HttpResponse, http::StatusCode, web};
use futures::TryStreamExt;
use log::{error, info, warn};
use serde::Serialize;

use crate::config::constants;
use crate::error::{DetectionError, ReporterError, RequestError};
use crate::report::compose;
use crate::server::AppState;

const INDEX_HTML: &str = include_str!("../templates/index.html");

const GENERIC_ERROR: &str = "Error interno al procesar la imagen.";
const MISSING_FILE_ERROR: &str = "No se recibió ningún archivo de imagen.";
const MALFORMED_REQUEST_ERROR: &str = "Solicitud inválida.";
const UPLOAD_TOO_LARGE_ERROR: &str = "La imagen excede el tamaño máximo permitido.";

/// An uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// JSON body returned by `POST /api/detect-bache`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ResponsePayload {
    Detection {
        tipo: String,
        fecha_hora: String,
        ubicacion: String,
    },
    Error {
        error: String,
    },
}

impl ResponsePayload {
    fn error(message: &str) -> Self {
        ResponsePayload::Error {
            error: message.to_string(),
        }
    }
}

/// Register the index page and the detection endpoint.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/api/detect-bache").route(web::post().to(detect_bache)));
}

/// Register every route, including static assets served from `static_dir`.
pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: String) {
    configure_api(cfg);
    cfg.service(Files::new("/static", static_dir));
}

async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn detect_bache(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    let (status, body) = match read_upload(payload, state.max_upload_bytes).await {
        Ok(upload) => handle_detection_request(&state, upload).await,
        Err(e) => {
            warn!("Rejected detection request: {}", e);
            let message = match e {
                RequestError::MissingFile => MISSING_FILE_ERROR,
                RequestError::MalformedMultipart { .. } => MALFORMED_REQUEST_ERROR,
                RequestError::UploadTooLarge { .. } => UPLOAD_TOO_LARGE_ERROR,
            };
            (StatusCode::BAD_REQUEST, ResponsePayload::error(message))
        }
    };

    HttpResponse::build(status).json(body)
}

/// Run one upload through store, detect, compose and notify.
///
/// This is the recovery boundary for the request: any fault is logged with
/// full detail and answered with a generic message and a 500. A failed e-mail
/// is logged but never changes the response.
pub async fn handle_detection_request(
    state: &AppState,
    upload: UploadedImage,
) -> (StatusCode, ResponsePayload) {
    let filename = upload.filename.clone();
    match run_pipeline(state, upload).await {
        Ok(payload) => (StatusCode::OK, payload),
        Err(e) => {
            error!("Detection request for '{}' failed: {}", filename, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ResponsePayload::error(GENERIC_ERROR),
            )
        }
    }
}

async fn run_pipeline(
    state: &AppState,
    upload: UploadedImage,
) -> Result<ResponsePayload, ReporterError> {
    let image_path = state.store.store(&upload.filename, &upload.bytes).await?;

    // Inference is CPU bound; keep it off the async workers.
    let detector = Arc::clone(&state.detector);
    let inference_path = image_path.clone();
    let result = web::block(move || {
        detector.detect(&inference_path, constants::CONFIDENCE_THRESHOLD)
    })
    .await
    .map_err(|e| DetectionError::InferenceFailed {
        reason: e.to_string(),
    })??;

    let timestamp = chrono::Local::now()
        .format(constants::TIMESTAMP_FORMAT)
        .to_string();

    for detection in result.detections() {
        info!(
            "{}: Detected {} with {:.2}% confidence",
            timestamp,
            detection.label,
            detection.confidence_percent()
        );
    }

    let report = compose(&result, &timestamp, &state.location, Some(image_path));
    info!(
        "{}: {} detection(s) in '{}' ({}), best confidence {:.2}%",
        timestamp,
        result.len(),
        upload.filename,
        report.result_type(),
        result.max_confidence().unwrap_or(0.0) * 100.0
    );

    match state.alerts.notify(&report).await {
        Ok(()) => info!("Report e-mail '{}' sent", report.subject),
        Err(e) => error!("Failed to send report e-mail '{}': {}", report.subject, e),
    }

    Ok(ResponsePayload::Detection {
        tipo: report.result_type().to_string(),
        fecha_hora: timestamp,
        ubicacion: state.location.clone(),
    })
}

/// Pull the first file field out of the multipart body, refusing files over
/// `max_bytes`.
async fn read_upload(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<UploadedImage, RequestError> {
    let malformed = |e: actix_multipart::MultipartError| RequestError::MalformedMultipart {
        reason: e.to_string(),
    };

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(ToOwned::to_owned);

        let Some(filename) = filename else {
            while field.try_next().await.map_err(malformed)?.is_some() {}
            continue;
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(malformed)? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(RequestError::UploadTooLarge { limit: max_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(UploadedImage { filename, bytes });
    }

    Err(RequestError::MissingFile)
}
