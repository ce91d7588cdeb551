use std::path::PathBuf;

use crate::config::constants;
use crate::detector::DetectionResult;

pub const SUBJECT_POTHOLE: &str = "Reporte: Bache detectado";
pub const SUBJECT_CLEAN: &str = "Reporte: Sin baches detectados";

/// Notification content for one request.
///
/// Built once from a [`DetectionResult`] and handed to the notifier; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub subject: String,
    pub body: String,
    pub timestamp: String,
    pub location: String,
    pub attachment_path: Option<PathBuf>,
    result_type: String,
}

impl Report {
    /// "No detectado", or the labels of every detection joined by ", ".
    ///
    /// This is the same value the client receives as `tipo`.
    pub fn result_type(&self) -> &str {
        &self.result_type
    }
}

/// Build the report for a detection outcome.
///
/// An empty result uses the "no potholes" template, anything else the
/// "pothole detected" template listing one label per detection in model
/// order. Pure: identical inputs give identical reports.
pub fn compose(
    result: &DetectionResult,
    timestamp: &str,
    location: &str,
    attachment_path: Option<PathBuf>,
) -> Report {
    let header = format!("🕓 Fecha y hora: {}\n📍 Ubicación: {}", timestamp, location);

    let (subject, body, result_type) = if result.is_empty() {
        (
            SUBJECT_CLEAN,
            format!("{}\n✅ Resultado: No se detectaron baches.", header),
            constants::NO_DETECTION_LABEL.to_string(),
        )
    } else {
        let labels = result.labels().join(", ");
        (
            SUBJECT_POTHOLE,
            format!("{}\n🚧 Tipos detectados: {}", header, labels),
            labels,
        )
    };

    Report {
        subject: subject.to_string(),
        body,
        timestamp: timestamp.to_string(),
        location: location.to_string(),
        attachment_path,
        result_type,
    }
}
