use std::{fs, path::Path, sync::Mutex};

use darknet::{Image, Network};
use image::{DynamicImage, io::Reader as ImageReader};
use log::{debug, info};

use crate::error::DetectionError;

/// Darknet non-maximum suppression parameters.
const DARKNET_HIER_THRESHOLD: f32 = 0.5;
const DARKNET_NMS_THRESHOLD: f32 = 0.45;

/// Whether a model confidence qualifies under `threshold`. Inclusive, so a
/// prediction exactly at the threshold is kept.
pub fn meets_threshold(confidence: f32, threshold: f32) -> bool {
    confidence >= threshold
}

/// A prediction as reported by the model, before label lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPrediction {
    /// Index into the model's label table.
    pub class_index: usize,

    /// Confidence score from 0.0 to 1.0.
    pub confidence: f32,
}

/// An object-detection model consumed as a black box.
///
/// Implementations must only return predictions whose confidence
/// [`meets_threshold`] for the given `confidence_threshold`.
pub trait ObjectModel: Send + Sync {
    fn predict(
        &self,
        image: DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<RawPrediction>, DetectionError>;
}

/// YOLO/Darknet backed [`ObjectModel`].
///
/// Darknet inference mutates network state, so concurrent requests are
/// serialized behind a mutex.
pub struct DarknetModel {
    network: Mutex<Network>,
}

impl DarknetModel {
    /// Load a Darknet network from its config and weights files.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or the network cannot be built.
    pub fn load(model_cfg: &Path, weights_path: &Path) -> Result<Self, DetectionError> {
        let network = Network::load(model_cfg, Some(weights_path), false).map_err(|e| {
            DetectionError::ModelLoadFailed {
                path: weights_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            network: Mutex::new(network),
        })
    }

    /// Download model weights if they don't exist locally.
    ///
    /// Blocking; call before the async runtime starts.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Download fails
    /// - Remote server returns error status
    /// - File cannot be written to disk
    pub fn ensure_weights_downloaded(
        weights_path: &Path,
        download_url: &str,
    ) -> Result<(), DetectionError> {
        if weights_path.exists() {
            info!("Model weights already present at {}", weights_path.display());
            return Ok(());
        }

        info!(
            "Model weights not found, downloading from: {}",
            download_url
        );

        let download_failed = |reason: String| DetectionError::WeightsDownloadFailed {
            url: download_url.to_string(),
            reason,
        };

        let response =
            reqwest::blocking::get(download_url).map_err(|e| download_failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_failed(format!("HTTP {}", response.status())));
        }

        let model_weights_data = response
            .bytes()
            .map_err(|e| download_failed(e.to_string()))?;

        if let Some(parent) = weights_path.parent() {
            fs::create_dir_all(parent).map_err(|e| download_failed(e.to_string()))?;
        }
        fs::write(weights_path, model_weights_data).map_err(|e| download_failed(e.to_string()))?;

        info!("Model weights downloaded successfully");
        Ok(())
    }
}

impl ObjectModel for DarknetModel {
    fn predict(
        &self,
        image: DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<RawPrediction>, DetectionError> {
        let image = Image::from(image);

        let mut network = self
            .network
            .lock()
            .map_err(|_| DetectionError::InferenceFailed {
                reason: "model lock poisoned by an earlier panic".to_string(),
            })?;

        let detections = network.predict(
            &image,
            confidence_threshold,
            DARKNET_HIER_THRESHOLD,
            DARKNET_NMS_THRESHOLD,
            true,
        );

        Ok(qualifying_predictions(
            detections.iter().filter_map(|det| det.best_class(None)),
            confidence_threshold,
        ))
    }
}

/// Keep the `(class_index, confidence)` pairs that meet `confidence_threshold`,
/// in the order given.
pub fn qualifying_predictions<I>(best_classes: I, confidence_threshold: f32) -> Vec<RawPrediction>
where
    I: IntoIterator<Item = (usize, f32)>,
{
    best_classes
        .into_iter()
        .filter(|(_, prob)| meets_threshold(*prob, confidence_threshold))
        .map(|(class_index, confidence)| RawPrediction {
            class_index,
            confidence,
        })
        .collect()
}

/// Pothole detection service.
///
/// Wraps an [`ObjectModel`] and its label table, turning raw class indices into
/// human-readable [`Detection`]s.
pub struct PotholeDetector {
    model: Box<dyn ObjectModel>,
    labels: Vec<String>,
}

impl PotholeDetector {
    /// Create a detector from a loaded model and its labels.
    pub fn new(model: Box<dyn ObjectModel>, labels: Vec<String>) -> Self {
        Self { model, labels }
    }

    /// Load the Darknet model and label table from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Model files cannot be loaded
    /// - Labels file cannot be read
    pub fn from_files(
        model_cfg: &Path,
        weights_path: &Path,
        labels_path: &Path,
    ) -> Result<Self, DetectionError> {
        let labels = load_labels(labels_path)?;
        let model = DarknetModel::load(model_cfg, weights_path)?;
        info!("Loaded detection model with {} classes", labels.len());
        Ok(Self::new(Box::new(model), labels))
    }

    /// Detect potholes in the image at `image_path`.
    ///
    /// Returns one [`Detection`] per qualifying model prediction, in the order
    /// the model reported them. An empty result means the road looked clean.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is not a decodable image or inference fails.
    pub fn detect(
        &self,
        image_path: &Path,
        confidence_threshold: f32,
    ) -> Result<DetectionResult, DetectionError> {
        let image = decode_image(image_path)?;

        let predictions = self.model.predict(image, confidence_threshold)?;
        debug!(
            "Model returned {} predictions for {}",
            predictions.len(),
            image_path.display()
        );

        let detections = predictions
            .into_iter()
            .map(|prediction| Detection {
                label: self.label_for(prediction.class_index),
                confidence: prediction.confidence,
            })
            .collect();

        Ok(DetectionResult::new(detections))
    }

    /// Get the list of class labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn label_for(&self, class_index: usize) -> String {
        self.labels
            .get(class_index)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Decode an image by sniffing its content. Uploads keep the client's file
/// name, so the extension cannot be trusted.
fn decode_image(image_path: &Path) -> Result<DynamicImage, DetectionError> {
    let invalid = |reason: String| DetectionError::InvalidImage {
        path: image_path.display().to_string(),
        reason,
    };

    ImageReader::open(image_path)
        .map_err(|e| invalid(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| invalid(e.to_string()))?
        .decode()
        .map_err(|e| invalid(e.to_string()))
}

/// Read a label table with one class name per line. Blank lines are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or contains no labels.
pub fn load_labels(labels_path: &Path) -> Result<Vec<String>, DetectionError> {
    let labels_failed = |reason: String| DetectionError::LabelsLoadFailed {
        path: labels_path.display().to_string(),
        reason,
    };

    let labels = fs::read_to_string(labels_path)
        .map_err(|e| labels_failed(e.to_string()))?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();

    if labels.is_empty() {
        return Err(labels_failed("no labels found".to_string()));
    }

    Ok(labels)
}

/// A single pothole detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// The defect class detected (e.g., "bache_profundo").
    pub label: String,

    /// Confidence score from 0.0 to 1.0.
    pub confidence: f32,
}

impl Detection {
    /// Get the confidence as a percentage.
    pub fn confidence_percent(&self) -> f32 {
        self.confidence * 100.0
    }
}

/// Every qualifying detection for one image, in model order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    /// Labels of every detection in order. Repeated classes are kept.
    pub fn labels(&self) -> Vec<&str> {
        self.detections.iter().map(|d| d.label.as_str()).collect()
    }

    /// Highest confidence in the result, if any.
    pub fn max_confidence(&self) -> Option<f32> {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }
}
