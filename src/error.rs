use std::fmt;

/// Custom error types for the Pothole Reporter service.
///
/// Each stage of the detection pipeline has its own error enum so the request
/// handler can decide which faults reach the client (as a generic message) and
/// which are only logged.

/// Main error type for Pothole Reporter operations.
#[derive(Debug)]
pub enum ReporterError {
    /// Errors related to persisting uploaded images.
    StorageError(StorageError),

    /// Errors related to the detection model.
    DetectionError(DetectionError),

    /// Errors related to report e-mail delivery.
    AlertError(AlertError),

    /// Configuration and setup errors.
    ConfigError(ConfigError),

    /// Malformed client requests.
    RequestError(RequestError),
}

/// Errors raised while writing an upload to the artifact store.
#[derive(Debug)]
pub enum StorageError {
    /// Upload directory could not be created.
    CreateDirFailed { path: String, reason: String },

    /// Image bytes could not be written to disk.
    WriteFailed { path: String, reason: String },
}

/// Errors specific to the detection model.
#[derive(Debug)]
pub enum DetectionError {
    /// Model configuration or weights could not be loaded.
    ModelLoadFailed { path: String, reason: String },

    /// Labels file could not be read or parsed.
    LabelsLoadFailed { path: String, reason: String },

    /// Model weights download failed.
    WeightsDownloadFailed { url: String, reason: String },

    /// Image content is not a decodable picture.
    InvalidImage { path: String, reason: String },

    /// Neural network inference failed.
    InferenceFailed { reason: String },
}

/// Errors specific to sending report e-mails.
#[derive(Debug)]
pub enum AlertError {
    /// Attachment file could not be read.
    AttachmentReadFailed { path: String, reason: String },

    /// Sender or recipient address is not a valid mailbox.
    InvalidAddress { address: String, reason: String },

    /// The e-mail message could not be assembled.
    MessageBuildFailed { reason: String },

    /// SMTP submission failed.
    SendFailed { reason: String },
}

/// Errors related to configuration and application setup.
#[derive(Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    MissingEnvVar { var_name: String },

    /// Invalid configuration values provided.
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors caused by the shape of an incoming request.
#[derive(Debug)]
pub enum RequestError {
    /// Multipart body could not be read.
    MalformedMultipart { reason: String },

    /// No field in the form carried a file.
    MissingFile,

    /// File field is larger than the configured limit.
    UploadTooLarge { limit: usize },
}

impl fmt::Display for ReporterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReporterError::StorageError(e) => write!(f, "Storage error: {}", e),
            ReporterError::DetectionError(e) => write!(f, "Detection error: {}", e),
            ReporterError::AlertError(e) => write!(f, "Alert error: {}", e),
            ReporterError::ConfigError(e) => write!(f, "Configuration error: {}", e),
            ReporterError::RequestError(e) => write!(f, "Request error: {}", e),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::CreateDirFailed { path, reason } => {
                write!(f, "Failed to create upload directory '{}': {}", path, reason)
            }
            StorageError::WriteFailed { path, reason } => {
                write!(f, "Failed to save upload to '{}': {}", path, reason)
            }
        }
    }
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionError::ModelLoadFailed { path, reason } => {
                write!(f, "Failed to load model from '{}': {}", path, reason)
            }
            DetectionError::LabelsLoadFailed { path, reason } => {
                write!(f, "Failed to load labels from '{}': {}", path, reason)
            }
            DetectionError::WeightsDownloadFailed { url, reason } => {
                write!(
                    f,
                    "Failed to download model weights from '{}': {}",
                    url, reason
                )
            }
            DetectionError::InvalidImage { path, reason } => {
                write!(f, "Invalid or corrupted image '{}': {}", path, reason)
            }
            DetectionError::InferenceFailed { reason } => {
                write!(f, "Neural network inference failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertError::AttachmentReadFailed { path, reason } => {
                write!(f, "Failed to read attachment '{}': {}", path, reason)
            }
            AlertError::InvalidAddress { address, reason } => {
                write!(f, "Invalid e-mail address '{}': {}", address, reason)
            }
            AlertError::MessageBuildFailed { reason } => {
                write!(f, "Failed to build report e-mail: {}", reason)
            }
            AlertError::SendFailed { reason } => {
                write!(f, "SMTP submission failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingEnvVar { var_name } => {
                write!(f, "Required environment variable '{}' is not set", var_name)
            }
            ConfigError::InvalidValue {
                field,
                value,
                reason,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, reason
                )
            }
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::MalformedMultipart { reason } => {
                write!(f, "Malformed multipart body: {}", reason)
            }
            RequestError::MissingFile => write!(f, "Request did not contain a file field"),
            RequestError::UploadTooLarge { limit } => {
                write!(f, "Uploaded file exceeds the {} byte limit", limit)
            }
        }
    }
}

impl std::error::Error for ReporterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReporterError::StorageError(e) => Some(e),
            ReporterError::DetectionError(e) => Some(e),
            ReporterError::AlertError(e) => Some(e),
            ReporterError::ConfigError(e) => Some(e),
            ReporterError::RequestError(e) => Some(e),
        }
    }
}

impl std::error::Error for StorageError {}
impl std::error::Error for DetectionError {}
impl std::error::Error for AlertError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for RequestError {}

// Conversion traits for easy error propagation
impl From<StorageError> for ReporterError {
    fn from(err: StorageError) -> Self {
        ReporterError::StorageError(err)
    }
}

impl From<DetectionError> for ReporterError {
    fn from(err: DetectionError) -> Self {
        ReporterError::DetectionError(err)
    }
}

impl From<AlertError> for ReporterError {
    fn from(err: AlertError) -> Self {
        ReporterError::AlertError(err)
    }
}

impl From<ConfigError> for ReporterError {
    fn from(err: ConfigError) -> Self {
        ReporterError::ConfigError(err)
    }
}

impl From<RequestError> for ReporterError {
    fn from(err: RequestError) -> Self {
        ReporterError::RequestError(err)
    }
}
