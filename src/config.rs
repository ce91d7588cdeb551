use std::path::PathBuf;

use crate::error::ConfigError;

/// Configuration for the Pothole Reporter service loaded from environment variables.
///
/// All values are read once at startup and the resulting struct is treated as
/// immutable for the lifetime of the process. A `.env` file in the working
/// directory is honoured during development.
#[derive(Debug, Clone)]
pub struct Config {
    /// Mailbox used as the sender of report e-mails and as the SMTP username.
    /// Environment variable: `EMAIL_USER` (required)
    pub email_user: String,

    /// SMTP password (usually an app password) for `email_user`.
    /// Environment variable: `EMAIL_PASS` (required)
    pub email_pass: String,

    /// Single recipient of every report.
    /// Environment variable: `EMAIL_RECIPIENT`
    pub email_recipient: String,

    /// SMTP submission host. The connection is upgraded with STARTTLS.
    /// Environment variable: `SMTP_HOST`
    pub smtp_host: String,

    /// SMTP submission port.
    /// Environment variable: `SMTP_PORT`
    pub smtp_port: u16,

    /// Directory uploads are persisted to before inference.
    /// Environment variable: `UPLOAD_DIR`
    pub upload_dir: PathBuf,

    /// Directory served under `/static`.
    /// Environment variable: `STATIC_DIR`
    pub static_dir: PathBuf,

    /// The file including label names per class, one per line.
    /// Environment variable: `LABEL_FILE`
    pub label_file: PathBuf,

    /// The Darknet model config file, which usually has a .cfg extension.
    /// Environment variable: `MODEL_CFG`
    pub model_cfg: PathBuf,

    /// The model weights file. Downloaded from `weights_url` when missing.
    /// Environment variable: `WEIGHTS_FILE`
    pub weights: PathBuf,

    /// Remote location of the model weights.
    /// Environment variable: `MODEL_WEIGHTS_URL`
    pub weights_url: String,

    /// Location string stamped on every report. There is no geolocation
    /// source yet, so this is a fixed placeholder.
    /// Environment variable: `LOCATION`
    pub location: String,

    /// Address the HTTP server binds to.
    /// Environment variable: `BIND_ADDRESS`
    pub bind_address: String,

    /// Port the HTTP server listens on.
    /// Environment variable: `PORT`
    pub port: u16,

    /// Largest accepted image upload, in bytes.
    /// Environment variable: `MAX_UPLOAD_BYTES`
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `EMAIL_USER` or `EMAIL_PASS` is missing or empty, or
    /// if a numeric variable cannot be parsed:
    /// - `EMAIL_USER`: Sender mailbox (required)
    /// - `EMAIL_PASS`: Sender password (required)
    /// - `EMAIL_RECIPIENT`: Report recipient (default: "appbaches@gmail.com")
    /// - `SMTP_HOST`: SMTP host (default: "smtp.gmail.com")
    /// - `SMTP_PORT`: SMTP port (default: "587")
    /// - `UPLOAD_DIR`: Upload directory (default: "./uploads")
    /// - `STATIC_DIR`: Static asset directory (default: "./static")
    /// - `LABEL_FILE`: Path to the label file (default: "./labels.txt")
    /// - `MODEL_CFG`: Path to the model config file (default: "./model.cfg")
    /// - `WEIGHTS_FILE`: Path to the weights file (default: "./model/best.weights")
    /// - `MODEL_WEIGHTS_URL`: Weights download URL (default: [`constants::MODEL_WEIGHTS_URL`])
    /// - `LOCATION`: Report location (default: [`constants::SIMULATED_LOCATION`])
    /// - `BIND_ADDRESS`: Bind address (default: "0.0.0.0")
    /// - `PORT`: Listen port (default: "8000")
    /// - `MAX_UPLOAD_BYTES`: Upload size limit (default: [`constants::MAX_UPLOAD_BYTES`])
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// [`Config::load`] passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let email_user = required(&lookup, "EMAIL_USER")?;
        let email_pass = required(&lookup, "EMAIL_PASS")?;

        let smtp_port = parse_port("SMTP_PORT", &or_default("SMTP_PORT", "587"))?;
        let port = parse_port("PORT", &or_default("PORT", "8000"))?;
        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(value) => parse_size("MAX_UPLOAD_BYTES", &value)?,
            None => constants::MAX_UPLOAD_BYTES,
        };

        Ok(Config {
            email_user,
            email_pass,
            email_recipient: or_default("EMAIL_RECIPIENT", constants::DEFAULT_RECIPIENT),
            smtp_host: or_default("SMTP_HOST", "smtp.gmail.com"),
            smtp_port,
            upload_dir: PathBuf::from(or_default("UPLOAD_DIR", "./uploads")),
            static_dir: PathBuf::from(or_default("STATIC_DIR", "./static")),
            label_file: PathBuf::from(or_default("LABEL_FILE", "./labels.txt")),
            model_cfg: PathBuf::from(or_default("MODEL_CFG", "./model.cfg")),
            weights: PathBuf::from(or_default("WEIGHTS_FILE", "./model/best.weights")),
            weights_url: or_default("MODEL_WEIGHTS_URL", constants::MODEL_WEIGHTS_URL),
            location: or_default("LOCATION", constants::SIMULATED_LOCATION),
            bind_address: or_default("BIND_ADDRESS", "0.0.0.0"),
            port,
            max_upload_bytes,
        })
    }
}

fn required<F>(lookup: &F, var_name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar {
            var_name: var_name.to_string(),
        }),
    }
}

fn parse_port(field: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_size(field: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        Ok(size) => Ok(size),
        Err(e) => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Application constants used throughout the system.
pub mod constants {
    /// Minimum model confidence for a detection to count. Inclusive.
    pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

    /// `tipo` reported when the model finds nothing.
    pub const NO_DETECTION_LABEL: &str = "No detectado";

    /// Placeholder location until a real geolocation source exists.
    pub const SIMULATED_LOCATION: &str = "Lat: 19.4326, Lon: -99.1332";

    /// Default recipient of every report.
    pub const DEFAULT_RECIPIENT: &str = "appbaches@gmail.com";

    /// Format of the `fecha_hora` field and the report timestamp.
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    /// Default upload size limit (10 MiB).
    pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

    /// URL for downloading model weights if they don't exist locally.
    pub const MODEL_WEIGHTS_URL: &str =
        "https://drive.google.com/uc?id=1OSgQoJyItUnGlRtuW1H2na1pHZrc6qFw";
}
