use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrowdError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Failures raised by source adapters and frame grabbers.
///
/// Descriptors carried in these variants are always credential-masked.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Failed to open source {source_id}: {details}")]
    Open { source_id: String, details: String },

    #[error("Read failed on source {source_id}: {details}")]
    Read { source_id: String, details: String },

    #[error("Source {source_id} is not open")]
    NotOpen { source_id: String },

    #[error("Video file not found: {path}")]
    FileNotFound { path: String },

    #[error("Capture backend error: {details}")]
    Backend { details: String },
}

/// Failures from the external preprocessing hook or density estimator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Preprocessing failed: {details}")]
    Preprocess { details: String },

    #[error("Density estimator failed: {details}")]
    Estimator { details: String },

    #[error("Invalid density surface: {details}")]
    InvalidSurface { details: String },
}

impl CrowdError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrowdError>;
