use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not open '{path}': {details}")]
    Io { path: String, details: String },

    #[error("could not parse '{path}': {details}")]
    Json { path: String, details: String },

    #[error("must be JSON object")]
    NotAnObject,

    #[error("{0}")]
    MissingField(String),

    #[error("{0}")]
    InvalidField(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline parameter '{0}' is not set")]
    MissingParam(String),

    #[error("Pipeline parameter '{name}' is not a {expected}")]
    ParamType { name: String, expected: &'static str },

    #[error("Invalid kernel size {size} for {filter}")]
    InvalidKernel { filter: &'static str, size: i64 },

    #[error("Radius {radius} is too large for {filter}")]
    KernelTooLarge { filter: &'static str, radius: i64 },

    #[error("OpenCV Error: {0}")]
    OpenCV(String),

    #[error("Frame Error: {0}")]
    Frame(String),
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Invalid config JSON for '{name}': {details}")]
    InvalidConfigJson { name: String, details: String },

    #[error("Camera '{0}' is not connected")]
    Disconnected(String),

    #[error("Device Error: {0}")]
    Device(String),
}

impl From<opencv::Error> for PipelineError {
    fn from(err: opencv::Error) -> Self {
        PipelineError::OpenCV(err.to_string())
    }
}

impl From<opencv::Error> for CameraError {
    fn from(err: opencv::Error) -> Self {
        CameraError::Device(err.to_string())
    }
}
