use serde::Serialize;
use serde_json::{Map, Value};

/// Named settings for one USB camera.
#[derive(Debug, Clone, Serialize)]
pub struct CameraConfig {
    pub name: String,
    pub path: String,
    /// The whole camera object from the config file, forwarded verbatim to the device.
    pub config: Map<String, Value>,
    /// The optional `stream` member, forwarded verbatim to the MJPEG server.
    pub stream_config: Option<Value>,
}

/// Named settings for a switched camera.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchedCameraConfig {
    pub name: String,
    pub key: String,
}
