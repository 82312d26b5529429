use crate::errors::CameraError;
use crate::pipeline::Frame;
use std::sync::Arc;

// --- Seams to the camera streaming layer ---

/// What a source does when no stream is pulling frames from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStrategy {
    /// Open while a sink is enabled, release otherwise.
    AutoManage,
    /// Keep the device open even with no sinks, so a switched stream can pick it instantly.
    KeepOpen,
    /// Close the device and keep it closed.
    ForceClose,
}

/// A started capture source, e.g. a USB camera.
pub trait VideoSource: Send + Sync {
    fn name(&self) -> &str;

    /// Applies device settings given as a JSON object rendered to text.
    fn set_config_json(&self, json: &str) -> Result<(), CameraError>;

    fn set_connection_strategy(&self, strategy: ConnectionStrategy);

    /// The latest frame, or `None` while the device is not delivering.
    fn grab_frame(&self) -> Result<Option<Frame>, CameraError>;
}

/// An MJPEG stream served to the dashboard.
pub trait StreamServer: Send + Sync {
    fn name(&self) -> &str;

    fn port(&self) -> u16;

    fn set_config_json(&self, json: &str) -> Result<(), CameraError>;

    fn set_source(&self, source: Arc<dyn VideoSource>);

    fn source(&self) -> Option<Arc<dyn VideoSource>>;
}

/// Creates sources and streams. Implemented by the vendor camera server.
pub trait CameraServer {
    fn add_usb_camera(&self, name: &str, path: &str) -> Arc<dyn VideoSource>;

    /// Starts a stream that serves `source`.
    fn start_automatic_capture(&self, source: Arc<dyn VideoSource>) -> Arc<dyn StreamServer>;

    /// Starts a named stream with no source attached yet.
    fn add_switched_camera(&self, name: &str) -> Arc<dyn StreamServer>;
}
