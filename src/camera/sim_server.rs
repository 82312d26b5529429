//! In-process camera server.
//!
//! Stands in for the vendor streaming library when running off the robot: sources
//! remember the settings pushed into them and hand out flat gray frames of the
//! configured size, streams remember their settings and current source.

use crate::core::capture_source::{CameraServer, ConnectionStrategy, StreamServer, VideoSource};
use crate::errors::CameraError;
use crate::pipeline::Frame;
use log::{debug, info};
use opencv::core::{Mat, Scalar, CV_8UC3};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// First port handed out, matching the vendor server's default.
pub const BASE_STREAM_PORT: u16 = 1181;

const DEFAULT_WIDTH: i32 = 320;
const DEFAULT_HEIGHT: i32 = 240;
const SIM_GRAY_LEVEL: f64 = 128.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn parse_object(name: &str, json: &str) -> Result<Map<String, Value>, CameraError> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CameraError::InvalidConfigJson {
            name: name.to_string(),
            details: format!("expected an object, got {}", other),
        }),
        Err(e) => Err(CameraError::InvalidConfigJson {
            name: name.to_string(),
            details: e.to_string(),
        }),
    }
}

#[derive(Debug)]
struct UsbCameraState {
    config: Option<Map<String, Value>>,
    strategy: ConnectionStrategy,
    width: i32,
    height: i32,
}

pub struct SimUsbCamera {
    name: String,
    path: String,
    state: Mutex<UsbCameraState>,
}

impl SimUsbCamera {
    fn new(name: &str, path: &str) -> Self {
        SimUsbCamera {
            name: name.to_string(),
            path: path.to_string(),
            state: Mutex::new(UsbCameraState {
                config: None,
                strategy: ConnectionStrategy::AutoManage,
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> Option<Map<String, Value>> {
        lock(&self.state).config.clone()
    }

    pub fn connection_strategy(&self) -> ConnectionStrategy {
        lock(&self.state).strategy
    }

    pub fn resolution(&self) -> (i32, i32) {
        let state = lock(&self.state);
        (state.width, state.height)
    }
}

impl VideoSource for SimUsbCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_config_json(&self, json: &str) -> Result<(), CameraError> {
        let config = parse_object(&self.name, json)?;
        let mut state = lock(&self.state);
        let dimension = |key: &str| {
            config
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| i32::try_from(v).ok())
                .filter(|v| *v > 0)
        };
        if let Some(width) = dimension("width") {
            state.width = width;
        }
        if let Some(height) = dimension("height") {
            state.height = height;
        }
        debug!(
            "🎛️ Camera '{}' settings applied ({} keys), resolution {}x{}",
            self.name,
            config.len(),
            state.width,
            state.height
        );
        state.config = Some(config);
        Ok(())
    }

    fn set_connection_strategy(&self, strategy: ConnectionStrategy) {
        debug!("Camera '{}' connection strategy set to {:?}", self.name, strategy);
        lock(&self.state).strategy = strategy;
    }

    fn grab_frame(&self) -> Result<Option<Frame>, CameraError> {
        let state = lock(&self.state);
        if state.strategy == ConnectionStrategy::ForceClose {
            return Ok(None);
        }
        let frame: Frame = Mat::new_rows_cols_with_default(
            state.height,
            state.width,
            CV_8UC3,
            Scalar::all(SIM_GRAY_LEVEL),
        )?;
        Ok(Some(frame))
    }
}

#[derive(Default)]
struct StreamState {
    config: Option<Map<String, Value>>,
    source: Option<Arc<dyn VideoSource>>,
}

pub struct SimMjpegServer {
    name: String,
    port: u16,
    state: Mutex<StreamState>,
}

impl SimMjpegServer {
    pub fn config(&self) -> Option<Map<String, Value>> {
        lock(&self.state).config.clone()
    }

    pub fn source_name(&self) -> Option<String> {
        lock(&self.state).source.as_ref().map(|s| s.name().to_string())
    }
}

impl StreamServer for SimMjpegServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn set_config_json(&self, json: &str) -> Result<(), CameraError> {
        let config = parse_object(&self.name, json)?;
        debug!("Stream '{}' settings applied ({} keys)", self.name, config.len());
        lock(&self.state).config = Some(config);
        Ok(())
    }

    fn set_source(&self, source: Arc<dyn VideoSource>) {
        info!("🔀 Stream '{}' now serving '{}'", self.name, source.name());
        lock(&self.state).source = Some(source);
    }

    fn source(&self) -> Option<Arc<dyn VideoSource>> {
        lock(&self.state).source.clone()
    }
}

#[derive(Default)]
struct Registry {
    cameras: Vec<Arc<SimUsbCamera>>,
    streams: Vec<Arc<SimMjpegServer>>,
}

pub struct SimCameraServer {
    next_port: AtomicU16,
    registry: Mutex<Registry>,
}

impl Default for SimCameraServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimCameraServer {
    pub fn new() -> Self {
        SimCameraServer {
            next_port: AtomicU16::new(BASE_STREAM_PORT),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn usb_camera(&self, name: &str) -> Option<Arc<SimUsbCamera>> {
        lock(&self.registry)
            .cameras
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn stream(&self, name: &str) -> Option<Arc<SimMjpegServer>> {
        lock(&self.registry)
            .streams
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    fn add_stream(&self, name: String, source: Option<Arc<dyn VideoSource>>) -> Arc<SimMjpegServer> {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let stream = Arc::new(SimMjpegServer {
            name,
            port,
            state: Mutex::new(StreamState { config: None, source }),
        });
        lock(&self.registry).streams.push(stream.clone());
        stream
    }
}

impl CameraServer for SimCameraServer {
    fn add_usb_camera(&self, name: &str, path: &str) -> Arc<dyn VideoSource> {
        let camera = Arc::new(SimUsbCamera::new(name, path));
        lock(&self.registry).cameras.push(camera.clone());
        camera
    }

    fn start_automatic_capture(&self, source: Arc<dyn VideoSource>) -> Arc<dyn StreamServer> {
        let stream_name = format!("serve_{}", source.name());
        let stream = self.add_stream(stream_name, Some(source));
        info!("📡 Serving '{}' on port {}", stream.name, stream.port);
        stream
    }

    fn add_switched_camera(&self, name: &str) -> Arc<dyn StreamServer> {
        let stream = self.add_stream(name.to_string(), None);
        info!("📡 Switched stream '{}' on port {}", stream.name, stream.port);
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::prelude::*;

    #[test]
    fn ports_are_allocated_sequentially() {
        let server = SimCameraServer::new();
        let cam = server.add_usb_camera("cam0", "/dev/video0");
        let first = server.start_automatic_capture(cam);
        let second = server.add_switched_camera("switched");
        assert_eq!(first.port(), BASE_STREAM_PORT);
        assert_eq!(second.port(), BASE_STREAM_PORT + 1);
        assert_eq!(first.name(), "serve_cam0");
        assert_eq!(first.source().map(|s| s.name().to_string()), Some("cam0".to_string()));
        assert!(second.source().is_none());
    }

    #[test]
    fn device_settings_set_frame_size() {
        let server = SimCameraServer::new();
        let cam = server.add_usb_camera("cam0", "/dev/video0");
        cam.set_config_json(r#"{"name":"cam0","width":64,"height":48,"fps":30}"#)
            .unwrap();
        let frame = cam.grab_frame().unwrap().unwrap();
        assert_eq!((frame.cols(), frame.rows()), (64, 48));
        assert_eq!(frame.typ(), CV_8UC3);
        assert!(frame.data_bytes().unwrap().iter().all(|v| *v == 128));

        let sim = server.usb_camera("cam0").unwrap();
        assert_eq!(sim.path(), "/dev/video0");
        assert_eq!(sim.resolution(), (64, 48));
        assert_eq!(sim.config().unwrap().get("fps"), Some(&serde_json::json!(30)));
    }

    #[test]
    fn non_object_settings_are_rejected() {
        let server = SimCameraServer::new();
        let cam = server.add_usb_camera("cam0", "/dev/video0");
        assert!(matches!(
            cam.set_config_json("[1,2]"),
            Err(CameraError::InvalidConfigJson { .. })
        ));
        assert!(cam.set_config_json("{").is_err());
        assert!(server.usb_camera("cam0").unwrap().config().is_none());
    }

    #[test]
    fn force_closed_camera_delivers_nothing() {
        let server = SimCameraServer::new();
        let cam = server.add_usb_camera("cam0", "/dev/video0");
        cam.set_connection_strategy(ConnectionStrategy::ForceClose);
        assert!(cam.grab_frame().unwrap().is_none());
    }
}
