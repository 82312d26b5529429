use crate::camera_config::{CameraConfig, SwitchedCameraConfig};
use crate::config_loader::VisionConfig;
use crate::core::capture_source::{CameraServer, ConnectionStrategy, StreamServer, VideoSource};
use crate::core::network_table::{
    EntryListener, EntryNotification, EntryStore, EntryValue, ListenerFlags, ListenerHandle,
};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// A started switched stream and the entry subscription driving it.
pub struct SwitchedCamera {
    pub config: SwitchedCameraConfig,
    pub server: Arc<dyn StreamServer>,
    pub listener: ListenerHandle,
}

/// Everything started from a `VisionConfig`.
///
/// `sources[i]` was started from `camera_configs[i]`; switched cameras resolve names
/// through that alignment.
pub struct CameraRegistry {
    sources: Arc<[Arc<dyn VideoSource>]>,
    camera_names: Arc<[String]>,
    switched: Vec<SwitchedCamera>,
}

impl CameraRegistry {
    /// Starts every camera, then every switched camera.
    pub fn start(
        config: &VisionConfig,
        camera_server: &dyn CameraServer,
        entries: &dyn EntryStore,
    ) -> Self {
        debug!("🛠️ Starting {} cameras...", config.camera_configs.len());
        let start_time = Instant::now();

        let mut seen_names = HashSet::new();
        for cam_config in &config.camera_configs {
            if !seen_names.insert(cam_config.name.as_str()) {
                warn!(
                    "⚠️ Duplicate camera name '{}': switching by name selects the first one",
                    cam_config.name
                );
            }
        }

        let sources: Arc<[Arc<dyn VideoSource>]> = config
            .camera_configs
            .iter()
            .map(|c| start_camera(camera_server, c))
            .collect();
        let camera_names: Arc<[String]> = config
            .camera_configs
            .iter()
            .map(|c| c.name.clone())
            .collect();

        let switched = config
            .switched_camera_configs
            .iter()
            .map(|c| {
                start_switched_camera(camera_server, entries, c, sources.clone(), camera_names.clone())
            })
            .collect::<Vec<_>>();

        info!(
            "✅ Started {} cameras and {} switched cameras in {:?}",
            sources.len(),
            switched.len(),
            start_time.elapsed()
        );
        CameraRegistry {
            sources,
            camera_names,
            switched,
        }
    }

    pub fn sources(&self) -> &[Arc<dyn VideoSource>] {
        &self.sources
    }

    pub fn switched_cameras(&self) -> &[SwitchedCamera] {
        &self.switched
    }

    pub fn source_by_name(&self, name: &str) -> Option<Arc<dyn VideoSource>> {
        self.camera_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.sources.get(i).cloned())
    }
}

/// Starts one USB camera and its stream. Settings the device rejects are logged and skipped.
pub fn start_camera(camera_server: &dyn CameraServer, config: &CameraConfig) -> Arc<dyn VideoSource> {
    info!("📷 Starting camera '{}' on {}", config.name, config.path);
    let camera = camera_server.add_usb_camera(&config.name, &config.path);
    let server = camera_server.start_automatic_capture(camera.clone());

    match serde_json::to_string(&config.config) {
        Ok(json) => {
            if let Err(e) = camera.set_config_json(&json) {
                warn!("⚠️ Camera '{}' rejected its settings: {}", config.name, e);
            }
        }
        Err(e) => warn!("⚠️ Could not serialize settings for camera '{}': {}", config.name, e),
    }
    camera.set_connection_strategy(ConnectionStrategy::KeepOpen);

    if let Some(stream_config) = &config.stream_config {
        match serde_json::to_string(stream_config) {
            Ok(json) => {
                if let Err(e) = server.set_config_json(&json) {
                    warn!("⚠️ Stream for camera '{}' rejected its settings: {}", config.name, e);
                }
            }
            Err(e) => warn!("⚠️ Could not serialize stream settings for camera '{}': {}", config.name, e),
        }
    }

    camera
}

/// Picks the position in `sources` an entry value points at.
///
/// Numbers are truncated to an index and ignored when out of range. Strings match a
/// camera name exactly, first match wins. Anything else selects nothing.
pub fn select_source(value: &EntryValue, source_count: usize, camera_names: &[String]) -> Option<usize> {
    if let Some(v) = value.as_double() {
        let i = v as i64;
        if i >= 0 && (i as u64) < source_count as u64 {
            Some(i as usize)
        } else {
            None
        }
    } else if let Some(s) = value.as_string() {
        camera_names
            .iter()
            .position(|name| name == s)
            .filter(|i| *i < source_count)
    } else {
        None
    }
}

/// Starts a switched stream and subscribes it to `config.key`.
///
/// The listener only reads the `sources` and `camera_names` snapshots.
pub fn start_switched_camera(
    camera_server: &dyn CameraServer,
    entries: &dyn EntryStore,
    config: &SwitchedCameraConfig,
    sources: Arc<[Arc<dyn VideoSource>]>,
    camera_names: Arc<[String]>,
) -> SwitchedCamera {
    info!("🔀 Starting switched camera '{}' on {}", config.name, config.key);
    let server = camera_server.add_switched_camera(&config.name);

    let target = server.clone();
    let switched_name = config.name.clone();
    let listener: EntryListener = Arc::new(move |event: &EntryNotification| {
        match select_source(&event.value, sources.len(), &camera_names) {
            Some(i) => target.set_source(sources[i].clone()),
            None => debug!(
                "Switched camera '{}': '{}' = {:?} selects no camera",
                switched_name, event.key, event.value
            ),
        }
    });

    let handle = entries.add_listener(
        &config.key,
        ListenerFlags::IMMEDIATE | ListenerFlags::NEW | ListenerFlags::UPDATE,
        listener,
    );

    SwitchedCamera {
        config: config.clone(),
        server,
        listener: handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::sim_server::SimCameraServer;
    use crate::core::network_table::LocalEntryStore;
    use serde_json::{json, Map, Value};

    fn camera_config(name: &str, path: &str, extra: Value) -> CameraConfig {
        let mut config = Map::new();
        config.insert("name".into(), json!(name));
        config.insert("path".into(), json!(path));
        if let Value::Object(extra) = extra {
            config.extend(extra);
        }
        let stream_config = config.get("stream").cloned();
        CameraConfig {
            name: name.to_string(),
            path: path.to_string(),
            config,
            stream_config,
        }
    }

    fn three_camera_config() -> VisionConfig {
        let mut config = VisionConfig::new("test.json");
        config.team = Some(118);
        config.camera_configs = vec![
            camera_config("camA", "/dev/video0", json!({})),
            camera_config("camB", "/dev/video1", json!({})),
            camera_config("camC", "/dev/video2", json!({})),
        ];
        config.switched_camera_configs = vec![SwitchedCameraConfig {
            name: "driver".to_string(),
            key: "/camera/select".to_string(),
        }];
        config
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn select_by_index_and_name() {
        let cams = names(&["camA", "camB", "camC"]);
        assert_eq!(select_source(&EntryValue::Double(1.0), 3, &cams), Some(1));
        assert_eq!(select_source(&EntryValue::Double(2.9), 3, &cams), Some(2));
        assert_eq!(select_source(&EntryValue::Double(-0.5), 3, &cams), Some(0));
        assert_eq!(select_source(&EntryValue::Double(5.0), 3, &cams), None);
        assert_eq!(select_source(&EntryValue::Double(-1.0), 3, &cams), None);
        assert_eq!(select_source(&EntryValue::Double(f64::NAN), 3, &cams), Some(0));
        assert_eq!(select_source(&EntryValue::String("camC".into()), 3, &cams), Some(2));
        assert_eq!(select_source(&EntryValue::String("camc".into()), 3, &cams), None);
        assert_eq!(select_source(&EntryValue::Boolean(true), 3, &cams), None);
    }

    #[test]
    fn duplicate_names_pick_the_first() {
        let cams = names(&["front", "front"]);
        assert_eq!(select_source(&EntryValue::String("front".into()), 2, &cams), Some(0));
    }

    #[test]
    fn start_camera_applies_settings_and_keeps_open() {
        let server = SimCameraServer::new();
        let config = camera_config(
            "front",
            "/dev/video0",
            json!({"width": 160, "height": 120, "stream": {"properties": [{"name": "compression", "value": 30}]}}),
        );
        let source = start_camera(&server, &config);
        assert_eq!(source.name(), "front");

        let cam = server.usb_camera("front").unwrap();
        assert_eq!(cam.connection_strategy(), ConnectionStrategy::KeepOpen);
        assert_eq!(cam.config(), Some(config.config.clone()));
        assert_eq!(cam.resolution(), (160, 120));

        let stream = server.stream("serve_front").unwrap();
        assert_eq!(
            stream.config().and_then(|c| c.get("properties").cloned()),
            Some(json!([{"name": "compression", "value": 30}]))
        );
        assert_eq!(stream.source_name().as_deref(), Some("front"));
    }

    #[test]
    fn start_camera_without_stream_settings_leaves_stream_default() {
        let server = SimCameraServer::new();
        start_camera(&server, &camera_config("cam0", "/dev/video0", json!({})));
        assert!(server.stream("serve_cam0").unwrap().config().is_none());
    }

    #[test]
    fn switched_camera_follows_entry() {
        let server = SimCameraServer::new();
        let entries = LocalEntryStore::new();
        let registry = CameraRegistry::start(&three_camera_config(), &server, &entries);
        assert_eq!(registry.sources().len(), 3);
        assert_eq!(registry.switched_cameras().len(), 1);

        let stream = server.stream("driver").unwrap();
        assert!(stream.source_name().is_none());

        entries.set_value("/camera/select", EntryValue::Double(1.0));
        assert_eq!(stream.source_name().as_deref(), Some("camB"));

        entries.set_value("/camera/select", EntryValue::String("camC".into()));
        assert_eq!(stream.source_name().as_deref(), Some("camC"));

        entries.set_value("/camera/select", EntryValue::Double(5.0));
        assert_eq!(stream.source_name().as_deref(), Some("camC"));

        entries.set_value("/camera/select", EntryValue::String("missing".into()));
        assert_eq!(stream.source_name().as_deref(), Some("camC"));
    }

    #[test]
    fn switched_camera_uses_value_present_at_startup() {
        let server = SimCameraServer::new();
        let entries = LocalEntryStore::new();
        entries.set_value("/camera/select", EntryValue::String("camA".into()));
        let registry = CameraRegistry::start(&three_camera_config(), &server, &entries);

        let switched = &registry.switched_cameras()[0];
        assert_eq!(switched.config.key, "/camera/select");
        let selected = switched.server.source().map(|s| s.name().to_string());
        assert_eq!(selected.as_deref(), Some("camA"));
    }

    #[test]
    fn source_lookup_by_name() {
        let server = SimCameraServer::new();
        let entries = LocalEntryStore::new();
        let registry = CameraRegistry::start(&three_camera_config(), &server, &entries);
        assert_eq!(registry.source_by_name("camB").map(|s| s.name().to_string()).as_deref(), Some("camB"));
        assert!(registry.source_by_name("camZ").is_none());
    }
}
