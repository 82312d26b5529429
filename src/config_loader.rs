use crate::camera_config::{CameraConfig, SwitchedCameraConfig};
use crate::errors::ConfigError;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::fs;
use std::time::Instant;

/// Where the co-processor image writes the camera/network setup.
pub const DEFAULT_CONFIG_PATH: &str = "/boot/frc.json";

/// Team number, network role and camera setup read from the config file.
///
/// `read_config` appends into the lists, so a load that fails part way through the
/// `cameras` array keeps whatever was parsed before the bad entry.
#[derive(Debug, Clone, Default)]
pub struct VisionConfig {
    pub config_file: String,
    pub team: Option<i32>,
    /// Run the network table server instead of connecting to the robot.
    pub server: bool,
    pub camera_configs: Vec<CameraConfig>,
    pub switched_camera_configs: Vec<SwitchedCameraConfig>,
}

impl VisionConfig {
    pub fn new(config_file: impl Into<String>) -> Self {
        VisionConfig {
            config_file: config_file.into(),
            ..Default::default()
        }
    }

    pub fn read_config(&mut self) -> Result<(), ConfigError> {
        debug!("📄 Attempting to load config from: {}", self.config_file);
        let start_time = Instant::now();
        match self.parse_file() {
            Ok(()) => {
                info!(
                    "✅ Loaded config from '{}' in {:?}: team {:?}, {} cameras, {} switched cameras",
                    self.config_file,
                    start_time.elapsed(),
                    self.team,
                    self.camera_configs.len(),
                    self.switched_camera_configs.len()
                );
                Ok(())
            }
            Err(e) => {
                match &e {
                    ConfigError::Io { .. } | ConfigError::Json { .. } => error!("❌ {}", e),
                    _ => error!("❌ config error in '{}': {}", self.config_file, e),
                }
                Err(e)
            }
        }
    }

    fn parse_file(&mut self) -> Result<(), ConfigError> {
        let text = fs::read_to_string(&self.config_file).map_err(|e| ConfigError::Io {
            path: self.config_file.clone(),
            details: e.to_string(),
        })?;
        let top: Value = serde_json::from_str(&text).map_err(|e| ConfigError::Json {
            path: self.config_file.clone(),
            details: e.to_string(),
        })?;

        let obj = top.as_object().ok_or(ConfigError::NotAnObject)?;

        // team number
        let team_element = obj
            .get("team")
            .ok_or_else(|| ConfigError::MissingField("could not read team number".to_string()))?;
        let team = element_as_int(team_element)
            .ok_or_else(|| ConfigError::InvalidField("could not read team number".to_string()))?;
        self.team = Some(team);

        // ntmode (optional)
        if let Some(mode_element) = obj.get("ntmode") {
            let mode = element_as_string(mode_element)
                .ok_or_else(|| ConfigError::InvalidField("could not read ntmode".to_string()))?;
            if mode.eq_ignore_ascii_case("client") {
                self.server = false;
            } else if mode.eq_ignore_ascii_case("server") {
                self.server = true;
            } else {
                warn!(
                    "⚠️ config error in '{}': could not understand ntmode value '{}'",
                    self.config_file, mode
                );
            }
        }

        // cameras
        let cameras = obj
            .get("cameras")
            .ok_or_else(|| ConfigError::MissingField("could not read cameras".to_string()))?
            .as_array()
            .ok_or_else(|| ConfigError::InvalidField("cameras must be an array".to_string()))?;
        for camera in cameras {
            self.read_camera_config(camera)?;
        }

        if let Some(switched_element) = obj.get("switched cameras") {
            let switched_cameras = switched_element.as_array().ok_or_else(|| {
                ConfigError::InvalidField("switched cameras must be an array".to_string())
            })?;
            for camera in switched_cameras {
                self.read_switched_camera_config(camera)?;
            }
        }

        Ok(())
    }

    fn read_camera_config(&mut self, element: &Value) -> Result<(), ConfigError> {
        let config = element
            .as_object()
            .ok_or_else(|| ConfigError::InvalidField("camera must be a JSON object".to_string()))?;

        let name = config
            .get("name")
            .and_then(element_as_string)
            .ok_or_else(|| ConfigError::MissingField("could not read camera name".to_string()))?;

        let path = config.get("path").and_then(element_as_string).ok_or_else(|| {
            ConfigError::MissingField(format!("camera '{}': could not read path", name))
        })?;

        let stream_config = config.get("stream").filter(|v| !v.is_null()).cloned();

        debug!("  Read camera '{}' on {} (stream settings: {})", name, path, stream_config.is_some());
        self.camera_configs.push(CameraConfig {
            name,
            path,
            config: config.clone(),
            stream_config,
        });
        Ok(())
    }

    fn read_switched_camera_config(&mut self, element: &Value) -> Result<(), ConfigError> {
        let config = element.as_object().ok_or_else(|| {
            ConfigError::InvalidField("switched camera must be a JSON object".to_string())
        })?;

        let name = config.get("name").and_then(element_as_string).ok_or_else(|| {
            ConfigError::MissingField("could not read switched camera name".to_string())
        })?;

        let key = config.get("key").and_then(element_as_string).ok_or_else(|| {
            ConfigError::MissingField(format!("switched camera '{}': could not read key", name))
        })?;

        debug!("  Read switched camera '{}' on key '{}'", name, key);
        self.switched_camera_configs.push(SwitchedCameraConfig { name, key });
        Ok(())
    }
}

/// Scalars read as text the way a lenient JSON reader would: numbers and bools are
/// accepted and rendered, containers and null are not.
fn element_as_string(element: &Value) -> Option<String> {
    match element {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn element_as_int(element: &Value) -> Option<i32> {
    match element {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i32::try_from(i).ok(),
            None => n.as_f64().map(|f| f as i32),
        },
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
