pub mod camera_manager;
pub mod capture_source;
pub mod network_table;
pub mod vision_runner;
