//! Vision co-processor: JSON-configured camera bootstrap and the generated blur pipeline.

pub mod camera;
pub mod camera_config;
pub mod cli;
pub mod common;
pub mod config_loader;
pub mod core;
pub mod errors;
pub mod pipeline;
