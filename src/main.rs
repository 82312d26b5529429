use anyhow::{Context, Result};
use frcvision::camera::sim_server::SimCameraServer;
use frcvision::cli;
use frcvision::common::logging_setup;
use frcvision::config_loader::{VisionConfig, DEFAULT_CONFIG_PATH};
use frcvision::core::camera_manager::CameraRegistry;
use frcvision::core::network_table::{EntryStore, EntryValue, LocalEntryStore};
use frcvision::core::vision_runner::VisionRunner;
use frcvision::pipeline::{BlurPipeline, ParamValue};
use log::{debug, error, info, warn};
use opencv::prelude::*;
use std::time::{Duration, Instant};

const VISION_IDLE: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<()> {
    let main_start_time = Instant::now();
    let matches = cli::build_cli().get_matches();
    logging_setup::initialize_logging(&matches)?;

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG_PATH);

    // read configuration
    let mut vision_config = VisionConfig::new(config_path);
    vision_config
        .read_config()
        .with_context(|| format!("Failed to load configuration from '{}'", config_path))?;
    if let Ok(dump) = serde_json::to_string(&vision_config.camera_configs) {
        debug!("Camera configs: {}", dump);
    }

    // start the network table
    let entries = LocalEntryStore::new();
    for (key, value) in cli::assignments::<EntryValue>(&matches, "entry")? {
        entries.set_value(&key, value);
    }
    if vision_config.server {
        entries.start_server();
    } else if let Some(team) = vision_config.team {
        entries.start_client_team(team);
    }

    // start cameras, then switched cameras
    let camera_server = SimCameraServer::new();
    let registry = CameraRegistry::start(&vision_config, &camera_server, &entries);

    // start the vision pipeline on the first camera
    let runner = if matches.get_flag("no-vision") {
        None
    } else if let Some(source) = registry.sources().first().cloned() {
        let mut pipeline: BlurPipeline = BlurPipeline::new();
        for (name, value) in cli::assignments::<ParamValue>(&matches, "param")? {
            info!("🎚️ Pipeline parameter {} = {:?}", name, value);
            pipeline.set_param(&name, value);
        }
        Some(VisionRunner::spawn(source, pipeline, VISION_IDLE, |p| {
            if let Some(out) = p.blur1_output() {
                debug!("Pipeline output {}x{}", out.cols(), out.rows());
            }
            true
        }))
    } else {
        warn!("⚠️ No cameras configured, vision pipeline not started");
        None
    };

    info!(
        "🚀 Team {:?} co-processor up in {:?}: {} cameras, {} switched cameras. Ctrl-C to exit.",
        vision_config.team,
        main_start_time.elapsed(),
        registry.sources().len(),
        registry.switched_cameras().len()
    );
    match runner {
        Some(runner) => {
            let frames = runner
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("❌ Failed to listen for shutdown signal: {}", e);
                    }
                })
                .await
                .context("Vision pipeline failed")?;
            info!("Vision pipeline processed {} frames", frames);
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?,
    }
    info!("🏁 Shutting down after {:?}.", main_start_time.elapsed());
    Ok(())
}
