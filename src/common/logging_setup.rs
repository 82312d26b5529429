use anyhow::{anyhow, Result};
use env_logger::Builder;
use log::LevelFilter;

/// Maps a level name to a filter; `None` for names env_logger does not know.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

pub fn initialize_logging(cli_matches: &clap::ArgMatches) -> Result<()> {
    let mut builder = Builder::new();

    // --debug wins over --log-level, which wins over the default
    let requested = if cli_matches.get_flag("debug") {
        "debug".to_string()
    } else {
        cli_matches
            .get_one::<String>("log-level")
            .cloned()
            .unwrap_or_else(|| "info".to_string())
    };

    let level = parse_level(&requested);
    builder.filter_level(level.unwrap_or(LevelFilter::Info));
    builder
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    if level.is_none() {
        log::warn!("Unrecognized log level '{}', defaulting to info.", requested);
    }
    Ok(())
}
