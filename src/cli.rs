use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn build_cli() -> Command {
    Command::new("frcvision")
        .version("0.1.0")
        .about("Vision co-processor: starts the configured cameras and runs the blur pipeline.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Camera/network config file (default: /boot/frc.json)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("error, warn, info, debug or trace")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("param")
                .long("param")
                .value_name("NAME=VALUE")
                .help("Override a pipeline parameter, e.g. blur0Radius=4.5")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("entry")
                .long("entry")
                .value_name("KEY=VALUE")
                .help("Seed a network table entry before switched cameras subscribe")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("no-vision")
                .long("no-vision")
                .help("Only start camera streams, do not run the pipeline")
                .action(ArgAction::SetTrue),
        )
}

/// Splits `NAME=VALUE` and reads VALUE as JSON. A VALUE that is not JSON is taken as
/// a plain string, so `--entry select=front` works without quoting.
pub fn parse_assignment<T: DeserializeOwned>(raw: &str) -> Result<(String, T)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Missing name in '{}'", raw));
    }
    let json = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
    let parsed = serde_json::from_value(json)
        .with_context(|| format!("Unsupported value for '{}': {}", name, value))?;
    Ok((name.to_string(), parsed))
}

pub fn assignments<T: DeserializeOwned>(matches: &ArgMatches, id: &str) -> Result<Vec<(String, T)>> {
    let parsed = matches
        .get_many::<String>(id)
        .into_iter()
        .flatten()
        .map(|raw| parse_assignment(raw))
        .collect::<Result<Vec<_>>>()?;
    debug!("Parsed {} --{} values", parsed.len(), id);
    Ok(parsed)
}
