use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

use proguard_remap::{Config, Event, FileProvider, JavaStacktraceProcessor};

fn cli() -> Command {
    Command::new("proguard-remap")
        .about("Deobfuscates Java stack traces in a JSON event using proguard mappings")
        .arg(
            Arg::new("event")
                .required(true)
                .value_name("EVENT")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to the JSON event, or `-` to read from stdin"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to a JSON configuration file"),
        )
        .arg(
            Arg::new("mappings")
                .short('m')
                .long("mappings")
                .value_name("DIR")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(PathBuf))
                .help("A directory containing mapping files, searched in order"),
        )
        .arg(
            Arg::new("scan")
                .long("scan")
                .action(ArgAction::SetTrue)
                .help("Index mapping directories by the UUID of their files"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Write the event to this file instead of stdout"),
        )
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(dirs) = matches.get_many::<PathBuf>("mappings") {
        config.mapping_dirs = dirs.cloned().collect();
    }
    if matches.get_flag("scan") {
        config.scan = true;
    }

    Ok(config)
}

fn read_event(path: &Path) -> Result<Event> {
    let data = if path.as_os_str() == "-" {
        let mut data = Vec::new();
        io::stdin()
            .read_to_end(&mut data)
            .context("failed to read event from stdin")?;
        data
    } else {
        fs::read(path).with_context(|| format!("failed to read event {}", path.display()))?
    };

    serde_json::from_slice(&data).context("failed to parse event")
}

fn write_event(event: &Event, output: Option<&Path>) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(event).context("failed to serialize event")?;
    json.push(b'\n');

    match output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("failed to write event to {}", path.display())),
        None => io::stdout()
            .write_all(&json)
            .context("failed to write event to stdout"),
    }
}

fn execute(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let event_path = matches
        .get_one::<PathBuf>("event")
        .context("missing event path")?;

    let mut event = read_event(event_path)?;

    let provider = FileProvider::new(config.resolver());
    let processor = JavaStacktraceProcessor::with_config(&provider, &config);
    let summary = processor.process_event(&mut event);

    for (debug_id, outcome) in &summary.outcomes {
        tracing::info!(%debug_id, ?outcome, "mapping file");
    }
    tracing::info!(
        remapped_exceptions = summary.remapped_exceptions,
        remapped_frames = summary.remapped_frames,
        class_only_frames = summary.class_only_frames,
        unmapped_frames = summary.unmapped_frames,
        remapped_values = summary.remapped_values,
        "processed event"
    );

    let output = matches.get_one::<PathBuf>("output");
    write_event(&event, output.map(PathBuf::as_path))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let matches = cli().get_matches();
    execute(&matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        cli().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let matches = cli()
            .try_get_matches_from(["proguard-remap", "-m", "a", "--mappings", "b", "--scan", "-"])
            .unwrap();
        let config = load_config(&matches).unwrap();

        assert_eq!(config.mapping_dirs, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(config.scan);
        assert_eq!(config.platform, "java");
    }
}
