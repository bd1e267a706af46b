//! resync - ResourceSync inventories and changesets as sitemaps.

use anyhow::Result;
use clap::{ColorChoice, Parser};
use resync::cli::{Cli, Commands, read, write};
use resync::config::Config;
use resync::{logger, source};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Write {
            dir,
            output,
            base_uri,
            md5,
        } => write::run(dir, output.as_deref(), base_uri.as_deref(), *md5, &config),
        Commands::Read {
            location,
            changeset,
            maps,
        } => read::run(location, *changeset, maps, &config),
        Commands::Simulate { events } => {
            if events.is_some() {
                config.simulate.max_events = *events;
            }
            source::publish::run(&config)
        }
    }
}
