//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// ResourceSync sitemap toolkit CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: resync.toml when present)
    #[arg(short = 'C', long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Publish a directory of files as a sitemap
    #[command(visible_alias = "w")]
    Write {
        /// Directory to scan
        #[arg(value_hint = clap::ValueHint::DirPath)]
        dir: PathBuf,

        /// Sitemap basename to write (default: sitemap.xml)
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Base URI the directory is published under
        #[arg(short = 'u', long, value_hint = clap::ValueHint::Url)]
        base_uri: Option<String>,

        /// Compute MD5 fixity digests for the scanned files
        #[arg(short, long)]
        md5: bool,
    },

    /// Read a sitemap or sitemapindex and report what it contains
    #[command(visible_alias = "r")]
    Read {
        /// Location to read: a path or file: URI
        location: String,

        /// Accumulate into a changeset instead of an inventory
        #[arg(short, long)]
        changeset: bool,

        /// Mapping rules uri=path for resolving index parts
        #[arg(short = 'm', long = "map", value_name = "URI=PATH")]
        maps: Vec<String>,
    },

    /// Run the demonstration source simulator
    #[command(visible_alias = "s")]
    Simulate {
        /// Stop after this many events (default: run until interrupted)
        #[arg(short, long)]
        events: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_read_command() {
        let cli = Cli::parse_from([
            "resync",
            "read",
            "/var/sync/sitemap.xml",
            "--changeset",
            "--map",
            "http://example.com=/var/sync",
        ]);
        match cli.command {
            Commands::Read {
                location,
                changeset,
                maps,
            } => {
                assert_eq!(location, "/var/sync/sitemap.xml");
                assert!(changeset);
                assert_eq!(maps, ["http://example.com=/var/sync"]);
            }
            other => panic!("expected read command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_simulate_with_events() {
        let cli = Cli::parse_from(["resync", "simulate", "--events", "25"]);
        match cli.command {
            Commands::Simulate { events } => assert_eq!(events, Some(25)),
            other => panic!("expected simulate command, got {other:?}"),
        }
    }
}
