use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Per-phase and per-label progress
    Info,
    /// Per-batch detail
    Debug,
    /// Everything
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "fingraph")]
#[command(about = "fingraph - load banking CSV exports into a Neo4j knowledge graph")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (defaults and environment variables apply when omitted)
    #[arg(short = 'C', long, global = true, env = "FINGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, uses the config file value; RUST_LOG overrides both
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Level requested on the command line, if any.
    pub fn level_override(&self) -> Option<LevelFilter> {
        match (self.log_level, self.verbose) {
            (Some(level), _) => Some(level.into()),
            (None, true) => Some(LevelFilter::DEBUG),
            (None, false) => None,
        }
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Install constraints, then load every node label and relationship type
    Load {
        /// Load into an in-memory graph instead of Neo4j; sources and
        /// coercions are fully exercised, nothing is written
        #[arg(long)]
        dry_run: bool,

        /// Give up after this many seconds, retries included (overrides config)
        #[arg(long, value_name = "SECS")]
        deadline: Option<u64>,

        /// Compare the loaded graph with the schema afterwards
        #[arg(long)]
        verify: bool,

        /// Print the run report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Compare the stored graph with the schema
    Verify {
        /// Print the drift report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the node and relationship mappings
    Schema {
        /// Print the Cypher statements the loader runs instead
        #[arg(long)]
        cypher: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_parses_flags() {
        let cli = Cli::try_parse_from(["fingraph", "load", "--dry-run", "--deadline", "90"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Load {
                dry_run: true,
                deadline: Some(90),
                verify: false,
                json: false,
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fingraph",
            "verify",
            "-C",
            "fingraph.toml",
            "--log-level",
            "warn",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("fingraph.toml")));
        assert_eq!(cli.level_override(), Some(LevelFilter::WARN));
        assert_eq!(cli.command, Commands::Verify { json: false });
    }

    #[test]
    fn test_verbose_is_debug_unless_level_given() {
        let cli = Cli::try_parse_from(["fingraph", "-v", "schema"]).unwrap();
        assert_eq!(cli.level_override(), Some(LevelFilter::DEBUG));

        let cli = Cli::try_parse_from(["fingraph", "-v", "-l", "trace", "schema", "--cypher"]).unwrap();
        assert_eq!(cli.level_override(), Some(LevelFilter::TRACE));
        assert_eq!(cli.command, Commands::Schema { cypher: true });
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["fingraph"]).is_err());
    }
}
