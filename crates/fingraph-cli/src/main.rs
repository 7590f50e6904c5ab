use clap::Parser;
use fingraph_cli::{cli::Cli, commands, logging};
use fingraph_config::EtlConfig;
use std::process::ExitCode;

/// Exit status when configuration or setup is invalid.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match EtlConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Err(err) = logging::init(&config.logging, cli.level_override()) {
        eprintln!("{err:#}");
        return ExitCode::from(EXIT_CONFIG);
    }

    match commands::execute(cli.command, &config).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}
