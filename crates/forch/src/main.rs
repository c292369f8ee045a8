mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, LogFormat};
use crate::config::Session;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.log_format);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let session = Session::load(&cli.global)?;
    tracing::debug!(command = ?cli.command, "dispatching command");

    match &cli.command {
        Command::Run => commands::run::handle(&session).await,
        Command::Restore => commands::query::restore(&session, &cli.global).await,
        Command::Status => commands::query::status(&session, &cli.global).await,
        Command::Switches { name } => {
            commands::query::switches(&session, &cli.global, name.as_deref()).await
        }
        Command::Dataplane => commands::query::dataplane(&session, &cli.global).await,
        Command::Hosts => commands::query::hosts(&session, &cli.global).await,
        Command::Path(command) => commands::query::path(&session, &cli.global, command).await,
        Command::Config(command) => commands::config_cmd::handle(&session, command, &cli.global),
    }
}
