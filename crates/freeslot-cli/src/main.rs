//! freeslot CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use freeslot_cli::cli::{AuthAction, Cli, Command, ConfigAction};
use freeslot_cli::commands;
use freeslot_cli::commands::availability::DaySelection;
use freeslot_cli::commands::event::EventArgs;
use freeslot_cli::config::ClientConfig;
use freeslot_cli::error::ClientResult;
use freeslot_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    // Existing variables win over .env entries
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug().with_format(cli.log_format)
    } else {
        TracingConfig::default().with_format(cli.log_format)
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = ClientConfig::load(cli.config.as_deref())?;
    let timezone = cli.timezone.as_deref();

    match cli.command {
        Command::Auth { force, action } => match action {
            Some(AuthAction::Status) => commands::auth::status(&config),
            None => commands::auth::authorize(&config, force).await,
        },
        Command::Token => commands::token::run(&config).await,
        Command::Availability {
            date,
            from,
            to,
            min_minutes,
            json,
        } => {
            let zone = config.zone(timezone)?;
            let selection = DaySelection { date, from, to };
            commands::availability::run(&config, zone, selection, min_minutes, json).await
        }
        Command::Event {
            summary,
            start,
            end,
            description,
            location,
            attendee,
            recurrence,
        } => {
            let zone = config.zone(timezone)?;
            let args = EventArgs {
                summary,
                start,
                end,
                description,
                location,
                attendees: attendee,
                recurrence,
            };
            commands::event::run(&config, zone, args).await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, cli.config.as_deref()),
            ConfigAction::Validate => commands::config::validate(&config, timezone),
            ConfigAction::Path => commands::config::path(cli.config.as_deref()),
        },
    }
}
