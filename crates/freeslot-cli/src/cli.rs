//! Command-line interface definition.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate};
use clap::{Parser, Subcommand};

use freeslot_core::TracingOutputFormat;

/// freeslot - Free time in your Google Calendar
#[derive(Debug, Parser)]
#[command(name = "freeslot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FREESLOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long, env = "FREESLOT_LOG_FORMAT", default_value = "compact")]
    pub log_format: TracingOutputFormat,

    /// IANA timezone days are computed in (e.g. Europe/Paris)
    #[arg(long, env = "FREESLOT_TIMEZONE")]
    pub timezone: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authorize access to Google Calendar in the browser
    Auth {
        /// Re-authorize even if a usable credential is stored
        #[arg(long, short)]
        force: bool,

        #[command(subcommand)]
        action: Option<AuthAction>,
    },

    /// Print a valid access token, refreshing it if needed
    Token,

    /// Show free slots inside the working window
    Availability {
        /// Single day to report (defaults to today)
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<NaiveDate>,

        /// First day of a range
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        /// Last day of a range (inclusive)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Only show slots at least this many minutes long
        #[arg(long)]
        min_minutes: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a calendar event
    Event {
        /// Event title
        #[arg(long)]
        summary: String,

        /// Start time (RFC 3339, e.g. 2025-04-28T12:00:00-07:00)
        #[arg(long)]
        start: DateTime<FixedOffset>,

        /// End time (RFC 3339)
        #[arg(long)]
        end: DateTime<FixedOffset>,

        /// Event description
        #[arg(long)]
        description: Option<String>,

        /// Event location
        #[arg(long)]
        location: Option<String>,

        /// Attendee email (can be repeated)
        #[arg(long, action = clap::ArgAction::Append)]
        attendee: Vec<String>,

        /// Recurrence rule such as RRULE:FREQ=WEEKLY;COUNT=4 (can be repeated)
        #[arg(long, action = clap::ArgAction::Append)]
        recurrence: Vec<String>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Authorization actions.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Show whether a usable credential is stored
    Status,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
