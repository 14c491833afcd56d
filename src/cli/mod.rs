pub mod daemon_path;
pub mod process;
pub mod report;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use process::{restart_server, stop_servers};
use report::{print_report, ReportKind};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::start_daemon,
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Usagetally", version, long_about = None)]
#[command(about = "Tracks how long each application holds focus, per day", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default uses $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application, replacing a running one")]
    Init {},
    #[command(about = "Run a daemon directly in current console. Used for debugging")]
    Serve {
        #[arg(long, help = "Seconds between foreground checks")]
        interval: Option<u64>,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Show today's usage, longest first")]
    Today {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },
    #[command(about = "Show usage for a day")]
    Day {
        #[arg(help = "Day in YYYY-MM-DD format")]
        day: NaiveDate,
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },
    #[command(about = "Show usage summed over all days, longest first")]
    Total {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },
    #[command(about = "Show every stored per-day record")]
    Records {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = args.dir.map_or_else(create_application_default_path, Ok)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => restart_server(Some(&dir)),
        Commands::Stop {} => stop_servers(),
        Commands::Serve { interval } => start_daemon(dir, interval).await,
        Commands::Today { json } => print_report(&dir, ReportKind::Today, json),
        Commands::Day { day, json } => print_report(&dir, ReportKind::Day(day), json),
        Commands::Total { json } => print_report(&dir, ReportKind::Total, json),
        Commands::Records { json } => print_report(&dir, ReportKind::Records, json),
    }
}
