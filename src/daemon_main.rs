// Keeps the Windows daemon from opening a console window. Comment out to see stdout.
#![windows_subsystem = "windows"]

use std::env;

use anyhow::Result;
use clap::Parser;
use usagetally::{
    daemon::{args::DaemonArgs, start_daemon},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, DAEMON_PREFIX},
        runtime::single_thread_runtime,
    },
};

#[derive(Debug, PartialEq, Eq)]
enum Detach {
    /// The launching process, which should exit right away.
    Launcher,
    Daemon,
}

fn main() -> Result<()> {
    let command_args = env::args().collect::<Vec<_>>();
    let mut args = DaemonArgs::parse_from(&command_args);
    // Daemonizing moves the working directory to /.
    if let Some(dir) = args.dir.as_mut() {
        *dir = std::path::absolute(&*dir)?;
    }

    if !args.force && detach(&command_args)? == Detach::Launcher {
        println!("Created daemon");
        return Ok(());
    }

    run(args)
}

/// Relaunches the executable as a detached process with `--force`.
#[cfg(feature = "win")]
fn detach(command_args: &[String]) -> Result<Detach> {
    use usagetally::cli::process::spawn_detached;

    let forwarded = command_args.iter().skip(1).map(String::as_str);
    spawn_detached(&env::current_exe()?, forwarded.chain(["--force"]))?;
    Ok(Detach::Launcher)
}

/// Forks into a background process with stdio sent to /dev/null.
#[cfg(all(unix, not(feature = "win")))]
fn detach(_command_args: &[String]) -> Result<Detach> {
    use daemonize::{Daemonize, Outcome, Stdio};

    let outcome = Daemonize::new()
        .stdout(Stdio::devnull())
        .stderr(Stdio::devnull())
        .execute();
    match outcome {
        Outcome::Parent(parent) => {
            parent?;
            Ok(Detach::Launcher)
        }
        Outcome::Child(child) => {
            child?;
            Ok(Detach::Daemon)
        }
    }
}

#[cfg(not(any(unix, feature = "win")))]
fn detach(_command_args: &[String]) -> Result<Detach> {
    Ok(Detach::Daemon)
}

fn run(args: DaemonArgs) -> Result<()> {
    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(DAEMON_PREFIX, &app_dir, args.log, args.log_console)?;
    single_thread_runtime()?.block_on(start_daemon(app_dir, args.interval))
}
