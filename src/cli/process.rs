use std::{
    env,
    ffi::{OsStr, OsString},
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{Context, Result};
use sysinfo::{get_current_pid, Signal, System};

use super::daemon_path::to_daemon_path;

/// Terminates every process started from the `name` executable except this one and its
/// children. SIGTERM is tried first so the daemon gets to flush its current session.
pub fn kill_previous_servers(name: &Path) -> Result<()> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(anyhow::Error::msg)?;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
        }
    }
    Ok(())
}

/// Stops daemons started either directly or through `serve`.
pub fn stop_servers() -> Result<()> {
    let cli = env::current_exe().context("Can't operate without an executable")?;
    kill_previous_servers(&to_daemon_path(cli.clone()))?;
    kill_previous_servers(&cli)
}

/// Starts `program` without a console and with null stdio, and doesn't wait for it.
pub fn spawn_detached<I, A>(program: &Path, args: I) -> Result<()>
where
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    #[allow(clippy::zombie_processes)]
    let _ = command
        .spawn()
        .with_context(|| format!("Failed to spawn {program:?}"))?;
    Ok(())
}

/// Arguments for a daemon that must not detach again.
fn forced_daemon_args(dir: Option<&Path>) -> Vec<OsString> {
    let mut args = vec![OsString::from("--force")];
    if let Some(dir) = dir {
        args.push("--dir".into());
        args.push(dir.into());
    }
    args
}

/// Intended for shutting down previous daemon and starting a new one.
pub fn restart_server(dir: Option<&Path>) -> Result<()> {
    stop_servers()?;

    let cli = env::current_exe().context("Can't operate without an executable")?;
    spawn_detached(&to_daemon_path(cli), forced_daemon_args(dir))?;
    println!("Started daemon");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{ffi::OsString, path::Path};

    use super::{forced_daemon_args, spawn_detached};

    #[test]
    fn test_forced_daemon_args() {
        assert_eq!(forced_daemon_args(None), vec![OsString::from("--force")]);
        assert_eq!(
            forced_daemon_args(Some(Path::new("/tmp/usage"))),
            ["--force", "--dir", "/tmp/usage"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let result = spawn_detached(Path::new("/nonexistent/usagetally-daemon"), ["--force"]);
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_detached_starts_program() {
        assert!(spawn_detached(Path::new("true"), std::iter::empty::<&str>()).is_ok());
    }
}
