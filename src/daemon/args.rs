use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug)]
#[command(about = "Background tracker of foreground application usage")]
pub struct DaemonArgs {
    /// Run in the current process instead of detaching.
    #[arg(long)]
    pub force: bool,
    #[arg(long, help = "Application directory holding usage.db, config.json and logs")]
    pub dir: Option<PathBuf>,
    /// Seconds between foreground checks. Overrides the value from config.json.
    #[arg(long)]
    pub interval: Option<u64>,
    /// Mirrors logs to stdout. Useful together with `--force`.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
