use std::path::PathBuf;

/// Daemon binary is expected to live next to the cli binary.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("usagetally-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
