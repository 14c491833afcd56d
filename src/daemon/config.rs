use std::{io::ErrorKind, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::storage::ignore::{IgnoreSet, DEFAULT_IGNORED_APPS};

pub const CONFIG_FILE_NAME: &str = "config.json";

const MIN_POLL_INTERVAL_SECS: u64 = 1;
const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// Daemon configuration. Read from `config.json` in the application directory, every field
/// is optional there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds between foreground checks. Shorter intervals give finer totals at the cost
    /// of more writes.
    pub poll_interval_secs: u64,
    /// Canonical application names that never accrue time.
    pub ignored_apps: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            ignored_apps: DEFAULT_IGNORED_APPS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl TrackerConfig {
    /// Loads `config.json` from `app_dir`, falling back to defaults when it doesn't exist.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(CONFIG_FILE_NAME);
        let config = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<TrackerConfig>(&content)
                .with_context(|| format!("Invalid config file {path:?}"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config at {path:?}, using defaults");
                TrackerConfig::default()
            }
            Err(e) => return Err(e).with_context(|| format!("Can't read {path:?}")),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_poll_interval(self, poll_interval_secs: Option<u64>) -> Result<Self> {
        let config = Self {
            poll_interval_secs: poll_interval_secs.unwrap_or(self.poll_interval_secs),
            ..self
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&self.poll_interval_secs) {
            bail!(
                "Poll interval must be between {MIN_POLL_INTERVAL_SECS} and {MAX_POLL_INTERVAL_SECS} seconds, got {}",
                self.poll_interval_secs
            );
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn ignore_set(&self) -> IgnoreSet {
        IgnoreSet::new(self.ignored_apps.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = TrackerConfig::load(dir.path())?;
        assert_eq!(config, TrackerConfig::default());
        assert!(config.ignore_set().contains("Unknown"));
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "poll_interval_secs": 30 }"#,
        )?;
        let config = TrackerConfig::load(dir.path())?;
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.ignored_apps.len(), DEFAULT_IGNORED_APPS.len());
        Ok(())
    }

    #[test]
    fn test_custom_ignore_list() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "ignored_apps": ["Steam"] }"#,
        )?;
        let ignore = TrackerConfig::load(dir.path())?.ignore_set();
        assert!(ignore.contains("Steam"));
        assert!(!ignore.contains("Explorer"));
        Ok(())
    }

    #[test]
    fn test_invalid_interval_rejected() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "poll_interval_secs": 0 }"#,
        )?;
        assert!(TrackerConfig::load(dir.path()).is_err());
        assert!(TrackerConfig::default()
            .with_poll_interval(Some(7200))
            .is_err());
        assert_eq!(
            TrackerConfig::default()
                .with_poll_interval(Some(60))?
                .poll_interval_secs,
            60
        );
        Ok(())
    }

    #[test]
    fn test_malformed_file_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "poll every 5 seconds")?;
        assert!(TrackerConfig::load(dir.path()).is_err());
        Ok(())
    }
}
