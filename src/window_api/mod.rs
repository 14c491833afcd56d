//! Contains logic for finding out which application currently holds focus.
//! [ForegroundResolver] is the main artifact of this module: it turns whatever the platform
//! reports into a canonical application name and never fails.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{path::Path, sync::Arc};

use anyhow::Result;
use tracing::warn;

/// Name reported whenever the foreground application can't be determined.
pub const UNKNOWN_APP: &str = "Unknown";

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager {
    /// Returns the executable of the process owning the focused window. Either a full path
    /// like /usr/lib/firefox/firefox or a bare name like chrome.exe.
    fn get_active_process(&mut self) -> Result<String>;
}

/// Serves as a cross-compatible WindowManager implementation.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager>,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowManager;
                Ok(Self {
                    inner: Box::new(WindowsWindowManager::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                anyhow::bail!("No window manager was compiled in, enable the `win` or `x11` feature")
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_process(&mut self) -> Result<String> {
        self.inner.get_active_process()
    }
}

/// Resolves the foreground application into its canonical name.
pub struct ForegroundResolver {
    manager: Box<dyn WindowManager>,
}

impl ForegroundResolver {
    pub fn new(manager: Box<dyn WindowManager>) -> Self {
        Self { manager }
    }

    /// Lookup failures (process vanished, access denied, no focused window) are absorbed
    /// and reported as [UNKNOWN_APP].
    pub fn resolve(&mut self) -> Arc<str> {
        match self.manager.get_active_process() {
            Ok(process) => canonical_app_name(&process),
            Err(e) => {
                warn!("Foreground application is unavailable {e:?}");
                UNKNOWN_APP.into()
            }
        }
    }
}

/// Strips directories and a trailing `.exe`, then title-cases the rest, so `C:\...\CHROME.EXE`
/// and `chrome` both become `Chrome`.
pub fn canonical_app_name(process: &str) -> Arc<str> {
    let file_name = Path::new(process.trim())
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| process.trim().to_string());
    // Windows paths don't split on unix hosts.
    let file_name = file_name.rsplit('\\').next().unwrap_or_default();

    let stem = match file_name.len().checked_sub(4) {
        Some(split)
            if file_name.is_char_boundary(split)
                && file_name[split..].eq_ignore_ascii_case(".exe") =>
        {
            &file_name[..split]
        }
        _ => file_name,
    };

    if stem.is_empty() {
        return UNKNOWN_APP.into();
    }
    title_case(stem).into()
}

/// Upper-cases every letter that follows a non-letter and lower-cases the rest.
fn title_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut previous_is_letter = false;
    for c in value.chars() {
        if previous_is_letter {
            result.extend(c.to_lowercase());
        } else {
            result.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }
    result
}
