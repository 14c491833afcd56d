//! Per-day accounting of how long each foreground application holds focus.
//! A small daemon polls the foreground window and accrues elapsed time into a local SQLite
//! database, while the cli reads totals for today, any single day, or all time.
//!

pub mod cli;
pub mod daemon;
pub mod utils;
pub mod window_api;
