//! Turns foreground observations into accrued time.

pub mod collector;
pub mod tracker;
