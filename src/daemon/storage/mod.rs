//!  Storage is organized through [usage_store::SqliteUsageStore].
//!  The basic idea is:
//!   - There is a single SQLite table with one row per application per local day.
//!   - Each row keeps a duration as a value plus unit, renormalized on every write.
//!   - Writes go through one transaction each, so readers only see whole rows.

pub mod entities;
pub mod error;
pub mod ignore;
pub mod usage_store;
