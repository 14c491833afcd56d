use std::{
    collections::HashMap,
    ops::Deref,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::NaiveDate;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, trace};

use crate::utils::{
    clock::Clock,
    normalize::{normalize, normalize_with, tagged_to_seconds, Precision},
};

use super::{
    entities::{DailyUsage, TotalUsage, UsageRecordEntity},
    error::StoreError,
    ignore::IgnoreSet,
};

/// Layout other tools may read directly. `(name_process, date)` identifies a record and
/// `time` is always expressed in `time_type`.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS usage (
    name_process TEXT NOT NULL,
    date TEXT NOT NULL,
    time REAL NOT NULL,
    time_type TEXT NOT NULL CHECK (time_type IN ('seconds', 'minutes', 'hours')),
    PRIMARY KEY (name_process, date)
);

CREATE INDEX IF NOT EXISTS idx_usage_date ON usage(date);
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable per-app-per-day aggregator.
#[cfg_attr(test, mockall::automock)]
pub trait UsageStore {
    /// Adds `elapsed_seconds` to the record of `app_name` on `day`, creating it when
    /// needed. Names in the ignore set are silently skipped, as are windows that are
    /// empty, negative or not finite.
    fn accrue(
        &self,
        app_name: &str,
        day: NaiveDate,
        elapsed_seconds: f64,
    ) -> Result<(), StoreError>;

    /// Usage for the host's current local day, longest first.
    fn fetch_today(&self) -> Result<Vec<DailyUsage>, StoreError>;

    fn fetch_day(&self, day: NaiveDate) -> Result<Vec<DailyUsage>, StoreError>;

    /// Usage summed over all days per application, longest first.
    fn fetch_all_time(&self) -> Result<Vec<TotalUsage>, StoreError>;

    /// Every stored record ordered by day and then by name.
    fn fetch_records(&self) -> Result<Vec<UsageRecordEntity>, StoreError>;

    /// Releases the storage handle. Any later call fails with [StoreError::StoreClosed].
    fn close(&self) -> Result<(), StoreError>;
}

impl<T: Deref> UsageStore for T
where
    T::Target: UsageStore,
{
    fn accrue(
        &self,
        app_name: &str,
        day: NaiveDate,
        elapsed_seconds: f64,
    ) -> Result<(), StoreError> {
        self.deref().accrue(app_name, day, elapsed_seconds)
    }

    fn fetch_today(&self) -> Result<Vec<DailyUsage>, StoreError> {
        self.deref().fetch_today()
    }

    fn fetch_day(&self, day: NaiveDate) -> Result<Vec<DailyUsage>, StoreError> {
        self.deref().fetch_day(day)
    }

    fn fetch_all_time(&self) -> Result<Vec<TotalUsage>, StoreError> {
        self.deref().fetch_all_time()
    }

    fn fetch_records(&self) -> Result<Vec<UsageRecordEntity>, StoreError> {
        self.deref().fetch_records()
    }

    fn close(&self) -> Result<(), StoreError> {
        self.deref().close()
    }
}

/// The main realization of [UsageStore], backed by a SQLite database.
pub struct SqliteUsageStore {
    connection: Mutex<Option<Connection>>,
    ignored: IgnoreSet,
    date_provider: Box<dyn Clock>,
    read_only: bool,
}

impl SqliteUsageStore {
    /// Opens or creates the database at `path` and makes sure the schema exists.
    pub fn open(
        path: &Path,
        ignored: IgnoreSet,
        date_provider: Box<dyn Clock>,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(path)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets presentation readers see committed snapshots while the tracker writes.
        let journal_mode: String =
            connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        connection.execute_batch(SCHEMA)?;
        info!("Opened usage store {path:?} in {journal_mode} mode");

        Ok(Self {
            connection: Mutex::new(Some(connection)),
            ignored,
            date_provider,
            read_only: false,
        })
    }

    /// Opens an existing database for presentation consumers. Accrual through such a
    /// store fails with a storage error.
    pub fn open_read_only(path: &Path, date_provider: Box<dyn Clock>) -> Result<Self, StoreError> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        connection.busy_timeout(BUSY_TIMEOUT)?;

        Ok(Self {
            connection: Mutex::new(Some(connection)),
            ignored: IgnoreSet::empty(),
            date_provider,
            read_only: true,
        })
    }

    fn with_connection<T>(
        &self,
        action: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        let connection = guard.as_mut().ok_or(StoreError::StoreClosed)?;
        action(connection)
    }

    /// Reads `(name, value, unit tag)` triples and converts each into seconds.
    fn select_seconds(
        connection: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<(Arc<str>, f64)>, StoreError> {
        let mut statement = connection.prepare(sql)?;
        let rows = statement
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(name, value, tag)| -> Result<_, StoreError> {
                Ok((Arc::from(name), tagged_to_seconds(value, &tag)?))
            })
            .collect()
    }
}

impl UsageStore for SqliteUsageStore {
    fn accrue(
        &self,
        app_name: &str,
        day: NaiveDate,
        elapsed_seconds: f64,
    ) -> Result<(), StoreError> {
        if self.ignored.contains(app_name) {
            trace!("Skipping ignored application {app_name}");
            return Ok(());
        }
        if !elapsed_seconds.is_finite() || elapsed_seconds <= 0. {
            trace!("Skipping empty window of {elapsed_seconds}s for {app_name}");
            return Ok(());
        }

        self.with_connection(|connection| {
            // Immediate transactions take the write lock before reading, so concurrent
            // writers can't interleave their read-modify-write cycles.
            let transaction =
                connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing = transaction
                .query_row(
                    "SELECT time, time_type FROM usage WHERE name_process = ?1 AND date = ?2",
                    params![app_name, day],
                    |row| Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            let total_seconds = match existing {
                Some((value, tag)) => tagged_to_seconds(value, &tag)? + elapsed_seconds,
                None => elapsed_seconds,
            };
            let normalized = normalize_with(total_seconds, Precision::Storage);

            transaction.execute(
                "INSERT INTO usage (name_process, date, time, time_type)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name_process, date) DO UPDATE SET
                    time = excluded.time,
                    time_type = excluded.time_type",
                params![app_name, day, normalized.value, normalized.unit.as_str()],
            )?;
            transaction.commit()?;

            debug!("Accrued {elapsed_seconds:.3}s to {app_name} on {day}, now {normalized}");
            Ok(())
        })
    }

    fn fetch_today(&self) -> Result<Vec<DailyUsage>, StoreError> {
        self.fetch_day(self.date_provider.local_date())
    }

    fn fetch_day(&self, day: NaiveDate) -> Result<Vec<DailyUsage>, StoreError> {
        let rows = self.with_connection(|connection| {
            Self::select_seconds(
                connection,
                "SELECT name_process, time, time_type FROM usage WHERE date = ?1",
                params![day],
            )
        })?;

        let mut usages = rows
            .into_iter()
            .map(|(app_name, duration_seconds)| {
                let display = normalize(duration_seconds);
                DailyUsage {
                    app_name,
                    duration_seconds,
                    value: display.value,
                    unit: display.unit,
                }
            })
            .collect::<Vec<_>>();
        usages.sort_by(|a, b| {
            b.duration_seconds
                .total_cmp(&a.duration_seconds)
                .then_with(|| a.app_name.cmp(&b.app_name))
        });
        Ok(usages)
    }

    fn fetch_all_time(&self) -> Result<Vec<TotalUsage>, StoreError> {
        let rows = self.with_connection(|connection| {
            Self::select_seconds(
                connection,
                "SELECT name_process, time, time_type FROM usage",
                [],
            )
        })?;

        let mut totals = HashMap::<Arc<str>, f64>::new();
        for (app_name, seconds) in rows {
            *totals.entry(app_name).or_default() += seconds;
        }

        let mut totals = totals.into_iter().collect::<Vec<_>>();
        totals.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(totals
            .into_iter()
            .map(|(app_name, seconds)| {
                let display = normalize(seconds);
                TotalUsage {
                    app_name,
                    value: display.value,
                    unit: display.unit,
                }
            })
            .collect())
    }

    fn fetch_records(&self) -> Result<Vec<UsageRecordEntity>, StoreError> {
        self.with_connection(|connection| {
            let mut statement = connection.prepare(
                "SELECT name_process, date, time, time_type FROM usage
                 ORDER BY date, name_process",
            )?;
            let rows = statement
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, NaiveDate>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(app_name, day, duration_value, tag)| -> Result<_, StoreError> {
                    Ok(UsageRecordEntity {
                        app_name: app_name.into(),
                        day,
                        duration_value,
                        duration_unit: tag.parse()?,
                    })
                })
                .collect()
        })
    }

    fn close(&self) -> Result<(), StoreError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .take()
            .ok_or(StoreError::StoreClosed)?;

        if !self.read_only {
            // Folds the write-ahead log back into the main database file.
            connection.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        }
        connection.close().map_err(|(_, e)| e)?;
        info!("Closed usage store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;
    use rusqlite::{params, Connection};
    use tempfile::tempdir;

    use crate::{
        daemon::storage::{
            error::StoreError,
            ignore::IgnoreSet,
            usage_store::{SqliteUsageStore, UsageStore},
        },
        utils::{
            clock::test_clock::ManualClock,
            normalize::{DurationUnit, NormalizedDuration},
        },
    };

    const DAY: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
    const NEXT_DAY: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 5).unwrap();

    fn raw_row(connection: &Connection, name: &str, day: NaiveDate) -> Option<(f64, String)> {
        connection
            .query_row(
                "SELECT time, time_type FROM usage WHERE name_process = ?1 AND date = ?2",
                params![name, day.format("%Y-%m-%d").to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok()
    }

    fn open_store(path: &std::path::Path, clock: &ManualClock) -> Result<SqliteUsageStore> {
        Ok(SqliteUsageStore::open(
            path,
            IgnoreSet::default(),
            Box::new(clock.clone()),
        )?)
    }

    #[test]
    fn test_accrue_creates_then_updates_across_units() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("usage.db");
        let clock = ManualClock::new(DAY);
        let store = open_store(&path, &clock)?;

        store.accrue("Chrome", DAY, 65.)?;
        let today = store.fetch_today()?;
        assert_eq!(today.len(), 1);
        assert_eq!(&*today[0].app_name, "Chrome");
        assert_eq!((today[0].value, today[0].unit), (1.08, DurationUnit::Minutes));
        assert!((today[0].duration_seconds - 65.).abs() < 1e-6);

        store.accrue("Chrome", DAY, 4000.)?;
        let today = store.fetch_today()?;
        assert_eq!(today.len(), 1);
        assert_eq!((today[0].value, today[0].unit), (1.13, DurationUnit::Hours));
        assert!((today[0].duration_seconds - 4065.).abs() < 1e-4);

        store.close()?;
        let raw = Connection::open(&path)?;
        let (value, unit) = raw_row(&raw, "Chrome", DAY).expect("Row should be stored");
        assert_eq!(unit, "hours");
        assert!((value * 3600. - 4065.).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_short_durations_keep_their_fraction() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(DAY);
        let store = open_store(&dir.path().join("usage.db"), &clock)?;

        for _ in 0..10 {
            store.accrue("Code", DAY, 2.4)?;
        }

        let records = store.fetch_records()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duration_unit, DurationUnit::Seconds);
        assert!((records[0].duration_value - 24.).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_ignored_apps_never_create_records() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(DAY);
        let store = open_store(&dir.path().join("usage.db"), &clock)?;

        for _ in 0..20 {
            store.accrue("Explorer", DAY, 30.)?;
            store.accrue("Unknown", DAY, 30.)?;
        }

        assert!(store.fetch_records()?.is_empty());
        assert!(store.fetch_all_time()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_days_are_isolated() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(DAY);
        let store = open_store(&dir.path().join("usage.db"), &clock)?;

        store.accrue("Chrome", DAY, 1800.)?;
        clock.set_date(NEXT_DAY);
        store.accrue("Chrome", NEXT_DAY, 3600.)?;

        let records = store.fetch_records()?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].day, DAY);
        assert_eq!(records[0].duration(), NormalizedDuration::new(30., DurationUnit::Minutes));
        assert_eq!(records[1].day, NEXT_DAY);

        let today = store.fetch_today()?;
        assert_eq!(today.len(), 1);
        assert_eq!((today[0].value, today[0].unit), (1., DurationUnit::Hours));

        let total = store.fetch_all_time()?;
        assert_eq!(total.len(), 1);
        assert_eq!(total[0].duration(), NormalizedDuration::new(1.5, DurationUnit::Hours));

        assert_eq!(store.fetch_day(DAY)?[0].duration_seconds, 1800.);
        Ok(())
    }

    #[test]
    fn test_read_views_are_sorted_descending() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(DAY);
        let store = open_store(&dir.path().join("usage.db"), &clock)?;

        store.accrue("Slack", DAY, 40.)?;
        store.accrue("Chrome", DAY, 600.)?;
        store.accrue("Code", DAY, 7200.)?;
        store.accrue("Slack", NEXT_DAY, 9000.)?;

        let today = store
            .fetch_today()?
            .into_iter()
            .map(|v| v.app_name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(today, vec!["Code", "Chrome", "Slack"]);

        let total = store
            .fetch_all_time()?
            .into_iter()
            .map(|v| v.app_name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(total, vec!["Slack", "Code", "Chrome"]);
        Ok(())
    }

    #[test]
    fn test_unknown_unit_tag_is_reported() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("usage.db");
        {
            // A table created by some other tool without the unit check.
            let raw = Connection::open(&path)?;
            raw.execute_batch(
                "CREATE TABLE usage (
                    name_process TEXT NOT NULL,
                    date TEXT NOT NULL,
                    time REAL NOT NULL,
                    time_type TEXT NOT NULL,
                    PRIMARY KEY (name_process, date)
                );
                INSERT INTO usage VALUES ('Chrome', '2018-07-04', 3, 'days');",
            )?;
        }
        let clock = ManualClock::new(DAY);
        let store = open_store(&path, &clock)?;

        assert!(matches!(
            store.accrue("Chrome", DAY, 10.),
            Err(StoreError::InvalidUnit(_))
        ));
        assert!(matches!(store.fetch_today(), Err(StoreError::InvalidUnit(_))));
        assert!(matches!(store.fetch_all_time(), Err(StoreError::InvalidUnit(_))));
        assert!(matches!(store.fetch_records(), Err(StoreError::InvalidUnit(_))));

        // The failed accrual must not have touched the row.
        store.close()?;
        let raw = Connection::open(&path)?;
        assert_eq!(raw_row(&raw, "Chrome", DAY), Some((3., "days".to_string())));
        Ok(())
    }

    #[test]
    fn test_use_after_close_fails() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(DAY);
        let store = open_store(&dir.path().join("usage.db"), &clock)?;

        store.close()?;

        assert!(matches!(store.accrue("Chrome", DAY, 1.), Err(StoreError::StoreClosed)));
        assert!(matches!(store.fetch_today(), Err(StoreError::StoreClosed)));
        assert!(matches!(store.fetch_all_time(), Err(StoreError::StoreClosed)));
        assert!(matches!(store.close(), Err(StoreError::StoreClosed)));
        Ok(())
    }

    #[test]
    fn test_totals_survive_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("usage.db");
        let clock = ManualClock::new(DAY);

        let store = open_store(&path, &clock)?;
        store.accrue("Chrome", DAY, 50.)?;
        store.close()?;

        let store = open_store(&path, &clock)?;
        store.accrue("Chrome", DAY, 20.)?;
        let today = store.fetch_today()?;
        assert!((today[0].duration_seconds - 70.).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_read_only_store_sees_committed_writes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("usage.db");
        let clock = ManualClock::new(DAY);

        let writer = open_store(&path, &clock)?;
        let reader = SqliteUsageStore::open_read_only(&path, Box::new(clock.clone()))?;

        writer.accrue("Chrome", DAY, 30.)?;
        assert_eq!(reader.fetch_today()?[0].duration_seconds, 30.);
        writer.accrue("Chrome", DAY, 30.)?;
        assert_eq!(reader.fetch_today()?[0].unit, DurationUnit::Minutes);

        assert!(matches!(
            reader.accrue("Chrome", DAY, 1.),
            Err(StoreError::Storage(_))
        ));
        reader.close()?;
        writer.close()?;
        Ok(())
    }

    #[test]
    fn test_empty_and_invalid_windows_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new(DAY);
        let store = open_store(&dir.path().join("usage.db"), &clock)?;

        for elapsed in [0., -5., f64::INFINITY, f64::NAN] {
            store.accrue("Chrome", DAY, elapsed)?;
        }
        assert!(store.fetch_records()?.is_empty());

        store.accrue("Chrome", DAY, 20.)?;
        store.accrue("Chrome", DAY, f64::INFINITY)?;
        store.accrue("Chrome", DAY, 0.)?;
        let today = store.fetch_today()?;
        assert_eq!(today.len(), 1);
        assert_eq!((today[0].value, today[0].unit), (20., DurationUnit::Seconds));
        Ok(())
    }

    #[test]
    fn test_concurrent_writers_lose_no_updates() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("usage.db");
        let clock = ManualClock::new(DAY);
        let stores = (0..4)
            .map(|_| open_store(&path, &clock))
            .collect::<Result<Vec<_>>>()?;

        std::thread::scope(|scope| {
            let writers = stores
                .iter()
                .map(|store| {
                    scope.spawn(move || -> Result<(), StoreError> {
                        for _ in 0..100 {
                            store.accrue("Chrome", DAY, 1.5)?;
                        }
                        Ok(())
                    })
                })
                .collect::<Vec<_>>();
            writers
                .into_iter()
                .try_for_each(|writer| writer.join().expect("Writer thread panicked"))
        })?;

        let today = stores[0].fetch_today()?;
        assert_eq!(today.len(), 1);
        assert!((today[0].duration_seconds - 600.).abs() < 1e-6, "{today:?}");
        assert_eq!((today[0].value, today[0].unit), (10., DurationUnit::Minutes));

        for store in &stores {
            store.close()?;
        }
        Ok(())
    }
}
