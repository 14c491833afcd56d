use std::{fmt::Write, path::Path};

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    daemon::{
        database_path,
        storage::{
            entities::{DailyUsage, TotalUsage, UsageRecordEntity},
            usage_store::{SqliteUsageStore, UsageStore},
        },
    },
    utils::{clock::DefaultClock, normalize::NormalizedDuration},
};

#[derive(Debug, Clone, Copy)]
pub enum ReportKind {
    Today,
    Day(NaiveDate),
    Total,
    Records,
}

/// Prints one of the store's read views. Opens the database read-only, so this is safe to
/// run while the daemon is writing.
pub fn print_report(dir: &Path, kind: ReportKind, json: bool) -> Result<()> {
    let path = database_path(dir);
    if !path.exists() {
        println!("No usage recorded yet, start tracking with `usagetally init`");
        return Ok(());
    }

    let store = SqliteUsageStore::open_read_only(&path, Box::new(DefaultClock))?;
    let output = render(&store, kind, json);
    store.close()?;
    print!("{}", output?);
    Ok(())
}

fn render(store: &impl UsageStore, kind: ReportKind, json: bool) -> Result<String> {
    match kind {
        ReportKind::Today => format_daily(&store.fetch_today()?, json),
        ReportKind::Day(day) => format_daily(&store.fetch_day(day)?, json),
        ReportKind::Total => format_totals(&store.fetch_all_time()?, json),
        ReportKind::Records => format_records(&store.fetch_records()?, json),
    }
}

fn to_json(value: &impl Serialize) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)? + "\n")
}

fn format_daily(usages: &[DailyUsage], json: bool) -> Result<String> {
    if json {
        return to_json(&usages);
    }
    let mut output = String::new();
    for usage in usages {
        let duration = NormalizedDuration::new(usage.value, usage.unit);
        writeln!(output, "{duration}\t{}", usage.app_name)?;
    }
    Ok(output)
}

fn format_totals(totals: &[TotalUsage], json: bool) -> Result<String> {
    if json {
        return to_json(&totals);
    }
    let mut output = String::new();
    for total in totals {
        writeln!(output, "{}\t{}", total.duration(), total.app_name)?;
    }
    Ok(output)
}

fn format_records(records: &[UsageRecordEntity], json: bool) -> Result<String> {
    if json {
        return to_json(&records);
    }
    let mut output = String::new();
    for record in records {
        writeln!(
            output,
            "{}\t{}\t{}",
            record.day.format("%Y-%m-%d"),
            record.duration(),
            record.app_name
        )?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;

    use crate::{
        daemon::storage::{
            entities::{DailyUsage, TotalUsage, UsageRecordEntity},
            usage_store::MockUsageStore,
        },
        utils::normalize::DurationUnit,
    };

    use super::{render, ReportKind};

    const DAY: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

    #[test]
    fn test_today_as_text() -> Result<()> {
        let mut store = MockUsageStore::new();
        store.expect_fetch_today().returning(|| {
            Ok(vec![
                DailyUsage {
                    app_name: "Chrome".into(),
                    duration_seconds: 4065.,
                    value: 1.13,
                    unit: DurationUnit::Hours,
                },
                DailyUsage {
                    app_name: "Slack".into(),
                    duration_seconds: 12.,
                    value: 12.,
                    unit: DurationUnit::Seconds,
                },
            ])
        });

        let text = render(&store, ReportKind::Today, false)?;
        assert_eq!(text, "1.13 hours\tChrome\n12 seconds\tSlack\n");
        Ok(())
    }

    #[test]
    fn test_totals_as_json() -> Result<()> {
        let mut store = MockUsageStore::new();
        store.expect_fetch_all_time().returning(|| {
            Ok(vec![TotalUsage {
                app_name: "Code".into(),
                value: 2.5,
                unit: DurationUnit::Minutes,
            }])
        });

        let json: serde_json::Value =
            serde_json::from_str(&render(&store, ReportKind::Total, true)?)?;
        assert_eq!(
            json,
            serde_json::json!([{ "app_name": "Code", "value": 2.5, "unit": "minutes" }])
        );
        Ok(())
    }

    #[test]
    fn test_records_as_text() -> Result<()> {
        let mut store = MockUsageStore::new();
        store.expect_fetch_records().returning(|| {
            Ok(vec![UsageRecordEntity {
                app_name: "Code".into(),
                day: DAY,
                duration_value: 30.,
                duration_unit: DurationUnit::Minutes,
            }])
        });

        let text = render(&store, ReportKind::Records, false)?;
        assert_eq!(text, "2018-07-04\t30 minutes\tCode\n");
        Ok(())
    }
}
