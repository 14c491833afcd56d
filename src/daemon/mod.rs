use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use collection::{collector::TrackingModule, tracker::UsageTracker};
use config::TrackerConfig;
use storage::{
    ignore::IgnoreSet,
    usage_store::{SqliteUsageStore, UsageStore},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    utils::clock::{Clock, DefaultClock},
    window_api::{ForegroundResolver, GenericWindowManager, WindowManager},
};

pub mod args;
pub mod collection;
pub mod config;
pub mod shutdown;
pub mod storage;

pub const DATABASE_FILE_NAME: &str = "usage.db";

pub fn database_path(dir: &Path) -> PathBuf {
    dir.join(DATABASE_FILE_NAME)
}

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, poll_interval_secs: Option<u64>) -> Result<()> {
    let config = TrackerConfig::load(&dir)?.with_poll_interval(poll_interval_secs)?;
    info!("Starting daemon in {dir:?} with {config:?}");

    let manager = GenericWindowManager::new()?;
    let store = Arc::new(create_store(&dir, config.ignore_set(), DefaultClock)?);

    let shutdown_token = CancellationToken::new();
    let tracking = create_tracking(
        manager,
        store.clone(),
        &shutdown_token,
        config.poll_interval(),
        DefaultClock,
    );

    let (_, tracking_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        async {
            let result = tracking.run().await;
            // Stops signal detection when tracking ends on its own.
            shutdown_token.cancel();
            result
        },
    );

    if let Err(tracking_result) = &tracking_result {
        error!("Tracking module got an error {:?}", tracking_result);
    }

    // Data committed before a failure stays valid, so the store is closed either way.
    store.close().inspect_err(|e| error!("Failed to close usage store {e:?}"))?;
    info!("Daemon stopped");

    tracking_result?;
    Ok(())
}

fn create_store(dir: &Path, ignored: IgnoreSet, clock: impl Clock) -> Result<SqliteUsageStore> {
    Ok(SqliteUsageStore::open(&database_path(dir), ignored, Box::new(clock))?)
}

fn create_tracking<S: UsageStore>(
    manager: impl WindowManager + 'static,
    store: S,
    shutdown_token: &CancellationToken,
    poll_interval: Duration,
    clock: impl Clock + Clone,
) -> TrackingModule<S> {
    let resolver = ForegroundResolver::new(Box::new(manager));
    TrackingModule::new(
        UsageTracker::new(resolver, store, Box::new(clock.clone())),
        shutdown_token.clone(),
        poll_interval,
        Box::new(clock),
    )
}
