use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use crate::{
    daemon::storage::{error::StoreError, usage_store::UsageStore},
    utils::clock::Clock,
};

use super::tracker::UsageTracker;

/// Drives a [UsageTracker] on a fixed cadence until the shutdown token is cancelled.
pub struct TrackingModule<S: UsageStore> {
    tracker: UsageTracker<S>,
    shutdown: CancellationToken,
    collection_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl<S: UsageStore> TrackingModule<S> {
    pub fn new(
        tracker: UsageTracker<S>,
        shutdown: CancellationToken,
        collection_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            shutdown,
            collection_frequency,
            time_provider,
        }
    }

    /// Executes the tracking event loop. A store error ends the loop and is returned after
    /// a best-effort flush of the in-flight session.
    pub async fn run(mut self) -> Result<(), StoreError> {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.collection_frequency;

            let tick = {
                let _span = info_span!("Tracking foreground application").entered();
                self.tracker.tick()
            };
            if let Err(e) = tick {
                error!("Failed to record usage, stopping tracking {e:?}");
                if let Err(flush_error) = self.tracker.flush() {
                    warn!("Final flush failed as well {flush_error:?}");
                }
                return Err(e);
            }

            tokio::select! {
                // Cancellation stops the event loop, but the time since the last tick still
                // belongs to the active application.
                _ = self.shutdown.cancelled() => {
                    info!("Shutting down tracking, flushing current session");
                    return self.tracker.flush();
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use mockall::predicate::eq;
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            collection::tracker::UsageTracker,
            storage::{error::StoreError, usage_store::MockUsageStore},
        },
        utils::{clock::test_clock::ManualClock, logging::TEST_LOGGING},
        window_api::{ForegroundResolver, MockWindowManager},
    };

    use super::TrackingModule;

    const DAY: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

    fn resolver() -> ForegroundResolver {
        let mut manager = MockWindowManager::new();
        manager
            .expect_get_active_process()
            .returning(|| Ok("chrome.exe".into()));
        ForegroundResolver::new(Box::new(manager))
    }

    #[tokio::test]
    async fn test_cancel_flushes_session() {
        *TEST_LOGGING;
        let clock = ManualClock::new(DAY);
        let mut store = MockUsageStore::new();
        store
            .expect_accrue()
            .with(eq("Chrome"), eq(DAY), eq(0.))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let module = TrackingModule::new(
            UsageTracker::new(resolver(), store, Box::new(clock.clone())),
            shutdown,
            Duration::from_secs(2),
            Box::new(clock),
        );

        module.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_error_stops_loop() {
        *TEST_LOGGING;
        let clock = ManualClock::new(DAY);
        let mut store = MockUsageStore::new();
        // One failing tick plus the best-effort flush.
        store
            .expect_accrue()
            .times(2)
            .returning(|_, _, _| Err(StoreError::StoreClosed));

        let module = TrackingModule::new(
            UsageTracker::new(resolver(), store, Box::new(clock.clone())),
            CancellationToken::new(),
            Duration::from_millis(1),
            Box::new(clock),
        );

        let result = tokio::time::timeout(Duration::from_secs(5), module.run())
            .await
            .expect("Loop should stop on its own");
        assert!(matches!(result, Err(StoreError::StoreClosed)));
    }
}
