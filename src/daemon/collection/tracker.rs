use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::{
    daemon::storage::{error::StoreError, usage_store::UsageStore},
    utils::clock::Clock,
    window_api::ForegroundResolver,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerState {
    /// Nothing observed yet, so there is nobody to credit.
    Idle,
    Tracking {
        active_app: Arc<str>,
        last_observation: Instant,
    },
}

/// Attributes the time between consecutive ticks to whichever application was in front
/// at the earlier tick. Session state lives only in memory.
pub struct UsageTracker<S: UsageStore> {
    resolver: ForegroundResolver,
    store: S,
    time_provider: Box<dyn Clock>,
    state: TrackerState,
}

impl<S: UsageStore> UsageTracker<S> {
    pub fn new(resolver: ForegroundResolver, store: S, time_provider: Box<dyn Clock>) -> Self {
        Self {
            resolver,
            store,
            time_provider,
            state: TrackerState::Idle,
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn active_app(&self) -> Option<&str> {
        match &self.state {
            TrackerState::Idle => None,
            TrackerState::Tracking { active_app, .. } => Some(active_app),
        }
    }

    /// Credits the time since the previous tick to the previously active application and
    /// then starts a new window for the current one. Time is credited on every tick, not
    /// only on switches.
    ///
    /// When the store fails the state is left untouched, so the same window is credited
    /// again by the next tick or by [Self::flush].
    #[instrument(skip(self))]
    pub fn tick(&mut self) -> Result<(), StoreError> {
        let current = self.resolver.resolve();
        let now = self.time_provider.instant();

        self.credit_until(now)?;

        debug!("Foreground application is {current}");
        self.state = TrackerState::Tracking {
            active_app: current,
            last_observation: now,
        };
        Ok(())
    }

    /// Credits the in-flight window up to now without looking at the foreground. Used
    /// right before shutdown.
    #[instrument(skip(self))]
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let now = self.time_provider.instant();
        self.credit_until(now)?;

        if let TrackerState::Tracking {
            last_observation, ..
        } = &mut self.state
        {
            *last_observation = now;
        }
        Ok(())
    }

    fn credit_until(&self, now: Instant) -> Result<(), StoreError> {
        let TrackerState::Tracking {
            active_app,
            last_observation,
        } = &self.state
        else {
            return Ok(());
        };

        let elapsed = now.saturating_duration_since(*last_observation);
        self.store.accrue(
            active_app,
            self.time_provider.local_date(),
            elapsed.as_secs_f64(),
        )
    }
}
