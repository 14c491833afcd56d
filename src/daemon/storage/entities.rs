use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::normalize::{DurationUnit, NormalizedDuration};

/// One row of the `usage` table. At most one exists per application per day.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct UsageRecordEntity {
    pub app_name: Arc<str>,
    pub day: NaiveDate,
    pub duration_value: f64,
    pub duration_unit: DurationUnit,
}

impl UsageRecordEntity {
    pub fn duration(&self) -> NormalizedDuration {
        NormalizedDuration::new(self.duration_value, self.duration_unit)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration().to_seconds()
    }
}

/// Usage of a single application during one day, as shown to presentation consumers.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct DailyUsage {
    pub app_name: Arc<str>,
    pub duration_seconds: f64,
    pub value: f64,
    pub unit: DurationUnit,
}

/// Usage of a single application summed over every recorded day.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct TotalUsage {
    pub app_name: Arc<str>,
    pub value: f64,
    pub unit: DurationUnit,
}

impl TotalUsage {
    pub fn duration(&self) -> NormalizedDuration {
        NormalizedDuration::new(self.value, self.unit)
    }
}
