//! Conversion between raw seconds and the human-scale `(value, unit)` pairs that are
//! persisted and displayed.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SECONDS_PER_MINUTE: f64 = 60.;
const SECONDS_PER_HOUR: f64 = 3600.;

/// Returned when a unit tag is not one of `seconds`, `minutes` or `hours`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid duration unit {0:?}, expected \"seconds\", \"minutes\" or \"hours\"")]
pub struct InvalidUnit(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
}

impl DurationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationUnit::Seconds => "seconds",
            DurationUnit::Minutes => "minutes",
            DurationUnit::Hours => "hours",
        }
    }

    fn seconds_per_unit(&self) -> f64 {
        match self {
            DurationUnit::Seconds => 1.,
            DurationUnit::Minutes => SECONDS_PER_MINUTE,
            DurationUnit::Hours => SECONDS_PER_HOUR,
        }
    }
}

impl Display for DurationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DurationUnit {
    type Err = InvalidUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seconds" => Ok(DurationUnit::Seconds),
            "minutes" => Ok(DurationUnit::Minutes),
            "hours" => Ok(DurationUnit::Hours),
            other => Err(InvalidUnit(other.to_string())),
        }
    }
}

/// Rounding policy applied by [normalize_with].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Used for every write. Keeps enough digits that repeated read-modify-write cycles
    /// don't accumulate error, and keeps the fraction of the seconds unit.
    Storage,
    /// Used for read views. Whole seconds, two decimals for minutes and hours.
    Display,
}

impl Precision {
    const STORAGE_DECIMALS: i32 = 10;
    const DISPLAY_DECIMALS: i32 = 2;

    fn round_seconds(&self, seconds: f64) -> f64 {
        match self {
            Precision::Storage => round_to(seconds, Self::STORAGE_DECIMALS),
            Precision::Display => seconds.round(),
        }
    }

    fn round_scaled(&self, value: f64) -> f64 {
        match self {
            Precision::Storage => round_to(value, Self::STORAGE_DECIMALS),
            Precision::Display => round_to(value, Self::DISPLAY_DECIMALS),
        }
    }
}

/// A duration expressed in the largest unit it fills at least once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDuration {
    pub value: f64,
    pub unit: DurationUnit,
}

impl NormalizedDuration {
    pub fn new(value: f64, unit: DurationUnit) -> Self {
        Self { value, unit }
    }

    pub fn to_seconds(&self) -> f64 {
        to_seconds(self.value, self.unit)
    }
}

impl Display for NormalizedDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Display-precision normalization.
pub fn normalize(seconds: f64) -> NormalizedDuration {
    normalize_with(seconds, Precision::Display)
}

pub fn normalize_with(seconds: f64, precision: Precision) -> NormalizedDuration {
    // Negative or NaN input is treated as no time at all.
    let seconds = if seconds.is_nan() { 0. } else { seconds.max(0.) };

    if seconds < SECONDS_PER_MINUTE {
        NormalizedDuration::new(precision.round_seconds(seconds), DurationUnit::Seconds)
    } else if seconds < SECONDS_PER_HOUR {
        NormalizedDuration::new(
            precision.round_scaled(seconds / SECONDS_PER_MINUTE),
            DurationUnit::Minutes,
        )
    } else {
        NormalizedDuration::new(
            precision.round_scaled(seconds / SECONDS_PER_HOUR),
            DurationUnit::Hours,
        )
    }
}

pub fn to_seconds(value: f64, unit: DurationUnit) -> f64 {
    value * unit.seconds_per_unit()
}

/// Same as [to_seconds] for a unit read back as text, e.g. from the `time_type` column.
pub fn tagged_to_seconds(value: f64, tag: &str) -> Result<f64, InvalidUnit> {
    Ok(to_seconds(value, tag.parse()?))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
