// src/gps/data.rs
//! Location reading structures and precision helpers

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Number of accepted readings that completes a sampling batch
pub const MAX_LOCATION_SAMPLES: usize = 30;

/// Accuracy (meters) below which a fix counts as good
pub const GOOD_PRECISION: f64 = 3.0;
/// Accuracy (meters) at or above which a fix counts as bad. Also stands in
/// for readings that never reported an accuracy.
pub const BAD_PRECISION: f64 = 100.0;

/// One raw fix as delivered by a location source, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>, // meters
    pub speed: Option<f64>,    // m/s
    pub reduced_accuracy: bool,
}

impl RawReading {
    pub fn new(timestamp: DateTime<Utc>, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            accuracy: None,
            speed: None,
            reduced_accuracy: false,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }
}

/// Where a sample's accuracy value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracySource {
    Reported,
    /// The source gave no accuracy and `BAD_PRECISION` was substituted
    Fallback,
}

/// An accepted reading as stored against a location of interest and
/// written to the export file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(rename = "reducedaccuracy", default)]
    pub reduced_accuracy: bool,
    #[serde(skip)]
    accuracy_fallback: bool,
}

impl LocationSample {
    /// Convert a validated reading into a stored sample.
    pub fn from_reading(reading: &RawReading) -> Self {
        Self {
            time: reading.timestamp,
            lat: reading.latitude,
            lon: reading.longitude,
            name: None,
            accuracy: Some(reading.accuracy.unwrap_or(BAD_PRECISION)),
            speed: Some(reading.speed.unwrap_or(0.0)),
            reduced_accuracy: reading.reduced_accuracy,
            accuracy_fallback: reading.accuracy.is_none(),
        }
    }

    /// Accuracy used for ranking; samples without one rank as `BAD_PRECISION`.
    pub fn accuracy_meters(&self) -> f64 {
        self.accuracy.unwrap_or(BAD_PRECISION)
    }

    pub fn accuracy_source(&self) -> AccuracySource {
        if self.accuracy_fallback || self.accuracy.is_none() {
            AccuracySource::Fallback
        } else {
            AccuracySource::Reported
        }
    }

    pub fn precision(&self) -> PrecisionCategory {
        PrecisionCategory::from_accuracy(self.accuracy)
    }

    /// Timestamp rendered in local time for display
    pub fn local_time_string(&self) -> String {
        self.time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Display classification of a fix's accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionCategory {
    Good,
    Poor,
    Bad,
}

impl PrecisionCategory {
    pub fn from_accuracy(accuracy: Option<f64>) -> Self {
        match accuracy {
            Some(acc) if acc < GOOD_PRECISION => PrecisionCategory::Good,
            Some(acc) if acc < BAD_PRECISION => PrecisionCategory::Poor,
            _ => PrecisionCategory::Bad,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            PrecisionCategory::Good => "#2dc937",
            PrecisionCategory::Poor => "#db7b2b",
            PrecisionCategory::Bad => "#cc3232",
        }
    }

    pub fn indicator(&self) -> &'static str {
        match self {
            PrecisionCategory::Good => "check_green",
            PrecisionCategory::Poor => "check_orange",
            PrecisionCategory::Bad => "cancel_red",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PrecisionCategory::Good => "Good",
            PrecisionCategory::Poor => "Poor",
            PrecisionCategory::Bad => "Bad",
        }
    }
}

/// Format coordinate for display
pub fn format_coordinate(coord: f64) -> String {
    format!("{:>12.6}°", coord)
}
