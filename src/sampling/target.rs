// src/sampling/target.rs
//! Locations of interest and their sample batches

use crate::gps::data::{LocationSample, PrecisionCategory, MAX_LOCATION_SAMPLES};
use serde::{Deserialize, Serialize};

/// A named place for which one authoritative fix is collected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationOfInterest {
    name: String,
    #[serde(default)]
    samples: Vec<LocationSample>,
    #[serde(rename = "location", default, skip_serializing_if = "Option::is_none")]
    selected: Option<LocationSample>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    diagnostic: String,
    #[serde(skip)]
    is_sampling: bool,
}

impl LocationOfInterest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
            selected: None,
            diagnostic: String::new(),
            is_sampling: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Samples in arrival order
    pub fn samples(&self) -> &[LocationSample] {
        &self.samples
    }

    pub fn selected_reading(&self) -> Option<&LocationSample> {
        self.selected.as_ref()
    }

    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }

    pub fn is_sampling(&self) -> bool {
        self.is_sampling
    }

    /// Fraction of the batch collected so far, in `0.0..=1.0`
    pub fn sampling_progress(&self) -> f64 {
        self.samples.len() as f64 / MAX_LOCATION_SAMPLES as f64
    }

    pub fn precision_category(&self) -> PrecisionCategory {
        PrecisionCategory::from_accuracy(self.selected.as_ref().and_then(|s| s.accuracy))
    }

    pub fn precision_color(&self) -> &'static str {
        self.precision_category().color()
    }

    pub fn precision_indicator(&self) -> &'static str {
        self.precision_category().indicator()
    }

    /// Timestamp, diagnostic and precision are only shown for a finished batch
    pub fn show_location_details(&self) -> bool {
        !self.is_sampling && self.selected.is_some()
    }

    pub fn location_timestamp(&self) -> String {
        self.selected
            .as_ref()
            .map(|s| s.local_time_string())
            .unwrap_or_default()
    }

    /// Starting a batch empties the sample list.
    pub(crate) fn set_sampling(&mut self, sampling: bool) {
        if sampling && !self.is_sampling {
            self.samples.clear();
        }
        self.is_sampling = sampling;
    }

    pub(crate) fn push_sample(&mut self, sample: LocationSample) {
        self.samples.push(sample);
    }

    pub(crate) fn replace_samples(&mut self, samples: Vec<LocationSample>) {
        self.samples = samples;
    }

    pub(crate) fn set_selected(&mut self, selected: Option<LocationSample>, diagnostic: String) {
        self.selected = selected;
        self.diagnostic = diagnostic;
    }

    pub(crate) fn clear(&mut self) {
        self.samples.clear();
        self.selected = None;
        self.diagnostic.clear();
        self.is_sampling = false;
    }
}
