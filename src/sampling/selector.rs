// src/sampling/selector.rs
//! Picks the authoritative fix from a finished batch

use crate::gps::data::LocationSample;

/// The sample with the smallest accuracy; the earliest one wins ties.
/// Returns `None` for an empty batch.
pub fn select_best(samples: &[LocationSample]) -> Option<&LocationSample> {
    // min_by keeps the first of several equal minima
    samples
        .iter()
        .min_by(|a, b| a.accuracy_meters().total_cmp(&b.accuracy_meters()))
}

/// Display string for a selected sample
pub fn diagnostic(sample: &LocationSample) -> String {
    format!("Accuracy: {:.1}m", sample.accuracy_meters())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::RawReading;
    use chrono::{TimeZone, Utc};

    fn batch(accuracies: &[f64]) -> Vec<LocationSample> {
        accuracies
            .iter()
            .enumerate()
            .map(|(i, acc)| {
                let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, i as u32).unwrap();
                LocationSample::from_reading(&RawReading::new(ts, i as f64, 0.0).with_accuracy(*acc))
            })
            .collect()
    }

    #[test]
    fn test_earliest_minimum_wins() {
        let samples = batch(&[5.0, 2.0, 2.0, 8.0]);
        let best = select_best(&samples).unwrap();
        assert_eq!(best.accuracy, Some(2.0));
        assert_eq!(best.lat, 1.0);
    }

    #[test]
    fn test_empty_batch() {
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn test_single_sample() {
        let samples = batch(&[42.0]);
        assert_eq!(select_best(&samples).unwrap().accuracy, Some(42.0));
    }

    #[test]
    fn test_diagnostic_format() {
        let samples = batch(&[2.345]);
        assert_eq!(diagnostic(&samples[0]), "Accuracy: 2.3m");
    }
}
