// src/sampling/validator.rs
//! Reading acceptance rules

use crate::gps::data::RawReading;
use chrono::{DateTime, Utc};

/// Whether `reading` may join the batch given the last accepted timestamp.
///
/// Readings without an accuracy are rejected, as are readings repeating the
/// previous timestamp (some handsets report several fixes with one stamp).
pub fn is_valid(reading: &RawReading, last_accepted: Option<DateTime<Utc>>) -> bool {
    if reading.accuracy.is_none() {
        return false;
    }
    last_accepted != Some(reading.timestamp)
}

/// [`is_valid`] plus the duplicate-timestamp memory for one session
#[derive(Debug, Default, Clone)]
pub struct ReadingValidator {
    last_accepted: Option<DateTime<Utc>>,
}

impl ReadingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a reading and remember its timestamp when accepted
    pub fn accept(&mut self, reading: &RawReading) -> bool {
        if !is_valid(reading, self.last_accepted) {
            return false;
        }
        self.last_accepted = Some(reading.timestamp);
        true
    }

    pub fn last_accepted(&self) -> Option<DateTime<Utc>> {
        self.last_accepted
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(sec: u32, accuracy: Option<f64>) -> RawReading {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, sec).unwrap();
        RawReading {
            accuracy,
            ..RawReading::new(ts, 1.0, 2.0)
        }
    }

    #[test]
    fn test_rejects_unknown_accuracy() {
        let mut validator = ReadingValidator::new();
        assert!(!validator.accept(&reading(1, None)));
        assert!(validator.last_accepted().is_none());
    }

    #[test]
    fn test_rejects_repeated_timestamp() {
        let mut validator = ReadingValidator::new();
        assert!(validator.accept(&reading(1, Some(5.0))));
        assert!(!validator.accept(&reading(1, Some(2.0))));
        assert!(validator.accept(&reading(2, Some(2.0))));
    }

    #[test]
    fn test_rejected_reading_does_not_move_timestamp() {
        let mut validator = ReadingValidator::new();
        assert!(validator.accept(&reading(1, Some(5.0))));
        assert!(!validator.accept(&reading(2, None)));
        assert!(!validator.accept(&reading(1, Some(5.0))));
    }

    #[test]
    fn test_reset_forgets_timestamp() {
        let mut validator = ReadingValidator::new();
        assert!(validator.accept(&reading(1, Some(5.0))));
        validator.reset();
        assert!(validator.accept(&reading(1, Some(5.0))));
    }

    #[test]
    fn test_no_range_checks() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let odd = RawReading::new(ts, 123.0, -400.0).with_accuracy(1.0).with_speed(-3.0);
        assert!(is_valid(&odd, None));
    }
}
