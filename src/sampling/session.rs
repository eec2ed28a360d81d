// src/sampling/session.rs
//! One bounded sampling batch for a single location of interest

use super::{selector, target::LocationOfInterest, validator::ReadingValidator};
use crate::gps::data::{LocationSample, RawReading, MAX_LOCATION_SAMPLES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Completed,
}

/// What happened to a reading handed to the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingOutcome {
    /// The session is not active
    Ignored,
    Rejected,
    Accepted { progress: f64 },
    /// The batch reached its cap and the best sample was selected
    Completed,
}

/// Sampling batch state machine: `Idle -> Active -> Completed`.
///
/// A session is single use. The owner keeps the target list and passes the
/// session's target in on every call.
#[derive(Debug)]
pub struct SamplingSession {
    target: usize,
    state: SessionState,
    validator: ReadingValidator,
}

impl SamplingSession {
    /// Create a session for `target` (its index in the owner's list) and start it.
    pub fn begin(index: usize, target: &mut LocationOfInterest) -> Self {
        let mut session = Self {
            target: index,
            state: SessionState::Idle,
            validator: ReadingValidator::new(),
        };
        session.start(target);
        session
    }

    fn start(&mut self, target: &mut LocationOfInterest) {
        target.set_sampling(true);
        self.validator.reset();
        self.state = SessionState::Active;
        log::info!("Sampling started for '{}'", target.name());
    }

    pub fn target_index(&self) -> usize {
        self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Validate and append one reading, finalizing the batch at the cap.
    pub fn on_reading(&mut self, target: &mut LocationOfInterest, reading: &RawReading) -> ReadingOutcome {
        if self.state != SessionState::Active {
            return ReadingOutcome::Ignored;
        }
        if !self.validator.accept(reading) {
            log::debug!("Rejected reading at {} for '{}'", reading.timestamp, target.name());
            return ReadingOutcome::Rejected;
        }

        target.push_sample(LocationSample::from_reading(reading));

        if target.samples().len() >= MAX_LOCATION_SAMPLES {
            self.complete(target);
            return ReadingOutcome::Completed;
        }
        ReadingOutcome::Accepted {
            progress: target.sampling_progress(),
        }
    }

    fn complete(&mut self, target: &mut LocationOfInterest) {
        self.state = SessionState::Completed;
        target.set_sampling(false);

        let best = selector::select_best(target.samples()).cloned();
        let diagnostic = best.as_ref().map(selector::diagnostic).unwrap_or_default();
        log::info!("Sampling completed for '{}': {}", target.name(), diagnostic);
        target.set_selected(best, diagnostic);
    }

    /// Abandon the batch without selecting. Accumulated samples stay on the
    /// target. Returns whether the session was active.
    pub fn stop(&mut self, target: &mut LocationOfInterest) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        self.state = SessionState::Idle;
        target.set_sampling(false);
        log::info!(
            "Sampling stopped for '{}' with {} sample(s)",
            target.name(),
            target.samples().len()
        );
        true
    }
}
