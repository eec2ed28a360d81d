// src/sampling/mod.rs
//! Sampling batches: validation, selection and per-target state

pub mod notify;
pub mod selector;
pub mod session;
pub mod target;
pub mod validator;

pub use notify::{ChangeNotifier, Property, SubscriptionId, TargetChange};
pub use session::{ReadingOutcome, SamplingSession, SessionState};
pub use target::LocationOfInterest;
pub use validator::ReadingValidator;
