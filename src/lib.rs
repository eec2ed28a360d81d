// src/lib.rs
//! Location Sampler Library
//!
//! Samples GPS readings for a set of named locations of interest, keeps the
//! most accurate reading of each bounded batch and exports the result.

pub mod config;
pub mod coordinator;
pub mod display;
pub mod error;
pub mod export;
pub mod gps;
pub mod monitor;
pub mod sampling;

// Re-export main types for convenience
pub use config::SamplerConfig;
pub use coordinator::SamplingCoordinator;
pub use error::{Result, SamplerError};
pub use export::{ExportSink, PersistenceSink};
pub use gps::{LocationSample, LocationSource, RawReading, SamplingMethod};
pub use monitor::SamplingMonitor;
pub use sampling::LocationOfInterest;
