// src/gps/mod.rs
//! Location readings and the sources that produce them

pub mod data;
pub mod gpsd;
pub mod nmea;
pub mod source;

pub use data::{LocationSample, PrecisionCategory, RawReading};
pub use source::{LocationSource, PermissionStatus, SamplingMethod, SourceEvent};
