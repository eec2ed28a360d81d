// src/error.rs
//! Error types for the location sampler

use std::fmt;

pub type Result<T> = std::result::Result<T, SamplerError>;

#[derive(Debug)]
pub enum SamplerError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Connection(String),
    Parse(String),
    Config(String),
    /// Location permission was not granted, so no batch can be created
    PermissionDenied,
    ListeningFailure(String),
    Persistence(String),
    Share(String),
    Other(String),
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::Io(e) => write!(f, "IO error: {}", e),
            SamplerError::Serial(e) => write!(f, "Serial error: {}", e),
            SamplerError::Json(e) => write!(f, "JSON error: {}", e),
            SamplerError::Connection(msg) => write!(f, "Connection error: {}", msg),
            SamplerError::Parse(msg) => write!(f, "Parse error: {}", msg),
            SamplerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SamplerError::PermissionDenied => write!(f, "Location permission not granted"),
            SamplerError::ListeningFailure(msg) => write!(f, "Location listening failed: {}", msg),
            SamplerError::Persistence(msg) => write!(f, "Failed to persist locations: {}", msg),
            SamplerError::Share(msg) => write!(f, "Failed to share export: {}", msg),
            SamplerError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for SamplerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SamplerError::Io(e) => Some(e),
            SamplerError::Serial(e) => Some(e),
            SamplerError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SamplerError {
    fn from(error: std::io::Error) -> Self {
        SamplerError::Io(error)
    }
}

impl From<tokio_serial::Error> for SamplerError {
    fn from(error: tokio_serial::Error) -> Self {
        SamplerError::Serial(error)
    }
}

impl From<serde_json::Error> for SamplerError {
    fn from(error: serde_json::Error) -> Self {
        SamplerError::Json(error)
    }
}

impl From<anyhow::Error> for SamplerError {
    fn from(error: anyhow::Error) -> Self {
        SamplerError::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            SamplerError::PermissionDenied.to_string(),
            "Location permission not granted"
        );
        assert_eq!(
            SamplerError::Persistence("disk full".to_string()).to_string(),
            "Failed to persist locations: disk full"
        );
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SamplerError = io.into();
        assert!(matches!(err, SamplerError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
