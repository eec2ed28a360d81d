// src/gps/gpsd.rs
//! GPSD client implementation

use super::data::RawReading;
use crate::error::{Result, SamplerError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
};

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

/// Connect to a gpsd daemon and return a stream reader
pub async fn connect_gpsd(host: &str, port: u16) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect(format!("{}:{}", host, port))
        .await
        .map_err(|e| SamplerError::Connection(format!("Failed to connect to gpsd at {}:{}: {}", host, port, e)))?;

    // Send WATCH command to start receiving JSON data
    let watch_cmd = "?WATCH={\"enable\":true,\"json\":true}\n";
    stream
        .write_all(watch_cmd.as_bytes())
        .await
        .map_err(|e| SamplerError::Connection(format!("Failed to send WATCH command: {}", e)))?;

    Ok(BufReader::new(stream))
}

/// Parse a single line of gpsd JSON data. Only TPV messages carrying a 2D
/// or 3D fix produce a reading.
pub fn parse_gpsd_json(line: &str) -> Result<Option<RawReading>> {
    let msg: GpsdMessage = serde_json::from_str(line)
        .map_err(|e| SamplerError::Parse(format!("Failed to parse gpsd JSON: {}", e)))?;

    let reading = match msg.class.as_str() {
        "TPV" => parse_tpv_message(&msg.data),
        "VERSION" => {
            parse_version_message(&msg.data);
            None
        }
        "DEVICES" => {
            parse_devices_message(&msg.data);
            None
        }
        _ => None,
    };

    Ok(reading)
}

/// Parse TPV (Time Position Velocity) message
fn parse_tpv_message(msg_data: &HashMap<String, serde_json::Value>) -> Option<RawReading> {
    let mode = msg_data.get("mode").and_then(|v| v.as_u64()).unwrap_or(0);
    if mode < 2 {
        return None;
    }

    let lat = msg_data.get("lat").and_then(|v| v.as_f64())?;
    let lon = msg_data.get("lon").and_then(|v| v.as_f64())?;
    let time = msg_data
        .get("time")
        .and_then(|v| v.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())?
        .with_timezone(&Utc);

    let number = |key: &str| msg_data.get(key).and_then(|v| v.as_f64());

    // eph is the horizontal error estimate; older daemons only report epx/epy
    let accuracy = number("eph").or_else(|| match (number("epx"), number("epy")) {
        (Some(epx), Some(epy)) => Some(epx.hypot(epy)),
        _ => None,
    });

    Some(RawReading {
        timestamp: time,
        latitude: lat,
        longitude: lon,
        accuracy,
        speed: number("speed"),
        reduced_accuracy: false,
    })
}

/// Parse VERSION message (informational)
fn parse_version_message(msg_data: &HashMap<String, serde_json::Value>) {
    if let Some(version) = msg_data.get("release").and_then(|v| v.as_str()) {
        log::info!("Connected to gpsd version: {}", version);
    }
}

/// Parse DEVICES message (informational)
fn parse_devices_message(msg_data: &HashMap<String, serde_json::Value>) {
    if let Some(devices) = msg_data.get("devices").and_then(|v| v.as_array()) {
        log::info!("gpsd managing {} device(s)", devices.len());
        for device in devices {
            if let Some(path) = device.get("path").and_then(|v| v.as_str()) {
                log::info!("  Device: {}", path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tpv_parsing() {
        let json = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":3,"time":"2023-01-01T12:00:00.000Z","ept":0.005,"lat":48.117,"lon":11.517,"alt":545.4,"epx":15.319,"epy":17.054,"epv":124.484,"track":10.3797,"speed":0.091,"climb":10.7,"eps":34.11,"epc":248.97}"#;

        let reading = parse_gpsd_json(json).unwrap().expect("TPV with fix");

        assert_eq!(reading.latitude, 48.117);
        assert_eq!(reading.longitude, 11.517);
        assert_eq!(reading.speed, Some(0.091));
        assert_eq!(reading.timestamp.to_rfc3339(), "2023-01-01T12:00:00+00:00");
        // No eph, so accuracy falls back to the combined epx/epy
        assert!((reading.accuracy.unwrap() - 15.319_f64.hypot(17.054)).abs() < 1e-9);
    }

    #[test]
    fn test_tpv_prefers_eph() {
        let json = r#"{"class":"TPV","mode":2,"time":"2023-01-01T12:00:01Z","lat":1.0,"lon":2.0,"eph":4.5,"epx":9.0,"epy":9.0}"#;
        let reading = parse_gpsd_json(json).unwrap().unwrap();
        assert_eq!(reading.accuracy, Some(4.5));
        assert_eq!(reading.speed, None);
    }

    #[test]
    fn test_tpv_without_fix_is_skipped() {
        let json = r#"{"class":"TPV","mode":1,"time":"2023-01-01T12:00:00.000Z"}"#;
        assert!(parse_gpsd_json(json).unwrap().is_none());
    }

    #[test]
    fn test_tpv_without_error_estimates_has_unknown_accuracy() {
        let json = r#"{"class":"TPV","mode":3,"time":"2023-01-01T12:00:00Z","lat":1.0,"lon":2.0}"#;
        let reading = parse_gpsd_json(json).unwrap().unwrap();
        assert!(reading.accuracy.is_none());
    }

    #[test]
    fn test_sky_message_yields_nothing() {
        let json = r#"{"class":"SKY","device":"/dev/ttyUSB0","hdop":1.2,"satellites":[{"PRN":1,"ss":42,"used":true}]}"#;
        assert!(parse_gpsd_json(json).unwrap().is_none());
    }

    #[test]
    fn test_invalid_json() {
        let invalid_json = r#"{"invalid": json"#;
        assert!(parse_gpsd_json(invalid_json).is_err());
    }
}
