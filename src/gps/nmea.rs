// src/gps/nmea.rs
//! NMEA sentence decoding into location readings
//!
//! A receiver emits several sentences per fix (RMC, GGA, GST, ...), all
//! stamped with the same UTC time. Sentences are gathered per epoch and the
//! epoch is turned into a single [`RawReading`] once a sentence from a later
//! epoch shows up.

use super::data::RawReading;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

const KNOTS_TO_MPS: f64 = 0.514_444;

#[derive(Debug, Clone)]
struct EpochFix {
    time: NaiveTime,
    date: Option<NaiveDate>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    speed: Option<f64>,     // m/s
    accuracy: Option<f64>,  // meters
    valid: bool,
    void: bool,
}

impl EpochFix {
    fn new(time: NaiveTime) -> Self {
        Self {
            time,
            date: None,
            latitude: None,
            longitude: None,
            speed: None,
            accuracy: None,
            valid: false,
            void: false,
        }
    }
}

/// Stateful decoder turning a stream of NMEA lines into readings
#[derive(Debug, Default)]
pub struct NmeaDecoder {
    last_date: Option<NaiveDate>,
    epoch: Option<EpochFix>,
}

impl NmeaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sentence. Returns the reading for the previous epoch when
    /// this sentence starts a new one.
    pub fn feed(&mut self, line: &str) -> Option<RawReading> {
        let body = line.trim().split('*').next().unwrap_or("");
        let parts: Vec<&str> = body.split(',').collect();

        let kind = match sentence_kind(parts[0]) {
            Some(kind) => kind,
            None => return None,
        };
        let time = match parts.get(1).and_then(|t| parse_time(t)) {
            Some(time) => time,
            None => return None,
        };

        let starts_new_epoch = self.epoch.as_ref().map_or(false, |e| e.time != time);
        let flushed = if starts_new_epoch { self.finish() } else { None };

        let epoch = self.epoch.get_or_insert_with(|| EpochFix::new(time));
        match kind {
            "RMC" => parse_rmc(epoch, &parts),
            "GGA" => parse_gga(epoch, &parts),
            "GST" => parse_gst(epoch, &parts),
            _ => {}
        }
        if epoch.date.is_some() {
            self.last_date = epoch.date;
        }

        flushed
    }

    /// Flush the epoch in progress, e.g. at end of input.
    pub fn finish(&mut self) -> Option<RawReading> {
        let epoch = self.epoch.take()?;
        if !epoch.valid || epoch.void {
            return None;
        }
        let date = epoch.date.or(self.last_date)?;
        let (latitude, longitude) = (epoch.latitude?, epoch.longitude?);

        let timestamp = Utc.from_utc_datetime(&date.and_time(epoch.time));
        Some(RawReading {
            timestamp,
            latitude,
            longitude,
            accuracy: epoch.accuracy,
            speed: epoch.speed,
            reduced_accuracy: false,
        })
    }
}

/// Whether a line looks like an NMEA sentence
pub fn is_nmea(line: &str) -> bool {
    line.trim_start().starts_with('$')
}

fn sentence_kind(header: &str) -> Option<&'static str> {
    if !header.starts_with('$') || header.len() < 6 || !header.is_ascii() {
        return None;
    }
    match &header[3..] {
        "RMC" => Some("RMC"),
        "GGA" => Some("GGA"),
        "GST" => Some("GST"),
        _ => None,
    }
}

/// Parse `hhmmss[.sss]`
fn parse_time(field: &str) -> Option<NaiveTime> {
    if field.len() < 6 || !field.is_ascii() {
        return None;
    }
    let hours = field[0..2].parse::<u32>().ok()?;
    let minutes = field[2..4].parse::<u32>().ok()?;
    let seconds = field[4..].parse::<f64>().ok()?;
    let whole = seconds.trunc() as u32;
    let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;
    NaiveTime::from_hms_nano_opt(hours, minutes, whole, nanos)
}

/// Parse `ddmmyy`
fn parse_date(field: &str) -> Option<NaiveDate> {
    if field.len() != 6 || !field.is_ascii() {
        return None;
    }
    let day = field[0..2].parse::<u32>().ok()?;
    let month = field[2..4].parse::<u32>().ok()?;
    let year = field[4..6].parse::<i32>().ok()?;
    let year = if year < 80 { 2000 + year } else { 1900 + year };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a `(d)ddmm.mmmm` coordinate with its hemisphere letter
fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw = value.parse::<f64>().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let coord = degrees + minutes / 60.0;
    match hemisphere {
        "S" | "W" => Some(-coord),
        _ => Some(coord),
    }
}

fn field<'a>(parts: &[&'a str], index: usize) -> &'a str {
    parts.get(index).copied().unwrap_or("")
}

/// RMC: time, status, lat, N/S, lon, E/W, speed (knots), course, date
fn parse_rmc(epoch: &mut EpochFix, parts: &[&str]) {
    match field(parts, 2) {
        "A" => epoch.valid = true,
        "V" => epoch.void = true,
        _ => {}
    }

    if let Some(lat) = parse_coordinate(field(parts, 3), field(parts, 4)) {
        epoch.latitude = Some(lat);
    }
    if let Some(lon) = parse_coordinate(field(parts, 5), field(parts, 6)) {
        epoch.longitude = Some(lon);
    }
    if let Ok(knots) = field(parts, 7).parse::<f64>() {
        epoch.speed = Some(knots * KNOTS_TO_MPS);
    }
    if let Some(date) = parse_date(field(parts, 9)) {
        epoch.date = Some(date);
    }
}

/// GGA: time, lat, N/S, lon, E/W, fix quality, ...
fn parse_gga(epoch: &mut EpochFix, parts: &[&str]) {
    if epoch.latitude.is_none() {
        epoch.latitude = parse_coordinate(field(parts, 2), field(parts, 3));
    }
    if epoch.longitude.is_none() {
        epoch.longitude = parse_coordinate(field(parts, 4), field(parts, 5));
    }
    if let Ok(quality) = field(parts, 6).parse::<u8>() {
        if quality > 0 {
            epoch.valid = true;
        }
    }
}

/// GST: time, rms, semi-major, semi-minor, orientation, lat σ, lon σ, alt σ
fn parse_gst(epoch: &mut EpochFix, parts: &[&str]) {
    let lat_err = field(parts, 6).parse::<f64>().ok();
    let lon_err = field(parts, 7).parse::<f64>().ok();
    if let (Some(lat_err), Some(lon_err)) = (lat_err, lon_err) {
        epoch.accuracy = Some(lat_err.hypot(lon_err));
    }
}
