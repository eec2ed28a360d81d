// src/export.rs
//! JSON export of locations of interest and hand-off to a share action

use crate::error::{Result, SamplerError};
use crate::sampling::LocationOfInterest;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

pub const SHARE_TITLE: &str = "Share Location of Interest";

/// Receives the full target list once per completed batch. Implementations
/// must not block the caller and must handle their own failures.
pub trait PersistenceSink {
    fn persist(&mut self, targets: &[LocationOfInterest]);
}

/// Platform share action for a finished export file
pub trait ShareHandler: Send + Sync {
    fn share(&self, path: &Path, title: &str) -> Result<()>;
}

/// `CF_<YYYYMMDDHHmmss>.json`
pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("CF_{}.json", now.format("%Y%m%d%H%M%S"))
}

pub fn to_json(targets: &[LocationOfInterest]) -> Result<String> {
    serde_json::to_string_pretty(targets).map_err(SamplerError::Json)
}

pub fn from_json(json: &str) -> Result<Vec<LocationOfInterest>> {
    serde_json::from_str(json).map_err(|e| SamplerError::Parse(format!("Invalid export file: {}", e)))
}

/// Write `contents` into `dir` under the export name for `now`.
pub fn write_export(dir: &Path, contents: &str, now: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .map_err(|e| SamplerError::Persistence(format!("Failed to create export directory: {}", e)))?;

    let path = dir.join(export_file_name(now));
    fs::write(&path, contents)
        .map_err(|e| SamplerError::Persistence(format!("Failed to write {}: {}", path.display(), e)))?;

    Ok(path)
}

/// Restore a target list from an earlier export file
pub fn load_targets(path: &Path) -> Result<Vec<LocationOfInterest>> {
    let contents = fs::read_to_string(path)?;
    from_json(&contents)
}

/// Logs the export path; used when no share program is configured
#[derive(Debug, Default)]
pub struct LogShare;

impl ShareHandler for LogShare {
    fn share(&self, path: &Path, title: &str) -> Result<()> {
        log::info!("{}: {}", title, path.display());
        Ok(())
    }
}

/// Runs an external program with the export path as its last argument
#[derive(Debug, Clone)]
pub struct CommandShare {
    program: String,
    args: Vec<String>,
}

impl CommandShare {
    /// Split a command line such as `"xdg-open"` or `"mail -s locations"`
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

impl ShareHandler for CommandShare {
    fn share(&self, path: &Path, _title: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()
            .map_err(|e| SamplerError::Share(format!("Failed to run {}: {}", self.program, e)))?;

        if !status.success() {
            return Err(SamplerError::Share(format!("{} exited with {}", self.program, status)));
        }
        Ok(())
    }
}

/// Writes an export file per completed batch and shares it
#[derive(Clone)]
pub struct ExportSink {
    dir: PathBuf,
    share: Arc<dyn ShareHandler>,
}

impl ExportSink {
    pub fn new(dir: PathBuf, share: Arc<dyn ShareHandler>) -> Self {
        Self { dir, share }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize, write and share on the calling thread.
    pub fn export_now(&self, targets: &[LocationOfInterest]) -> Result<PathBuf> {
        let json = to_json(targets)?;
        Self::write_and_share(&self.dir, self.share.as_ref(), &json)
    }

    fn write_and_share(dir: &Path, share: &dyn ShareHandler, json: &str) -> Result<PathBuf> {
        let path = write_export(dir, json, Local::now())?;
        log::info!("Persisted locations of interest to {}", path.display());
        share.share(&path, SHARE_TITLE)?;
        Ok(path)
    }
}

impl PersistenceSink for ExportSink {
    fn persist(&mut self, targets: &[LocationOfInterest]) {
        // Serialize now so later in-memory changes cannot leak into this export
        let json = match to_json(targets) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to persist session/course fragment! {}", e);
                return;
            }
        };

        let dir = self.dir.clone();
        let share = Arc::clone(&self.share);
        let job = move || {
            if let Err(e) = Self::write_and_share(&dir, share.as_ref(), &json) {
                log::error!("Failed to persist session/course fragment! {}", e);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => job(),
        }
    }
}

impl std::fmt::Debug for ExportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportSink").field("dir", &self.dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::{LocationSample, RawReading};
    use crate::sampling::SamplingSession;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingShare {
        shared: Mutex<Vec<PathBuf>>,
    }

    impl ShareHandler for RecordingShare {
        fn share(&self, path: &Path, title: &str) -> Result<()> {
            assert_eq!(title, SHARE_TITLE);
            self.shared.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    struct FailingShare;

    impl ShareHandler for FailingShare {
        fn share(&self, _path: &Path, _title: &str) -> Result<()> {
            Err(SamplerError::Share("no share target".to_string()))
        }
    }

    fn sampled_targets() -> Vec<LocationOfInterest> {
        let mut first = LocationOfInterest::new("Location 1");
        let mut session = SamplingSession::begin(0, &mut first);
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        for i in 0..3 {
            let mut reading = RawReading::new(base + chrono::Duration::seconds(i), 48.1, 11.5)
                .with_accuracy(2.0 + i as f64);
            reading.reduced_accuracy = i == 1;
            session.on_reading(&mut first, &reading);
        }
        session.stop(&mut first);
        vec![first, LocationOfInterest::new("Location 2")]
    }

    #[test]
    fn test_export_file_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(export_file_name(now), "CF_20240309070501.json");
    }

    #[test]
    fn test_round_trip_preserves_absent_fields() {
        let mut targets = sampled_targets();
        let mut sample = targets[0].samples()[0].clone();
        sample.speed = None;
        sample.accuracy = None;
        let mut restored_samples = targets[0].samples().to_vec();
        restored_samples[0] = sample;
        targets[0].replace_samples(restored_samples);

        let json = to_json(&targets).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        let first = &raw[0]["samples"][0];
        assert!(first.get("speed").is_none());
        assert!(first.get("accuracy").is_none());
        assert!(first.get("name").is_none());
        assert_eq!(first["reducedaccuracy"], false);
        assert_eq!(raw[0]["samples"][1]["reducedaccuracy"], true);

        let parsed = from_json(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name(), "Location 1");
        assert_eq!(parsed[1].name(), "Location 2");
        let samples: &[LocationSample] = parsed[0].samples();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].speed, None);
        assert_eq!(samples[0].accuracy, None);
        assert_eq!(samples[1], targets[0].samples()[1]);
        assert_eq!(samples[2].time, targets[0].samples()[2].time);
    }

    #[test]
    fn test_export_now_writes_and_shares() {
        let dir = tempfile::tempdir().unwrap();
        let share = Arc::new(RecordingShare::default());
        let sink = ExportSink::new(dir.path().join("exports"), share.clone());

        let path = sink.export_now(&sampled_targets()).unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("CF_") && name.ends_with(".json"));
        assert_eq!(share.shared.lock().unwrap().as_slice(), &[path.clone()]);

        let restored = load_targets(&path).unwrap();
        assert_eq!(restored[0].samples().len(), 3);
    }

    #[test]
    fn test_share_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ExportSink::new(dir.path().to_path_buf(), Arc::new(FailingShare));
        let err = sink.export_now(&sampled_targets()).unwrap_err();
        assert!(matches!(err, SamplerError::Share(_)));
    }

    #[test]
    fn test_persist_without_runtime_runs_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ExportSink::new(dir.path().to_path_buf(), Arc::new(FailingShare));
        // Share failure is logged, not propagated
        sink.persist(&sampled_targets());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_persist_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let share = Arc::new(RecordingShare::default());
        let mut sink = ExportSink::new(dir.path().to_path_buf(), share.clone());
        sink.persist(&sampled_targets());

        for _ in 0..100 {
            if !share.shared.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(share.shared.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_command_share_parsing() {
        assert!(CommandShare::from_command_line("   ").is_none());
        let share = CommandShare::from_command_line("mail -s locations").unwrap();
        assert_eq!(share.program, "mail");
        assert_eq!(share.args, vec!["-s".to_string(), "locations".to_string()]);
    }

    #[test]
    fn test_invalid_export_is_parse_error() {
        assert!(matches!(from_json("{not json"), Err(SamplerError::Parse(_))));
    }
}
