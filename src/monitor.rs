// src/monitor.rs
//! Wires a location source, the coordinator and the terminal together

use crate::{
    config::SamplerConfig,
    coordinator::SamplingCoordinator,
    display::{terminal, Command, TerminalDisplay},
    error::{Result, SamplerError},
    export::{CommandShare, ExportSink, LogShare, ShareHandler},
    gps::source::{GpsdSource, LocationSource, ReplaySource, SerialSource},
    sampling::{LocationOfInterest, ReadingOutcome},
};
use std::{sync::Arc, time::Duration};

pub type BoxedSource = Box<dyn LocationSource + Send>;
pub type HostCoordinator = SamplingCoordinator<BoxedSource, ExportSink>;

/// Build the location source named by `config.source_type`
pub fn build_source(config: &SamplerConfig) -> Result<BoxedSource> {
    let poll = config.poll_settings();
    match config.source_type.as_str() {
        "gpsd" => {
            let host = config.gpsd_host.clone().unwrap_or_else(|| "localhost".to_string());
            let port = config.gpsd_port.unwrap_or(2947);
            Ok(Box::new(GpsdSource::new(host, port, poll)))
        }
        "serial" => {
            let port = config
                .serial_port
                .clone()
                .ok_or_else(|| SamplerError::Config("Serial source requires a port".to_string()))?;
            let baudrate = config.serial_baudrate.unwrap_or(9600);
            Ok(Box::new(SerialSource::new(port, baudrate, poll)))
        }
        "replay" => {
            let path = config
                .replay_path
                .clone()
                .ok_or_else(|| SamplerError::Config("Replay source requires a file".to_string()))?;
            let pace = config.replay_interval_ms.map(Duration::from_millis);
            Ok(Box::new(ReplaySource::new(path, poll, pace)))
        }
        other => Err(SamplerError::Config(format!("Unknown source type: {}", other))),
    }
}

/// Build the export sink for completed batches
pub fn build_sink(config: &SamplerConfig) -> Result<ExportSink> {
    let share: Arc<dyn ShareHandler> = match config.share_command.as_deref().and_then(CommandShare::from_command_line) {
        Some(command) => Arc::new(command),
        None => Arc::new(LogShare),
    };
    Ok(ExportSink::new(config.resolved_export_dir()?, share))
}

/// Host application around a [`SamplingCoordinator`]
pub struct SamplingMonitor {
    coordinator: HostCoordinator,
}

impl SamplingMonitor {
    /// Create a monitor. `restored` replaces the configured target names
    /// when an earlier export is loaded.
    pub fn new(config: &SamplerConfig, restored: Option<Vec<LocationOfInterest>>) -> Result<Self> {
        let source = build_source(config)?;
        let sink = build_sink(config)?;
        let method = config.sampling_method;

        let coordinator = match restored {
            Some(targets) => SamplingCoordinator::new(targets, source, sink, method),
            None => SamplingCoordinator::with_target_names(config.targets.iter().cloned(), source, sink, method),
        };
        if coordinator.targets().is_empty() {
            return Err(SamplerError::Config("No locations of interest configured".to_string()));
        }

        Ok(Self { coordinator })
    }

    pub fn coordinator(&self) -> &HostCoordinator {
        &self.coordinator
    }

    /// Full-screen interactive session
    pub async fn run_interactive(&mut self) -> Result<()> {
        let display = TerminalDisplay::new();
        let mut commands = terminal::spawn_key_reader();
        let mut redraw = tokio::time::interval(Duration::from_millis(250));

        self.coordinator.on_appear();
        display.enter()?;

        let result = loop {
            tokio::select! {
                Some(command) = commands.recv() => {
                    if !self.apply(command) {
                        break Ok(());
                    }
                }
                event = self.coordinator.next_event() => {
                    self.coordinator.handle_event(event);
                }
                _ = redraw.tick() => {
                    if let Err(e) = display.draw(&self.coordinator) {
                        break Err(e);
                    }
                }
            }
        };

        self.coordinator.on_disappear();
        display.leave()?;
        result
    }

    /// Sample one target until its batch completes, without a UI
    pub async fn run_headless(&mut self, index: usize) -> Result<()> {
        self.coordinator.on_appear();
        self.coordinator.select_target(index)?;

        let name = self.coordinator.targets()[index].name().to_string();
        println!("Sampling '{}'... press Ctrl+C to abort", name);

        loop {
            tokio::select! {
                event = self.coordinator.recv_event() => {
                    let event = match event {
                        Some(event) => event,
                        None => {
                            let reason = self.coordinator.samples_diagnostics().to_string();
                            self.coordinator.on_disappear();
                            return Err(SamplerError::ListeningFailure(if reason.is_empty() {
                                "location feed ended before the batch completed".to_string()
                            } else {
                                reason
                            }));
                        }
                    };
                    if self.coordinator.handle_event(event) == ReadingOutcome::Completed {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    self.coordinator.on_disappear();
                    println!("Sampling aborted");
                    return Ok(());
                }
            }
        }

        let target = &self.coordinator.targets()[index];
        if let Some(location) = target.selected_reading() {
            println!(
                "{}: {:.6}, {:.6} at {} ({})",
                target.name(),
                location.lat,
                location.lon,
                target.location_timestamp(),
                target.diagnostic()
            );
        }
        Ok(())
    }

    /// Returns false when the session should end
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::SelectTarget(index) => {
                if index < self.coordinator.targets().len() {
                    if let Err(e) = self.coordinator.select_target(index) {
                        log::warn!("Cannot sample location {}: {}", index + 1, e);
                    }
                }
            }
            Command::ClearAll => self.coordinator.clear_all(),
            Command::ToggleMethod => {
                let next = self.coordinator.sampling_method().toggled();
                self.coordinator.set_sampling_method(next);
            }
            Command::Quit => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_build_source_validates_config() {
        let mut config = SamplerConfig::default();
        assert!(build_source(&config).is_ok());

        config.source_type = "serial".to_string();
        config.serial_port = None;
        assert!(matches!(build_source(&config), Err(SamplerError::Config(_))));

        config.source_type = "carrier-pigeon".to_string();
        assert!(build_source(&config).is_err());
    }

    #[test]
    fn test_monitor_uses_restored_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SamplerConfig::default();
        config.export_dir = Some(dir.path().to_path_buf());

        let restored = vec![LocationOfInterest::new("Windward")];
        let monitor = SamplingMonitor::new(&config, Some(restored)).unwrap();
        assert_eq!(monitor.coordinator().targets().len(), 1);
        assert_eq!(monitor.coordinator().targets()[0].name(), "Windward");

        assert!(SamplingMonitor::new(&config, Some(Vec::new())).is_err());
    }

    #[tokio::test]
    async fn test_headless_replay_completes_batch() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("drive.jsonl");
        let mut log = std::fs::File::create(&log_path).unwrap();
        for i in 0..40 {
            // Every fifth line repeats the previous timestamp
            let second = if i % 5 == 4 { i - 1 } else { i };
            writeln!(
                log,
                r#"{{"class":"TPV","mode":3,"time":"2024-05-01T12:00:{:02}Z","lat":48.1,"lon":11.5,"eph":{}}}"#,
                second,
                3.0 + (i % 7) as f64
            )
            .unwrap();
        }
        drop(log);

        let mut config = SamplerConfig::default();
        config.update_replay(log_path);
        config.replay_interval_ms = None;
        config.export_dir = Some(dir.path().join("exports"));
        config.targets = vec!["Mark".to_string()];

        let mut monitor = SamplingMonitor::new(&config, None).unwrap();
        monitor.run_headless(0).await.unwrap();

        let target = &monitor.coordinator().targets()[0];
        assert_eq!(target.samples().len(), 30);
        assert_eq!(target.selected_reading().unwrap().accuracy, Some(3.0));
    }

    #[tokio::test]
    async fn test_headless_reports_short_feed() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("short.jsonl");
        std::fs::write(
            &log_path,
            r#"{"class":"TPV","mode":3,"time":"2024-05-01T12:00:00Z","lat":48.1,"lon":11.5,"eph":4.0}"#,
        )
        .unwrap();

        let mut config = SamplerConfig::default();
        config.update_replay(log_path);
        config.replay_interval_ms = None;
        config.export_dir = Some(dir.path().join("exports"));

        let mut monitor = SamplingMonitor::new(&config, None).unwrap();
        let result = monitor.run_headless(0).await;
        assert!(matches!(result, Err(SamplerError::ListeningFailure(_))));
        assert!(!monitor.coordinator().is_sampling());
        assert_eq!(monitor.coordinator().targets()[0].samples().len(), 1);
    }
}
