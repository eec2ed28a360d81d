// src/gps/source.rs
//! Location sources: permission checks and async reading feeds
//!
//! Every source turns a line-oriented byte stream (gpsd socket, serial port,
//! replay file) into [`SourceEvent`]s delivered over an unbounded channel.
//! Stopping a source aborts its feed task, after which the receiver yields
//! nothing more.

use super::{
    data::RawReading,
    gpsd,
    nmea::{self, NmeaDecoder},
};
use crate::error::{Result, SamplerError};
use serde::{Deserialize, Serialize};
use std::{future::Future, path::PathBuf, time::Duration};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_serial::SerialPortBuilderExt;

/// How readings are pulled from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum SamplingMethod {
    /// Forward every fix the device reports
    #[default]
    Listening,
    /// Ask for the current fix on a fixed interval
    Polling,
}

impl SamplingMethod {
    pub fn toggled(self) -> Self {
        match self {
            SamplingMethod::Listening => SamplingMethod::Polling,
            SamplingMethod::Polling => SamplingMethod::Listening,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Reading(RawReading),
    ListeningFailed(String),
}

/// Capability the coordinator samples from
pub trait LocationSource {
    fn check_permission(&mut self) -> PermissionStatus;

    fn request_permission(&mut self) -> PermissionStatus {
        self.check_permission()
    }

    /// Begin delivering readings. Any previous feed is stopped first.
    fn start(&mut self, method: SamplingMethod) -> Result<mpsc::UnboundedReceiver<SourceEvent>>;

    /// Stop delivering readings. Safe to call when already stopped.
    fn stop(&mut self);
}

impl<T: LocationSource + ?Sized> LocationSource for Box<T> {
    fn check_permission(&mut self) -> PermissionStatus {
        (**self).check_permission()
    }

    fn request_permission(&mut self) -> PermissionStatus {
        (**self).request_permission()
    }

    fn start(&mut self, method: SamplingMethod) -> Result<mpsc::UnboundedReceiver<SourceEvent>> {
        (**self).start(method)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Polling cadence and per-request timeout
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(800),
        }
    }
}

/// Turns raw lines into readings
#[derive(Debug)]
pub enum LineDecoder {
    Nmea(NmeaDecoder),
    Gpsd,
    /// Per-line detection, used for replay files
    Auto(NmeaDecoder),
}

impl LineDecoder {
    pub fn decode(&mut self, line: &str) -> Result<Option<RawReading>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        match self {
            LineDecoder::Nmea(decoder) => Ok(decoder.feed(line)),
            LineDecoder::Gpsd => gpsd::parse_gpsd_json(line),
            LineDecoder::Auto(decoder) => {
                if nmea::is_nmea(line) {
                    Ok(decoder.feed(line))
                } else if line.starts_with('{') {
                    gpsd::parse_gpsd_json(line)
                } else {
                    Ok(None)
                }
            }
        }
    }

    pub fn finish(&mut self) -> Option<RawReading> {
        match self {
            LineDecoder::Nmea(decoder) | LineDecoder::Auto(decoder) => decoder.finish(),
            LineDecoder::Gpsd => None,
        }
    }
}

/// Options shared by every feed
#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    pub method: SamplingMethod,
    pub poll: PollSettings,
    /// Delay after each decoded reading; replay files use it to mimic a live device
    pub pace: Option<Duration>,
}

impl FeedOptions {
    pub fn new(method: SamplingMethod) -> Self {
        Self {
            method,
            poll: PollSettings::default(),
            pace: None,
        }
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn a feed task over the stream produced by `connect`.
pub fn spawn_feed<F, R>(
    connect: F,
    decoder: LineDecoder,
    options: FeedOptions,
) -> (JoinHandle<()>, mpsc::UnboundedReceiver<SourceEvent>)
where
    F: Future<Output = Result<R>> + Send + 'static,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let reader = match connect.await {
            Ok(reader) => reader,
            Err(e) => {
                log::error!("Error starting location sampling: {}", e);
                let _ = tx.send(SourceEvent::ListeningFailed(e.to_string()));
                return;
            }
        };

        match options.method {
            SamplingMethod::Listening => listen(reader, decoder, options.pace, tx).await,
            SamplingMethod::Polling => poll(reader, decoder, options, tx).await,
        }
    });

    (handle, rx)
}

/// Line reader that replaces bytes which are not UTF-8 instead of failing.
/// Serial ports often emit a burst of noise right after opening.
struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LossyLines<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

async fn listen<R>(
    reader: R,
    mut decoder: LineDecoder,
    pace: Option<Duration>,
    tx: mpsc::UnboundedSender<SourceEvent>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = LossyLines::new(reader);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match decoder.decode(&line) {
                Ok(Some(reading)) => {
                    if tx.send(SourceEvent::Reading(reading)).is_err() {
                        return;
                    }
                    if let Some(delay) = pace {
                        tokio::time::sleep(delay).await;
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("Skipping undecodable line: {}", e),
            },
            Ok(None) => {
                if let Some(reading) = decoder.finish() {
                    let _ = tx.send(SourceEvent::Reading(reading));
                }
                log::info!("Location stream ended");
                return;
            }
            Err(e) => {
                let _ = tx.send(SourceEvent::ListeningFailed(format!("read error: {}", e)));
                return;
            }
        }
    }
}

async fn poll<R>(
    reader: R,
    mut decoder: LineDecoder,
    options: FeedOptions,
    tx: mpsc::UnboundedSender<SourceEvent>,
) where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (latest_tx, mut latest_rx) = watch::channel::<Option<RawReading>>(None);
    let pace = options.pace;

    // Keeps the most recent fix; aborted together with this task
    let _producer = AbortOnDrop(tokio::spawn(async move {
        let mut lines = LossyLines::new(reader);
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match decoder.decode(&line) {
                    Ok(Some(reading)) => {
                        latest_tx.send_replace(Some(reading));
                        if let Some(delay) = pace {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Skipping undecodable line: {}", e),
                },
                Ok(None) => {
                    if let Some(reading) = decoder.finish() {
                        latest_tx.send_replace(Some(reading));
                    }
                    return;
                }
                Err(e) => {
                    log::error!("Error reading location stream: {}", e);
                    return;
                }
            }
        }
    }));

    let mut ticker = tokio::time::interval(options.poll.interval);
    loop {
        ticker.tick().await;
        let event = match tokio::time::timeout(options.poll.timeout, latest_rx.changed()).await {
            Ok(Ok(())) => {
                let latest = latest_rx.borrow_and_update().clone();
                match latest {
                    Some(reading) => SourceEvent::Reading(reading),
                    None => continue,
                }
            }
            Ok(Err(_)) => {
                let _ = tx.send(SourceEvent::ListeningFailed("location stream ended".to_string()));
                return;
            }
            Err(_) => SourceEvent::ListeningFailed(format!(
                "no location within {} ms",
                options.poll.timeout.as_millis()
            )),
        };
        if tx.send(event).is_err() {
            return;
        }
    }
}

/// Owns at most one running feed task
#[derive(Debug, Default)]
struct FeedTask {
    handle: Option<JoinHandle<()>>,
}

impl FeedTask {
    fn replace(&mut self, handle: JoinHandle<()>) {
        self.stop();
        self.handle = Some(handle);
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for FeedTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Readings from a gpsd daemon
#[derive(Debug)]
pub struct GpsdSource {
    host: String,
    port: u16,
    poll: PollSettings,
    task: FeedTask,
}

impl GpsdSource {
    pub fn new(host: String, port: u16, poll: PollSettings) -> Self {
        Self {
            host,
            port,
            poll,
            task: FeedTask::default(),
        }
    }
}

impl LocationSource for GpsdSource {
    fn check_permission(&mut self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn start(&mut self, method: SamplingMethod) -> Result<mpsc::UnboundedReceiver<SourceEvent>> {
        log::info!("Connecting to gpsd at {}:{}...", self.host, self.port);
        let (host, port) = (self.host.clone(), self.port);
        let options = FeedOptions {
            poll: self.poll,
            ..FeedOptions::new(method)
        };
        let (handle, rx) = spawn_feed(
            async move { gpsd::connect_gpsd(&host, port).await },
            LineDecoder::Gpsd,
            options,
        );
        self.task.replace(handle);
        Ok(rx)
    }

    fn stop(&mut self) {
        self.task.stop();
    }
}

/// Readings from an NMEA receiver on a serial port
#[derive(Debug)]
pub struct SerialSource {
    port: String,
    baudrate: u32,
    poll: PollSettings,
    task: FeedTask,
}

impl SerialSource {
    pub fn new(port: String, baudrate: u32, poll: PollSettings) -> Self {
        Self {
            port,
            baudrate,
            poll,
            task: FeedTask::default(),
        }
    }
}

impl LocationSource for SerialSource {
    /// The port has to be present before sampling may start.
    fn check_permission(&mut self) -> PermissionStatus {
        match list_serial_ports() {
            Ok(ports) if ports.iter().any(|p| p == &self.port) => PermissionStatus::Granted,
            Ok(_) => {
                log::warn!("Serial port {} is not available", self.port);
                PermissionStatus::Denied
            }
            Err(e) => {
                log::error!("Error requesting location permission: {}", e);
                PermissionStatus::Denied
            }
        }
    }

    fn start(&mut self, method: SamplingMethod) -> Result<mpsc::UnboundedReceiver<SourceEvent>> {
        log::info!("Connecting to GPS on {} at {} baud...", self.port, self.baudrate);
        let (port, baudrate) = (self.port.clone(), self.baudrate);
        let options = FeedOptions {
            poll: self.poll,
            ..FeedOptions::new(method)
        };
        let (handle, rx) = spawn_feed(
            async move {
                let serial = tokio_serial::new(&port, baudrate)
                    .timeout(Duration::from_millis(1000))
                    .open_native_async()
                    .map_err(|e| SamplerError::Connection(format!("Failed to open serial port {}: {}", port, e)))?;
                Ok::<_, SamplerError>(BufReader::new(serial))
            },
            LineDecoder::Nmea(NmeaDecoder::new()),
            options,
        );
        self.task.replace(handle);
        Ok(rx)
    }

    fn stop(&mut self) {
        self.task.stop();
    }
}

/// Readings replayed from a recorded NMEA or gpsd JSON log
#[derive(Debug)]
pub struct ReplaySource {
    path: PathBuf,
    poll: PollSettings,
    pace: Option<Duration>,
    task: FeedTask,
}

impl ReplaySource {
    pub fn new(path: PathBuf, poll: PollSettings, pace: Option<Duration>) -> Self {
        Self {
            path,
            poll,
            pace,
            task: FeedTask::default(),
        }
    }
}

impl LocationSource for ReplaySource {
    fn check_permission(&mut self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn start(&mut self, method: SamplingMethod) -> Result<mpsc::UnboundedReceiver<SourceEvent>> {
        log::info!("Replaying locations from {}", self.path.display());
        let path = self.path.clone();
        let options = FeedOptions {
            method,
            poll: self.poll,
            pace: self.pace,
        };
        let (handle, rx) = spawn_feed(
            async move {
                let file = tokio::fs::File::open(&path).await?;
                Ok::<_, SamplerError>(BufReader::new(file))
            },
            LineDecoder::Auto(NmeaDecoder::new()),
            options,
        );
        self.task.replace(handle);
        Ok(rx)
    }

    fn stop(&mut self) {
        self.task.stop();
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| SamplerError::Other(format!("Failed to list serial ports: {}", e)))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::AsyncWriteExt;

    const GPSD_LOG: &str = concat!(
        r#"{"class":"VERSION","release":"3.25"}"#,
        "\n",
        r#"{"class":"TPV","mode":3,"time":"2024-05-01T12:00:00Z","lat":1.0,"lon":2.0,"eph":3.0}"#,
        "\n",
        "garbage line\n",
        r#"{"class":"TPV","mode":3,"time":"2024-05-01T12:00:01Z","lat":1.1,"lon":2.1,"eph":2.0}"#,
        "\n",
    );

    fn static_reader(data: &'static str) -> impl Future<Output = Result<BufReader<&'static [u8]>>> {
        async move { Ok(BufReader::new(data.as_bytes())) }
    }

    #[test]
    fn test_auto_decoder_detects_line_kind() {
        let mut decoder = LineDecoder::Auto(NmeaDecoder::new());
        assert!(decoder.decode("").unwrap().is_none());
        assert!(decoder.decode("not a location").unwrap().is_none());
        let tpv = r#"{"class":"TPV","mode":2,"time":"2024-05-01T12:00:00Z","lat":1.0,"lon":2.0}"#;
        assert!(decoder.decode(tpv).unwrap().is_some());
    }

    #[test]
    fn test_method_toggle() {
        assert_eq!(SamplingMethod::Listening.toggled(), SamplingMethod::Polling);
        assert_eq!(SamplingMethod::Polling.toggled(), SamplingMethod::Listening);
    }

    #[tokio::test]
    async fn test_listening_forwards_every_reading() {
        let (_handle, mut rx) = spawn_feed(
            static_reader(GPSD_LOG),
            LineDecoder::Auto(NmeaDecoder::new()),
            FeedOptions::new(SamplingMethod::Listening),
        );

        let mut readings = Vec::new();
        while let Some(event) = rx.recv().await {
            if let SourceEvent::Reading(reading) = event {
                readings.push(reading);
            }
        }
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].accuracy, Some(3.0));
        assert_eq!(readings[1].latitude, 1.1);
    }

    #[tokio::test]
    async fn test_polling_reports_end_of_stream() {
        let options = FeedOptions {
            poll: PollSettings {
                interval: Duration::from_millis(10),
                timeout: Duration::from_millis(50),
            },
            ..FeedOptions::new(SamplingMethod::Polling)
        };
        let (_handle, mut rx) = spawn_feed(static_reader(GPSD_LOG), LineDecoder::Gpsd, options);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, SourceEvent::Reading(_)));

        let mut saw_failure = false;
        while let Some(event) = rx.recv().await {
            if let SourceEvent::ListeningFailed(_) = event {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_listening_survives_line_that_is_not_utf8() {
        const NOISY: &[u8] = b"\xff\xfe garbage\n{\"class\":\"TPV\",\"mode\":3,\"time\":\"2024-05-01T12:00:00Z\",\"lat\":1.0,\"lon\":2.0,\"eph\":3.0}\n";
        let (_handle, mut rx) = spawn_feed(
            async { Ok::<_, SamplerError>(BufReader::new(NOISY)) },
            LineDecoder::Gpsd,
            FeedOptions::new(SamplingMethod::Listening),
        );

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
        match &events[0] {
            SourceEvent::Reading(reading) => assert_eq!(reading.accuracy, Some(3.0)),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_polling_timeout_keeps_polling() {
        let (device, mut writer) = tokio::io::duplex(1024);
        let options = FeedOptions {
            poll: PollSettings {
                interval: Duration::from_millis(40),
                timeout: Duration::from_millis(20),
            },
            ..FeedOptions::new(SamplingMethod::Polling)
        };
        let (_handle, mut rx) = spawn_feed(
            async { Ok::<_, SamplerError>(BufReader::new(device)) },
            LineDecoder::Gpsd,
            options,
        );

        match rx.recv().await {
            Some(SourceEvent::ListeningFailed(msg)) => assert_eq!(msg, "no location within 20 ms"),
            other => panic!("unexpected event: {:?}", other),
        }

        writer
            .write_all(b"{\"class\":\"TPV\",\"mode\":3,\"time\":\"2024-05-01T12:00:00Z\",\"lat\":1.0,\"lon\":2.0,\"eph\":3.0}\n")
            .await
            .unwrap();

        let reading = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(SourceEvent::Reading(reading)) => return reading,
                    Some(SourceEvent::ListeningFailed(_)) => continue,
                    None => panic!("feed ended while the device was still open"),
                }
            }
        })
        .await
        .expect("fix should arrive after a timed-out poll");
        assert_eq!(reading.latitude, 1.0);
        drop(writer);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported_as_listening_failure() {
        let (_handle, mut rx) = spawn_feed(
            async { Err::<BufReader<&'static [u8]>, _>(SamplerError::Connection("refused".to_string())) },
            LineDecoder::Gpsd,
            FeedOptions::new(SamplingMethod::Listening),
        );
        match rx.recv().await {
            Some(SourceEvent::ListeningFailed(msg)) => assert!(msg.contains("refused")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replay_source_reads_file_and_stops() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GPSD_LOG.as_bytes()).unwrap();

        let mut source = ReplaySource::new(file.path().to_path_buf(), PollSettings::default(), None);
        assert_eq!(source.check_permission(), PermissionStatus::Granted);

        let mut rx = source.start(SamplingMethod::Listening).unwrap();
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, SourceEvent::Reading(_)));

        source.stop();
        source.stop();
    }
}
