// src/main.rs
//! Location Sampler - samples named locations of interest from a GPS source

use anyhow::{bail, Context};
use clap::Parser;
use location_sampler::{
    config::SamplerConfig,
    display,
    export::load_targets,
    gps::{source::list_serial_ports, SamplingMethod},
    monitor::SamplingMonitor,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "location-sampler")]
#[command(version)]
#[command(about = "Sample GPS readings for locations of interest and keep the most accurate fix", long_about = None)]
struct Args {
    /// Location source: gpsd, serial or replay
    #[arg(short, long)]
    source: Option<String>,

    /// Serial port for NMEA input (implies --source serial)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// gpsd host
    #[arg(long)]
    host: Option<String>,

    /// gpsd port
    #[arg(long)]
    gpsd_port: Option<u16>,

    /// Recorded NMEA or gpsd JSON log to replay (implies --source replay)
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Delay between replayed readings in milliseconds, 0 for none
    #[arg(long, value_name = "MS")]
    replay_interval: Option<u64>,

    /// How readings are obtained
    #[arg(short, long, value_enum)]
    method: Option<SamplingMethod>,

    /// Directory export files are written to
    #[arg(long, value_name = "DIR")]
    export_dir: Option<PathBuf>,

    /// Command run with each export file path appended
    #[arg(long, value_name = "COMMAND")]
    share_command: Option<String>,

    /// Location of interest name (repeatable)
    #[arg(short, long = "target", value_name = "NAME")]
    targets: Vec<String>,

    /// Restore locations of interest from an earlier export
    #[arg(long, value_name = "FILE")]
    restore: Option<PathBuf>,

    /// Sample the given location (1-based) without the terminal UI, then exit
    #[arg(long, value_name = "N")]
    headless: Option<usize>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Persist the effective settings as the new defaults
    #[arg(long)]
    save_config: bool,

    /// Write log output to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut SamplerConfig) {
        if let Some(ref source) = self.source {
            config.update_source(source);
        }
        if let Some(ref port) = self.port {
            let baud = self.baud.or(config.serial_baudrate).unwrap_or(9600);
            config.update_serial(port.clone(), baud);
        } else if let Some(baud) = self.baud {
            config.serial_baudrate = Some(baud);
        }
        if self.host.is_some() || self.gpsd_port.is_some() {
            let host = self
                .host
                .clone()
                .or_else(|| config.gpsd_host.clone())
                .unwrap_or_else(|| "localhost".to_string());
            let port = self.gpsd_port.or(config.gpsd_port).unwrap_or(2947);
            config.update_gpsd(host, port);
        }
        if let Some(ref path) = self.replay {
            config.update_replay(path.clone());
        }
        if let Some(ms) = self.replay_interval {
            config.replay_interval_ms = if ms == 0 { None } else { Some(ms) };
        }
        if let Some(method) = self.method {
            config.sampling_method = method;
        }
        if let Some(ref dir) = self.export_dir {
            config.export_dir = Some(dir.clone());
        }
        if let Some(ref command) = self.share_command {
            config.share_command = Some(command.clone());
        }
        if !self.targets.is_empty() {
            config.targets = self.targets.clone();
        }
    }
}

fn init_logging(log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    // RUST_LOG overrides the default level
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(log::LevelFilter::Warn);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref())?;

    if args.list_ports {
        let ports = list_serial_ports()?;
        if ports.is_empty() {
            println!("No serial ports found");
        } else {
            println!("Available serial ports:");
            for port in ports {
                println!("  {}", port);
            }
        }
        return Ok(());
    }

    let mut config = SamplerConfig::load().unwrap_or_else(|e| {
        log::warn!("{}; using defaults", e);
        SamplerConfig::default()
    });
    args.apply(&mut config);

    if args.save_config {
        config.save().context("Failed to save configuration")?;
        println!("Configuration saved");
    }

    let restored = match args.restore {
        Some(ref path) => Some(
            load_targets(path).with_context(|| format!("Failed to restore {}", path.display()))?,
        ),
        None => None,
    };

    log::info!("Using {} source", config.source_type);
    let mut monitor = SamplingMonitor::new(&config, restored)?;

    match args.headless {
        Some(0) => bail!("Locations are numbered from 1"),
        Some(n) => monitor.run_headless(n - 1).await?,
        None => {
            if !display::is_interactive() {
                bail!("Standard output is not a terminal; use --headless N to sample without the UI");
            }
            monitor.run_interactive().await?;
        }
    }

    Ok(())
}
