// src/display/terminal.rs
//! Terminal-based display and key input

use crate::{
    coordinator::SamplingCoordinator,
    error::{Result, SamplerError},
    export::PersistenceSink,
    gps::{
        data::{format_coordinate, PrecisionCategory},
        source::{LocationSource, SamplingMethod},
    },
    sampling::LocationOfInterest,
};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::io::{self, Write};
use tokio::sync::mpsc;

const PROGRESS_WIDTH: usize = 30;

/// User commands read from the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectTarget(usize),
    ClearAll,
    ToggleMethod,
    Quit,
}

/// Map a key press to a command
pub fn command_for_key(code: KeyCode, modifiers: KeyModifiers) -> Option<Command> {
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        KeyCode::Char(ch @ '1'..='9') => ch.to_digit(10).map(|d| Command::SelectTarget(d as usize - 1)),
        KeyCode::Char('c') => Some(Command::ClearAll),
        KeyCode::Char('m') => Some(Command::ToggleMethod),
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        _ => None,
    }
}

/// Read keys on a dedicated thread until `Quit` is sent or the receiver goes away.
pub fn spawn_key_reader() -> mpsc::UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                if let Some(command) = command_for_key(key.code, key.modifiers) {
                    if tx.send(command).is_err() || command == Command::Quit {
                        return;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("Error reading terminal input: {}", e);
                let _ = tx.send(Command::Quit);
                return;
            }
        }
    });
    rx
}

pub struct TerminalDisplay;

impl TerminalDisplay {
    pub fn new() -> Self {
        Self
    }

    /// Switch the terminal into raw, full-screen mode
    pub fn enter(&self) -> Result<()> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), Hide, DisableLineWrap)?;
        Ok(())
    }

    /// Restore the terminal
    pub fn leave(&self) -> Result<()> {
        execute!(io::stdout(), Show, EnableLineWrap, ResetColor)?;
        terminal::disable_raw_mode()?;
        println!("\nShutting down...");
        Ok(())
    }

    pub fn draw<S, P>(&self, coordinator: &SamplingCoordinator<S, P>) -> Result<()>
    where
        S: LocationSource,
        P: PersistenceSink,
    {
        let mut stdout = io::stdout();
        execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        self.render(&mut stdout, coordinator)?;
        stdout.flush().map_err(SamplerError::Io)
    }

    /// Render the coordinator's state
    pub fn render<S, P>(&self, out: &mut impl Write, coordinator: &SamplingCoordinator<S, P>) -> Result<()>
    where
        S: LocationSource,
        P: PersistenceSink,
    {
        // Raw mode needs explicit carriage returns
        execute!(
            out,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\r\n"),
            Print("Location Sampler"),
            Print("\r\n"),
            Print("=".repeat(60)),
            Print("\r\n"),
            ResetColor
        )?;

        let method = match coordinator.sampling_method() {
            SamplingMethod::Listening => "listening",
            SamplingMethod::Polling => "polling",
        };
        let permission = if coordinator.permission_granted() { "granted" } else { "denied" };
        execute!(
            out,
            Print(format!("Method: {}   Permission: {}\r\n\r\n", method, permission))
        )?;

        for (index, target) in coordinator.targets().iter().enumerate() {
            let selected = coordinator.selected_index() == Some(index);
            self.render_target(out, index, target, selected)?;
        }

        if coordinator.show_samples_diagnostics() {
            execute!(
                out,
                SetForegroundColor(Color::Red),
                Print(format!("{}\r\n\r\n", coordinator.samples_diagnostics())),
                ResetColor
            )?;
        }

        let method_hint = if coordinator.can_change_sampling_method() {
            "  m: toggle method"
        } else {
            ""
        };
        execute!(
            out,
            SetForegroundColor(Color::Green),
            Print("=".repeat(60)),
            Print("\r\n"),
            Print(format!("1-9: sample location  c: clear all{}  q: quit\r\n", method_hint)),
            ResetColor
        )?;

        Ok(())
    }

    fn render_target(
        &self,
        out: &mut impl Write,
        index: usize,
        target: &LocationOfInterest,
        selected: bool,
    ) -> Result<()> {
        let marker = if selected { '>' } else { ' ' };
        execute!(
            out,
            SetForegroundColor(Color::Yellow),
            Print(format!("{} [{}] {}\r\n", marker, index + 1, target.name())),
            ResetColor
        )?;

        if target.is_sampling() {
            let filled = (target.sampling_progress() * PROGRESS_WIDTH as f64).round() as usize;
            let filled = filled.min(PROGRESS_WIDTH);
            execute!(
                out,
                SetForegroundColor(Color::Cyan),
                Print(format!(
                    "    SAMPLING [{}{}] {:>3.0}%\r\n",
                    "#".repeat(filled),
                    "-".repeat(PROGRESS_WIDTH - filled),
                    target.sampling_progress() * 100.0
                )),
                ResetColor
            )?;
        }

        match target.selected_reading() {
            Some(location) if target.show_location_details() => {
                execute!(
                    out,
                    Print(format!(
                        "    Lat: {}  Lon: {}\r\n    Time: {}\r\n    ",
                        format_coordinate(location.lat),
                        format_coordinate(location.lon),
                        target.location_timestamp()
                    )),
                    SetForegroundColor(precision_color(target.precision_category())),
                    Print(format!(
                        "{} ({})\r\n",
                        target.diagnostic(),
                        target.precision_category().description()
                    )),
                    ResetColor
                )?;
            }
            _ if !target.is_sampling() => {
                execute!(out, Print("    No location\r\n"))?;
            }
            _ => {}
        }

        execute!(out, Print("\r\n"))?;
        Ok(())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

fn precision_color(category: PrecisionCategory) -> Color {
    match category {
        PrecisionCategory::Good => Color::Green,
        PrecisionCategory::Poor => Color::DarkYellow,
        PrecisionCategory::Bad => Color::Red,
    }
}
