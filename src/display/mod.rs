// src/display/mod.rs
//! Display modules for different interfaces

pub mod terminal;

pub use terminal::{Command, TerminalDisplay};

/// Whether stdout is an interactive terminal
pub fn is_interactive() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal()
}
