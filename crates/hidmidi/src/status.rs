//! Live status line
//!
//! A single line, overwritten in place, showing the mapped control and its
//! current state. It is a projection of the runtime state and never feeds
//! back into it.

use crate::config::MappingConfig;
use crossterm::cursor::{Hide, MoveToColumn, Show};
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use std::io::{self, Stdout, Write};

/// Width of the status line in columns
pub const DISPLAY_WIDTH: usize = 80;

/// Width of the axis bar
pub const BAR_WIDTH: usize = 30;

/// Width of the control name field
pub const NAME_WIDTH: usize = 20;

/// Percentage (0-100) of `value` within the display range of the control.
///
/// The calibrated range is used once calibration is done, otherwise the
/// logical range reported by the hardware.
pub fn display_percentage(config: &MappingConfig, value: i64) -> f64 {
    let (min, max) = if config.calibration_done {
        (config.calibration_min_hid, config.calibration_max_hid)
    } else {
        (config.control.logical_min, config.control.logical_max)
    };

    if max > min {
        let clamped = value.clamp(min, max);
        (clamped - min) as f64 * 100.0 / (max - min) as f64
    } else if value >= max {
        100.0
    } else {
        0.0
    }
}

/// Render the status line for `value`, padded or cut to [`DISPLAY_WIDTH`]
pub fn format_status_line(config: &MappingConfig, value: i64) -> String {
    let name: String = config.control.name.chars().take(NAME_WIDTH).collect();
    let mut line = format!("[{:<width$}] ", name, width = NAME_WIDTH);

    if config.control.is_button() {
        line.push_str(if value != 0 {
            "[ ### ON ### ]"
        } else {
            "[ --- OFF -- ]"
        });
    } else {
        let percentage = display_percentage(config, value);
        let filled = ((percentage / 100.0) * BAR_WIDTH as f64 + 0.5) as usize;
        let filled = filled.min(BAR_WIDTH);
        line.push('|');
        line.push_str(&"#".repeat(filled));
        line.push_str(&"-".repeat(BAR_WIDTH - filled));
        line.push_str(&format!("| {:>5.1}% (Raw:{:>6})", percentage, value));
    }

    let len = line.chars().count();
    if len < DISPLAY_WIDTH {
        line.push_str(&" ".repeat(DISPLAY_WIDTH - len));
    } else if len > DISPLAY_WIDTH {
        line = line.chars().take(DISPLAY_WIDTH).collect();
    }
    line
}

/// Where status lines go
pub trait StatusSink {
    /// Replace the displayed status line
    fn update(&mut self, line: &str);
}

/// Status sink that discards everything
pub struct NoStatus;

impl StatusSink for NoStatus {
    fn update(&mut self, _line: &str) {}
}

/// Terminal status line. The cursor is hidden while this exists.
pub struct ConsoleStatus {
    out: Stdout,
}

impl ConsoleStatus {
    /// Take over the current terminal line
    pub fn new() -> io::Result<Self> {
        let mut out = io::stdout();
        execute!(out, Hide)?;
        Ok(Self { out })
    }
}

impl StatusSink for ConsoleStatus {
    fn update(&mut self, line: &str) {
        let result = queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(line)
        )
        .and_then(|_| self.out.flush());
        if let Err(e) = result {
            log::debug!("Status line update failed: {}", e);
        }
    }
}

impl Drop for ConsoleStatus {
    fn drop(&mut self) {
        let _ = execute!(self.out, Print("\n"), Show);
    }
}
