//! Mapping configuration
//!
//! A mapping is stored as a flat JSON record in a file ending in
//! `.hidmidi.json`. Configuration files are looked up in:
//! - the directory given with `--dir`
//! - otherwise the platform config directory (`~/.config/hidmidi` on Linux)
//! - otherwise the current directory

use crate::control::ControlDescriptor;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension for mapping configurations
pub const CONFIG_EXTENSION: &str = ".hidmidi.json";

/// Default minimum interval between MIDI sends, in milliseconds
pub const DEFAULT_MIDI_SEND_INTERVAL_MS: u64 = 1;

/// Default Note On velocity
pub const DEFAULT_NOTE_ON_VELOCITY: u8 = 64;

/// Default CC value sent when a button is pressed
pub const DEFAULT_CC_ON: u8 = 127;

/// Default CC value sent when a button is released
pub const DEFAULT_CC_OFF: u8 = 0;

/// Kind of MIDI message a control is mapped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Note On on press, Note Off on release (buttons only)
    #[serde(rename = "NoteOnOff")]
    NoteOnOff,
    /// Control change
    #[serde(rename = "CC")]
    ControlChange,
}

/// The complete mapping of one control to one MIDI destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    /// Device node used to find the device again
    pub hid_device_path: String,
    /// Device display name
    #[serde(default)]
    pub hid_device_name: String,
    /// The mapped control
    pub control: ControlDescriptor,
    /// Name of the MIDI output port
    pub midi_device_name: String,
    /// Message kind, `null` in JSON when no mapping is active
    #[serde(default)]
    pub midi_message_type: Option<MessageKind>,
    /// MIDI channel (0-15)
    #[serde(default)]
    pub midi_channel: u8,
    /// Note number or controller number (0-127)
    #[serde(default, rename = "midiNoteOrCCNumber")]
    pub midi_note_or_cc_number: u8,
    /// Note On velocity (1-127)
    #[serde(default = "default_velocity")]
    pub midi_value_note_on_velocity: u8,
    /// CC value when the button is pressed (0-127)
    #[serde(default = "default_cc_on", rename = "midiValueCCOn")]
    pub midi_value_cc_on: u8,
    /// CC value when the button is released (0-127)
    #[serde(default = "default_cc_off", rename = "midiValueCCOff")]
    pub midi_value_cc_off: u8,
    /// Captured minimum raw value
    #[serde(default)]
    pub calibration_min_hid: i64,
    /// Captured maximum raw value
    #[serde(default)]
    pub calibration_max_hid: i64,
    /// Whether calibration has completed for this axis
    #[serde(default)]
    pub calibration_done: bool,
    /// Invert the axis output (min -> 127, max -> 0)
    #[serde(default)]
    pub reverse_axis: bool,
    /// Minimum interval between MIDI sends in milliseconds (>= 1)
    #[serde(
        default = "default_interval",
        deserialize_with = "deserialize_interval"
    )]
    pub midi_send_interval_ms: u64,
}

fn default_velocity() -> u8 {
    DEFAULT_NOTE_ON_VELOCITY
}

fn default_cc_on() -> u8 {
    DEFAULT_CC_ON
}

fn default_cc_off() -> u8 {
    DEFAULT_CC_OFF
}

fn default_interval() -> u64 {
    DEFAULT_MIDI_SEND_INTERVAL_MS
}

fn deserialize_interval<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    if raw <= 0 {
        log::warn!(
            "Loaded MIDI send interval ({}ms) is invalid, resetting to {}ms",
            raw,
            DEFAULT_MIDI_SEND_INTERVAL_MS
        );
        Ok(DEFAULT_MIDI_SEND_INTERVAL_MS)
    } else {
        Ok(raw as u64)
    }
}

impl MappingConfig {
    /// Create an inactive mapping for a device, control and port
    pub fn new(
        device_path: impl Into<String>,
        device_name: impl Into<String>,
        control: ControlDescriptor,
        midi_port: impl Into<String>,
    ) -> Self {
        Self {
            hid_device_path: device_path.into(),
            hid_device_name: device_name.into(),
            control,
            midi_device_name: midi_port.into(),
            midi_message_type: None,
            midi_channel: 0,
            midi_note_or_cc_number: 0,
            midi_value_note_on_velocity: DEFAULT_NOTE_ON_VELOCITY,
            midi_value_cc_on: DEFAULT_CC_ON,
            midi_value_cc_off: DEFAULT_CC_OFF,
            calibration_min_hid: 0,
            calibration_max_hid: 0,
            calibration_done: false,
            reverse_axis: false,
            midi_send_interval_ms: DEFAULT_MIDI_SEND_INTERVAL_MS,
        }
    }

    /// Whether a message kind has been chosen
    pub fn is_active(&self) -> bool {
        self.midi_message_type.is_some()
    }

    /// Send interval, never below one millisecond
    pub fn send_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.midi_send_interval_ms.max(1))
    }

    /// Store calibration bounds and mark calibration done
    pub fn set_calibration(&mut self, min: i64, max: i64) {
        self.calibration_min_hid = min;
        self.calibration_max_hid = max;
        self.calibration_done = true;
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save to `path`, appending the config extension when missing.
    /// Returns the path actually written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = with_extension(path.as_ref());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(path)
    }

    /// One-paragraph description of the mapping for display before monitoring
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Device:    {} ({})", self.hid_device_name, self.hid_device_path);
        let _ = writeln!(out, "Control:   {}", self.control);
        let _ = writeln!(out, "MIDI Port: {}", self.midi_device_name);
        let channel = self.midi_channel + 1;
        let number = self.midi_note_or_cc_number;
        let mapping = match self.midi_message_type {
            None => "None".to_string(),
            Some(MessageKind::NoteOnOff) => format!(
                "Note On/Off (Ch: {}, Note: {}, Vel: {})",
                channel, number, self.midi_value_note_on_velocity
            ),
            Some(MessageKind::ControlChange) if self.control.is_button() => format!(
                "CC Button (Ch: {}, CC: {}, OnVal: {}, OffVal: {})",
                channel, number, self.midi_value_cc_on, self.midi_value_cc_off
            ),
            Some(MessageKind::ControlChange) if self.calibration_done => format!(
                "CC Axis (Ch: {}, CC: {}, Range: {}-{} -> {})",
                channel,
                number,
                self.calibration_min_hid,
                self.calibration_max_hid,
                if self.reverse_axis { "127-0 [Reversed]" } else { "0-127" }
            ),
            Some(MessageKind::ControlChange) => format!(
                "CC Axis (Ch: {}, CC: {}, UNCALIBRATED - no output until calibrated)",
                channel, number
            ),
        };
        let _ = writeln!(out, "Mapping:   {}", mapping);
        let _ = write!(out, "MIDI Send Interval: {}ms", self.midi_send_interval_ms);
        out
    }
}

/// Append the config extension to `path` if it does not already end with it
pub fn with_extension(path: &Path) -> PathBuf {
    let as_str = path.to_string_lossy();
    if as_str.ends_with(CONFIG_EXTENSION) {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{}{}", as_str, CONFIG_EXTENSION))
    }
}

/// Default directory holding mapping files
pub fn config_dir() -> PathBuf {
    ProjectDirs::from("", "", "hidmidi")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// List mapping files in `dir`, sorted by path. A missing directory yields
/// an empty list.
pub fn list_configurations(dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let dir = dir.as_ref();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot list configurations in {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().ends_with(CONFIG_EXTENSION))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}
