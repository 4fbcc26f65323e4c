//! Error types for hidmidi

use thiserror::Error;

/// Result type alias for hidmidi operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hidmidi
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete mapping configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input device enumeration or access error
    #[error("Device error: {0}")]
    Device(String),

    /// MIDI port setup error
    #[error("MIDI error: {0}")]
    Midi(String),

    /// MIDI send failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The user quit while calibration was running
    #[error("Calibration aborted")]
    CalibrationAborted,

    /// Interactive input ended (EOF) or was interrupted
    #[error("Input cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure while transmitting a single MIDI message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The output port is not open
    #[error("MIDI output port is not open")]
    Closed,

    /// The backend rejected the message
    #[error("send failed: {0}")]
    Send(String),
}
