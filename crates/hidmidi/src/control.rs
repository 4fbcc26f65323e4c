//! Controls and the samples they produce
//!
//! A control is a single button or analog axis on an input device. The
//! engine never interprets the device-specific address; it only needs the
//! kind and the logical range the hardware reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Linux input event type for keys and buttons (`EV_KEY`)
pub const EV_KEY: u16 = 0x01;

/// Linux input event type for absolute axes (`EV_ABS`)
pub const EV_ABS: u16 = 0x03;

/// Whether a control is a button or an analog axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    /// Two-state control, samples are 0 or 1
    Button,
    /// Analog control, samples span the hardware logical range
    Axis,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKind::Button => write!(f, "Button"),
            ControlKind::Axis => write!(f, "Axis"),
        }
    }
}

/// Device-specific address of a control (event type and code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlAddress {
    /// Event type (`EV_KEY` or `EV_ABS` on Linux)
    pub event_type: u16,
    /// Event code within the type
    pub code: u16,
}

/// A single selectable control on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDescriptor {
    /// Button or axis
    pub kind: ControlKind,
    /// Where the control lives on the device
    pub address: ControlAddress,
    /// Logical minimum reported by the hardware
    pub logical_min: i64,
    /// Logical maximum reported by the hardware
    pub logical_max: i64,
    /// Human-readable name
    pub name: String,
}

impl ControlDescriptor {
    /// Describe a button. Buttons always have the logical range [0, 1].
    pub fn button(code: u16, name: impl Into<String>) -> Self {
        Self {
            kind: ControlKind::Button,
            address: ControlAddress { event_type: EV_KEY, code },
            logical_min: 0,
            logical_max: 1,
            name: name.into(),
        }
    }

    /// Describe an absolute axis with its hardware range
    pub fn axis(code: u16, name: impl Into<String>, logical_min: i64, logical_max: i64) -> Self {
        Self {
            kind: ControlKind::Axis,
            address: ControlAddress { event_type: EV_ABS, code },
            logical_min,
            logical_max,
            name: name.into(),
        }
    }

    /// Check if this control is a button
    pub fn is_button(&self) -> bool {
        self.kind == ControlKind::Button
    }

    /// Check if this control is an axis
    pub fn is_axis(&self) -> bool {
        self.kind == ControlKind::Axis
    }
}

impl fmt::Display for ControlDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ControlKind::Button => write!(f, "{} (Button)", self.name),
            ControlKind::Axis => write!(
                f,
                "{} (Axis: {} to {})",
                self.name, self.logical_min, self.logical_max
            ),
        }
    }
}

/// An immutable, timestamped reading of one control's raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSample {
    /// Raw value as reported by the device
    pub value: i64,
    /// When the sample was observed
    pub timestamp: Instant,
}

impl ControlSample {
    /// Create a sample stamped with the current time
    pub fn now(value: i64) -> Self {
        Self {
            value,
            timestamp: Instant::now(),
        }
    }

    /// Create a sample with an explicit timestamp
    pub fn at(value: i64, timestamp: Instant) -> Self {
        Self { value, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_range() {
        let button = ControlDescriptor::button(0x130, "BTN_SOUTH");
        assert!(button.is_button());
        assert_eq!((button.logical_min, button.logical_max), (0, 1));
        assert_eq!(button.address.event_type, EV_KEY);
    }

    #[test]
    fn test_display() {
        let axis = ControlDescriptor::axis(0x00, "ABS_X", -32768, 32767);
        assert_eq!(axis.to_string(), "ABS_X (Axis: -32768 to 32767)");
        let button = ControlDescriptor::button(0x130, "BTN_SOUTH");
        assert_eq!(button.to_string(), "BTN_SOUTH (Button)");
    }

    #[test]
    fn test_descriptor_json_keys() {
        let axis = ControlDescriptor::axis(0x01, "ABS_Y", 0, 255);
        let json = serde_json::to_value(&axis).unwrap();
        assert_eq!(json["kind"], "axis");
        assert_eq!(json["logicalMax"], 255);
        assert_eq!(json["address"]["eventType"], EV_ABS);
    }
}
