//! Conversion of raw control values into MIDI messages
//!
//! Everything here is pure: the same inputs always produce the same output.
//! Suppression of repeated values and rate limiting live in the scheduler.

use crate::config::{MappingConfig, MessageKind};
use crate::control::ControlKind;

/// Controller number for All Sound Off
pub const CC_ALL_SOUND_OFF: u8 = 120;

/// Controller number for Reset All Controllers
pub const CC_RESET_ALL_CONTROLLERS: u8 = 121;

/// Controller number for All Notes Off
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Outbound MIDI messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note on: channel, note, velocity
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note off: channel, note
    NoteOff { channel: u8, note: u8 },
    /// Control change: channel, controller, value
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiMessage {
    /// Convert to raw MIDI bytes, masking every field to its legal width
    pub fn to_bytes(&self) -> [u8; 3] {
        match self {
            MidiMessage::NoteOn { channel, note, velocity } => {
                [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOff { channel, note } => [0x80 | (channel & 0x0F), note & 0x7F, 0],
            MidiMessage::ControlChange { channel, controller, value } => {
                [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]
            }
        }
    }

    /// The value carried by a control change, if this is one
    pub fn cc_value(&self) -> Option<u8> {
        match self {
            MidiMessage::ControlChange { value, .. } => Some(value & 0x7F),
            _ => None,
        }
    }
}

/// Normalized position (0.0-1.0) of `raw` within `[min, max]`, clamped.
/// A degenerate range yields 1.0 at or above `max`, else 0.0.
pub fn normalize(raw: i64, min: i64, max: i64) -> f64 {
    if max > min {
        let clamped = raw.clamp(min, max);
        (clamped - min) as f64 / (max - min) as f64
    } else if raw >= max {
        1.0
    } else {
        0.0
    }
}

/// Scale a normalized value to 0-127, rounding half away from zero
pub fn to_midi_value(normalized: f64) -> u8 {
    let value = (normalized * 127.0 + 0.5).floor();
    value.clamp(0.0, 127.0) as u8
}

/// MIDI value for an axis sample, or `None` when the axis is not calibrated.
///
/// Uncalibrated axes never produce output, even though the logical range is
/// known, so that applying calibration later cannot cause a jump.
pub fn axis_value(raw: i64, config: &MappingConfig) -> Option<u8> {
    if !config.calibration_done {
        return None;
    }
    let mut normalized = normalize(raw, config.calibration_min_hid, config.calibration_max_hid);
    if config.reverse_axis {
        normalized = 1.0 - normalized;
    }
    Some(to_midi_value(normalized))
}

/// Message for a button edge. `was_pressed` is the last committed state;
/// no message is produced when the state has not changed.
pub fn button_message(was_pressed: bool, raw: i64, config: &MappingConfig) -> Option<MidiMessage> {
    let pressed = raw != 0;
    if pressed == was_pressed {
        return None;
    }

    let channel = config.midi_channel & 0x0F;
    let number = config.midi_note_or_cc_number & 0x7F;
    match config.midi_message_type? {
        MessageKind::NoteOnOff if pressed => Some(MidiMessage::NoteOn {
            channel,
            note: number,
            velocity: config.midi_value_note_on_velocity & 0x7F,
        }),
        MessageKind::NoteOnOff => Some(MidiMessage::NoteOff { channel, note: number }),
        MessageKind::ControlChange => {
            let value = if pressed {
                config.midi_value_cc_on
            } else {
                config.midi_value_cc_off
            };
            Some(MidiMessage::ControlChange {
                channel,
                controller: number,
                value: value & 0x7F,
            })
        }
    }
}

/// Compute the candidate message for the current raw value.
///
/// `previous` is the last committed raw value, `None` before the first
/// evaluation (a button in that state counts as released).
pub fn map_value(previous: Option<i64>, current: i64, config: &MappingConfig) -> Option<MidiMessage> {
    match config.control.kind {
        ControlKind::Button => {
            let was_pressed = previous.map(|v| v != 0).unwrap_or(false);
            button_message(was_pressed, current, config)
        }
        ControlKind::Axis => {
            if config.midi_message_type != Some(MessageKind::ControlChange) {
                return None;
            }
            axis_value(current, config).map(|value| MidiMessage::ControlChange {
                channel: config.midi_channel & 0x0F,
                controller: config.midi_note_or_cc_number & 0x7F,
                value,
            })
        }
    }
}

/// The three channel-mode messages sent on shutdown, for one channel
pub fn all_off_messages(channel: u8) -> [MidiMessage; 3] {
    let channel = channel & 0x0F;
    [
        MidiMessage::ControlChange { channel, controller: CC_ALL_SOUND_OFF, value: 0 },
        MidiMessage::ControlChange { channel, controller: CC_RESET_ALL_CONTROLLERS, value: 0 },
        MidiMessage::ControlChange { channel, controller: CC_ALL_NOTES_OFF, value: 0 },
    ]
}
