//! MIDI output transports
//!
//! The engine talks to a [`MidiTransport`]. The real backend is a midir
//! output connection (ALSA on Linux, CoreMIDI, WinMM); a logging transport
//! stands in for dry runs.

use crate::error::{Error, Result, TransportError};
use crate::mapper::MidiMessage;
use midir::{MidiOutput, MidiOutputConnection};

/// Client name registered with the MIDI system
pub const CLIENT_NAME: &str = "hidmidi";

/// Outbound MIDI port
pub trait MidiTransport {
    /// Transmit one three-byte message
    fn send(&mut self, bytes: [u8; 3]) -> std::result::Result<(), TransportError>;

    /// Check if the port is open
    fn is_open(&self) -> bool;

    /// Get the port name
    fn port_name(&self) -> &str;

    /// Transmit a typed message
    fn send_message(&mut self, message: &MidiMessage) -> std::result::Result<(), TransportError> {
        log::debug!("MIDI out {:?}", message);
        self.send(message.to_bytes())
    }
}

impl<T: MidiTransport + ?Sized> MidiTransport for Box<T> {
    fn send(&mut self, bytes: [u8; 3]) -> std::result::Result<(), TransportError> {
        (**self).send(bytes)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn port_name(&self) -> &str {
        (**self).port_name()
    }
}

/// midir-backed output port
pub struct MidirTransport {
    connection: Option<MidiOutputConnection>,
    port_name: String,
}

impl MidirTransport {
    /// Open the output port whose name matches `name` exactly
    pub fn open(name: &str) -> Result<Self> {
        let midi_out = new_output()?;
        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|port| midi_out.port_name(port).map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| Error::Midi(format!("No MIDI output port named '{}'", name)))?;

        let connection = midi_out
            .connect(port, "hidmidi-out")
            .map_err(|e| Error::Midi(format!("Failed to open '{}': {}", name, e)))?;

        log::info!("Opened MIDI output port: {}", name);
        Ok(Self {
            connection: Some(connection),
            port_name: name.to_string(),
        })
    }

    /// Close the port. Further sends fail with [`TransportError::Closed`].
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
            log::info!("Closed MIDI output port: {}", self.port_name);
        }
    }
}

impl MidiTransport for MidirTransport {
    fn send(&mut self, bytes: [u8; 3]) -> std::result::Result<(), TransportError> {
        let connection = self.connection.as_mut().ok_or(TransportError::Closed)?;
        connection
            .send(&bytes)
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for MidirTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Transport that only logs (for dry runs)
pub struct DummyTransport;

impl MidiTransport for DummyTransport {
    fn send(&mut self, bytes: [u8; 3]) -> std::result::Result<(), TransportError> {
        log::info!("MIDI (dry run): {:02X} {:02X} {:02X}", bytes[0], bytes[1], bytes[2]);
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn port_name(&self) -> &str {
        "dry-run"
    }
}

fn new_output() -> Result<MidiOutput> {
    MidiOutput::new(CLIENT_NAME).map_err(|e| Error::Midi(format!("Failed to create MIDI output: {}", e)))
}

/// List available MIDI output port names
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = new_output()?;
    Ok(midi_out
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| {
            midi_out
                .port_name(port)
                .unwrap_or_else(|_| format!("MIDI Output {}", index))
        })
        .collect())
}

/// In-memory transport used by tests
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub sent: Vec<[u8; 3]>,
    pub fail: bool,
    pub attempts: usize,
}

#[cfg(test)]
impl MidiTransport for RecordingTransport {
    fn send(&mut self, bytes: [u8; 3]) -> std::result::Result<(), TransportError> {
        self.attempts += 1;
        if self.fail {
            return Err(TransportError::Send("test failure".to_string()));
        }
        self.sent.push(bytes);
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn port_name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_transport() {
        let mut output = DummyTransport;
        assert!(output.is_open());
        let message = MidiMessage::NoteOn { channel: 0, note: 60, velocity: 100 };
        assert!(output.send_message(&message).is_ok());
    }

    #[test]
    fn test_send_message_uses_wire_bytes() {
        let mut output = RecordingTransport::default();
        output
            .send_message(&MidiMessage::ControlChange { channel: 2, controller: 7, value: 99 })
            .unwrap();
        assert_eq!(output.sent, vec![[0xB2, 7, 99]]);
    }
}
