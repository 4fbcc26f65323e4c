//! hidmidi - Map a joystick or gamepad control to MIDI
//!
//! Reads one button or analog axis from an input device and turns it into
//! outbound MIDI messages. Features include:
//!
//! - Buttons as Note On/Off or CC, edge-triggered
//! - Axes as CC, scaled to a calibrated range with optional reversal
//! - Interactive two-phase calibration (minimum, then maximum)
//! - Rate limiting and repeat suppression of outbound messages
//! - JSON mapping files, reusable across sessions
//!
//! # Usage as a Library
//!
//! ```no_run
//! use hidmidi::{Engine, MappingConfig, QuitSignal, SampleStream};
//! use hidmidi::transport::DummyTransport;
//! use hidmidi::status::NoStatus;
//!
//! let config = MappingConfig::load("stick.hidmidi.json")?;
//! let quit = QuitSignal::install()?;
//! let (_tx, stream) = SampleStream::channel();
//! let mut engine = Engine::new(config, DummyTransport, stream, quit);
//! engine.run(&mut NoStatus)?;
//! # Ok::<(), hidmidi::Error>(())
//! ```

pub mod calibration;
pub mod config;
pub mod control;
pub mod detector;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod platform;
pub mod prompt;
pub mod scheduler;
pub mod shutdown;
pub mod source;
pub mod status;
pub mod transport;

// Re-export main types
pub use calibration::{CalibrationResult, CalibrationTiming, Calibrator};
pub use config::{MappingConfig, MessageKind, CONFIG_EXTENSION};
pub use control::{ControlDescriptor, ControlKind, ControlSample};
pub use detector::ChangeDetector;
pub use engine::{Engine, EngineStats, RuntimeState};
pub use error::{Error, Result, TransportError};
pub use mapper::{map_value, MidiMessage};
pub use platform::{default_enumerator, DeviceEnumerator, DeviceInfo};
pub use scheduler::{Dispatch, DispatchScheduler};
pub use shutdown::QuitSignal;
pub use source::{ProducerHandle, SampleProducer, SampleStream};
pub use transport::{MidiTransport, MidirTransport};
