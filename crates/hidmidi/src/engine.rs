//! The monitoring loop
//!
//! The engine owns all runtime state. Each iteration drains the sample
//! stream through the change detector, maps a pending change to a candidate
//! message, and hands it to the scheduler. The status line is refreshed at
//! a fixed rate regardless of MIDI activity.

use crate::config::MappingConfig;
use crate::detector::ChangeDetector;
use crate::error::{Error, Result, TransportError};
use crate::mapper::{all_off_messages, map_value};
use crate::scheduler::{Dispatch, DispatchScheduler};
use crate::shutdown::QuitSignal;
use crate::source::SampleStream;
use crate::status::{format_status_line, StatusSink};
use crate::transport::MidiTransport;
use std::thread;
use std::time::{Duration, Instant};

/// Status line refresh period (60 Hz)
pub const FRAME_DURATION: Duration = Duration::from_millis(1000 / 60);

/// Idle sleep between iterations
pub const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Spacing between cleanup messages
pub const CLEANUP_SPACING: Duration = Duration::from_micros(500);

/// Minimum time between two reports of a failing transport
pub const ERROR_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Counters collected while monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub samples: u64,
    pub sent: u64,
    pub unchanged: u64,
    /// Changes held back by the rate limit, counted once per change
    pub rate_limited: u64,
    pub failed: u64,
}

/// State that lives for one monitoring session
#[derive(Debug)]
pub struct RuntimeState {
    detector: ChangeDetector,
    // Raw value of the last evaluated change; None until the first one
    previous: Option<i64>,
    scheduler: DispatchScheduler,
    // The pending change has already been counted as rate limited
    limited: bool,
    last_error_report: Option<Instant>,
}

impl RuntimeState {
    /// Fresh state, continuing from `detector` (which may hold the value
    /// left by calibration). The first evaluation is forced.
    pub fn new(mut detector: ChangeDetector, interval: Duration) -> Self {
        detector.mark_changed();
        Self {
            detector,
            previous: None,
            scheduler: DispatchScheduler::new(interval),
            limited: false,
            last_error_report: None,
        }
    }

    /// Latest raw value
    pub fn current(&self) -> i64 {
        self.detector.current()
    }

    /// Raw value of the last committed evaluation
    pub fn previous(&self) -> Option<i64> {
        self.previous
    }

    /// Last transmitted CC value
    pub fn last_sent_value(&self) -> Option<u8> {
        self.scheduler.last_sent_value()
    }
}

/// Maps one control to MIDI until told to quit
pub struct Engine<T: MidiTransport> {
    config: MappingConfig,
    transport: T,
    stream: SampleStream,
    quit: QuitSignal,
    state: RuntimeState,
    stats: EngineStats,
    disconnected: bool,
}

impl<T: MidiTransport> Engine<T> {
    /// Create an engine starting from a fresh change detector
    pub fn new(config: MappingConfig, transport: T, stream: SampleStream, quit: QuitSignal) -> Self {
        Self::with_detector(config, transport, stream, quit, ChangeDetector::new())
    }

    /// Create an engine that continues from an existing detector
    pub fn with_detector(
        config: MappingConfig,
        transport: T,
        stream: SampleStream,
        quit: QuitSignal,
        detector: ChangeDetector,
    ) -> Self {
        let state = RuntimeState::new(detector, config.send_interval());
        Self {
            config,
            transport,
            stream,
            quit,
            state,
            stats: EngineStats::default(),
            disconnected: false,
        }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// True once the producer has gone away and no samples are left
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Current status line
    pub fn status_line(&self) -> String {
        format_status_line(&self.config, self.state.current())
    }

    /// One iteration at `now`: drain samples, then evaluate a pending change.
    ///
    /// A rate-limited change stays pending and is evaluated again, from the
    /// latest raw value, on a later iteration. Transport failures are
    /// reported and swallowed.
    pub fn step(&mut self, now: Instant) -> Option<Dispatch> {
        let stats = &mut self.stats;
        let detector = &mut self.state.detector;
        let name = &self.config.control.name;
        let connected = self.stream.drain_into(|sample| {
            stats.samples += 1;
            if detector.observe(sample.value) {
                log::trace!("Sample {} -> {}", name, sample.value);
            }
        });
        if !connected && !self.disconnected {
            log::warn!("Sample producer for {} has stopped", self.config.control.name);
            self.disconnected = true;
        }

        if !self.state.detector.is_changed() {
            return None;
        }

        let current = self.state.detector.current();
        let outcome = match map_value(self.state.previous, current, &self.config) {
            None => None,
            Some(message) => {
                match self
                    .state
                    .scheduler
                    .dispatch(&message, now, &mut self.transport)
                {
                    Ok(Dispatch::RateLimited) => {
                        if !self.state.limited {
                            self.state.limited = true;
                            self.stats.rate_limited += 1;
                        }
                        return Some(Dispatch::RateLimited);
                    }
                    Ok(dispatch) => {
                        match dispatch {
                            Dispatch::Sent => self.stats.sent += 1,
                            _ => self.stats.unchanged += 1,
                        }
                        Some(dispatch)
                    }
                    Err(e) => {
                        self.stats.failed += 1;
                        self.report_error(&e, now);
                        None
                    }
                }
            }
        };

        self.state.detector.take_change();
        self.state.limited = false;
        self.state.previous = Some(current);
        outcome
    }

    fn report_error(&mut self, error: &TransportError, now: Instant) {
        let due = self
            .state
            .last_error_report
            .map(|last| now.saturating_duration_since(last) > ERROR_REPORT_INTERVAL)
            .unwrap_or(true);
        if due {
            log::warn!("Error sending MIDI message: {}", error);
            self.state.last_error_report = Some(now);
        }
    }

    /// Run until the quit signal is raised or the producer disconnects, then
    /// send the cleanup messages. A disconnect that was not caused by quit
    /// is returned as a device error after the cleanup.
    pub fn run(&mut self, status: &mut dyn StatusSink) -> Result<EngineStats> {
        log::info!(
            "Monitoring {} -> {}",
            self.config.control.name,
            self.transport.port_name()
        );

        let mut last_frame: Option<Instant> = None;
        while !self.quit.is_raised() && !self.disconnected {
            let now = Instant::now();
            self.step(now);

            let frame_due = last_frame
                .map(|last| now.saturating_duration_since(last) >= FRAME_DURATION)
                .unwrap_or(true);
            if frame_due {
                status.update(&self.status_line());
                last_frame = Some(now);
            }

            thread::sleep(IDLE_SLEEP);
        }

        log::info!("Monitoring stopped: {:?}", self.stats);
        self.all_off();
        if self.disconnected && !self.quit.is_raised() {
            return Err(Error::Device(format!(
                "Lost input from {}",
                self.config.control.name
            )));
        }
        Ok(self.stats)
    }

    /// Best-effort All Sound Off, Reset All Controllers and All Notes Off on
    /// every channel. Returns the number of messages that were accepted.
    pub fn all_off(&mut self) -> usize {
        send_all_off(&mut self.transport, CLEANUP_SPACING)
    }
}

/// Send the cleanup triplet on channels 0-15, ignoring failures
pub fn send_all_off(transport: &mut dyn MidiTransport, spacing: Duration) -> usize {
    if !transport.is_open() {
        return 0;
    }
    log::info!("Sending MIDI All Notes Off / Reset Controllers");
    let mut accepted = 0;
    for channel in 0..16u8 {
        for message in all_off_messages(channel) {
            if transport.send_message(&message).is_ok() {
                accepted += 1;
            }
            if !spacing.is_zero() {
                thread::sleep(spacing);
            }
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessageKind;
    use crate::control::{ControlDescriptor, ControlSample};
    use crate::status::NoStatus;
    use crate::transport::RecordingTransport;
    use crossbeam_channel::Sender;

    fn note_config() -> MappingConfig {
        let mut config = MappingConfig::new(
            "/dev/input/event0",
            "Pad",
            ControlDescriptor::button(0x130, "BTN_SOUTH"),
            "port",
        );
        config.midi_message_type = Some(MessageKind::NoteOnOff);
        config.midi_channel = 0;
        config.midi_note_or_cc_number = 60;
        config.midi_value_note_on_velocity = 100;
        config
    }

    fn axis_config(calibrated: bool) -> MappingConfig {
        let mut config = MappingConfig::new(
            "/dev/input/event0",
            "Stick",
            ControlDescriptor::axis(0, "ABS_X", 0, 1000),
            "port",
        );
        config.midi_message_type = Some(MessageKind::ControlChange);
        config.midi_note_or_cc_number = 1;
        if calibrated {
            config.set_calibration(0, 1000);
        }
        config
    }

    fn engine(config: MappingConfig) -> (Engine<RecordingTransport>, Sender<ControlSample>) {
        let (tx, stream) = SampleStream::channel();
        let engine = Engine::new(config, RecordingTransport::default(), stream, QuitSignal::new());
        (engine, tx)
    }

    fn feed(tx: &Sender<ControlSample>, value: i64) {
        tx.send(ControlSample::now(value)).unwrap();
    }

    #[test]
    fn test_button_press_release() {
        let (mut engine, tx) = engine(note_config());
        let t0 = Instant::now();
        let ms = Duration::from_millis;

        // Initial evaluation of the released button sends nothing
        assert_eq!(engine.step(t0), None);
        feed(&tx, 1);
        assert_eq!(engine.step(t0 + ms(10)), Some(Dispatch::Sent));
        feed(&tx, 0);
        assert_eq!(engine.step(t0 + ms(20)), Some(Dispatch::Sent));

        assert_eq!(engine.transport().sent, vec![[0x90, 60, 100], [0x80, 60, 0]]);
    }

    #[test]
    fn test_repeated_axis_value_sends_once() {
        let (mut engine, tx) = engine(axis_config(true));
        let t0 = Instant::now();
        for (i, value) in [500, 500, 500].into_iter().enumerate() {
            feed(&tx, value);
            engine.step(t0 + Duration::from_millis(10 * i as u64));
        }
        assert_eq!(engine.transport().sent, vec![[0xB0, 1, 64]]);
        assert_eq!(engine.state().last_sent_value(), Some(64));
        assert_eq!(engine.stats().unchanged, 0);
    }

    #[test]
    fn test_uncalibrated_axis_is_silent() {
        let (mut engine, tx) = engine(axis_config(false));
        let t0 = Instant::now();
        for (i, value) in [0, 1000, 250, -20, 70_000].into_iter().enumerate() {
            feed(&tx, value);
            engine.step(t0 + Duration::from_millis(10 * i as u64));
        }
        assert!(engine.transport().sent.is_empty());
    }

    #[test]
    fn test_only_latest_sample_is_evaluated() {
        let (mut engine, tx) = engine(axis_config(true));
        for value in [100, 900, 1000] {
            feed(&tx, value);
        }
        engine.step(Instant::now());
        assert_eq!(engine.transport().sent, vec![[0xB0, 1, 127]]);
        assert_eq!(engine.stats().samples, 3);
    }

    #[test]
    fn test_rate_limited_change_stays_pending() {
        let mut config = note_config();
        config.midi_send_interval_ms = 50;
        let (mut engine, tx) = engine(config);
        let t0 = Instant::now();
        let ms = Duration::from_millis;

        feed(&tx, 1);
        assert_eq!(engine.step(t0), Some(Dispatch::Sent));
        feed(&tx, 0);
        assert_eq!(engine.step(t0 + ms(10)), Some(Dispatch::RateLimited));
        assert_eq!(engine.step(t0 + ms(20)), Some(Dispatch::RateLimited));
        assert_eq!(engine.step(t0 + ms(30)), Some(Dispatch::RateLimited));
        assert_eq!(engine.state().previous(), Some(1));
        assert_eq!(engine.stats().rate_limited, 1);
        // Re-evaluated from the latest value once the interval has passed
        assert_eq!(engine.step(t0 + ms(60)), Some(Dispatch::Sent));
        assert_eq!(engine.transport().sent, vec![[0x90, 60, 100], [0x80, 60, 0]]);

        // A new change held back again is counted again
        feed(&tx, 1);
        assert_eq!(engine.step(t0 + ms(70)), Some(Dispatch::RateLimited));
        assert_eq!(engine.stats().rate_limited, 2);
    }

    #[test]
    fn test_button_messages_alternate_under_fast_input() {
        let mut config = note_config();
        config.midi_send_interval_ms = 20;
        let (mut engine, tx) = engine(config);
        let t0 = Instant::now();

        for i in 0..200u64 {
            feed(&tx, (i % 3 == 0) as i64);
            engine.step(t0 + Duration::from_millis(i * 3));
        }

        let sent = &engine.transport().sent;
        assert!(!sent.is_empty());
        for pair in sent.windows(2) {
            assert_ne!(pair[0][0], pair[1][0], "two consecutive messages of the same polarity");
        }
    }

    #[test]
    fn test_failed_send_is_not_retried() {
        let (mut engine, tx) = engine(note_config());
        engine.transport.fail = true;
        feed(&tx, 1);
        assert_eq!(engine.step(Instant::now()), None);
        assert_eq!(engine.step(Instant::now() + Duration::from_millis(10)), None);
        assert_eq!(engine.transport().attempts, 1);
        assert_eq!(engine.stats().failed, 1);
    }

    #[test]
    fn test_button_cc_equal_values_send_once() {
        let mut config = note_config();
        config.midi_message_type = Some(MessageKind::ControlChange);
        config.midi_value_cc_on = 50;
        config.midi_value_cc_off = 50;
        let (mut engine, tx) = engine(config);
        let t0 = Instant::now();
        feed(&tx, 1);
        engine.step(t0);
        feed(&tx, 0);
        engine.step(t0 + Duration::from_millis(10));
        assert_eq!(engine.transport().sent, vec![[0xB0, 60, 50]]);
    }

    #[test]
    fn test_run_stops_on_quit_and_cleans_up() {
        let (tx, stream) = SampleStream::channel();
        let quit = QuitSignal::new();
        let mut engine = Engine::new(note_config(), RecordingTransport::default(), stream, quit.clone());
        feed(&tx, 1);

        let stopper = {
            let quit = quit.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                quit.raise();
            })
        };
        let stats = engine.run(&mut NoStatus).unwrap();
        stopper.join().unwrap();

        assert_eq!(stats.sent, 1);
        let sent = &engine.transport().sent;
        assert_eq!(sent[0], [0x90, 60, 100]);
        // 16 channels x 3 cleanup messages
        assert_eq!(sent.len(), 1 + 48);
        assert_eq!(sent[1], [0xB0, 120, 0]);
        assert_eq!(sent[48], [0xBF, 123, 0]);
    }

    #[derive(Default)]
    struct RecordingStatus {
        lines: Vec<String>,
    }

    impl StatusSink for RecordingStatus {
        fn update(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }
    }

    #[test]
    fn test_status_refreshes_without_sends() {
        let (tx, stream) = SampleStream::channel();
        let quit = QuitSignal::new();
        let mut engine = Engine::new(axis_config(true), RecordingTransport::default(), stream, quit.clone());
        feed(&tx, 500);

        let stopper = {
            let quit = quit.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(120));
                quit.raise();
            })
        };
        let mut status = RecordingStatus::default();
        let stats = engine.run(&mut status).unwrap();
        stopper.join().unwrap();

        // One CC for the only value, yet the line keeps refreshing at 60 Hz
        assert_eq!(stats.sent, 1);
        assert!(status.lines.len() >= 3, "only {} refreshes", status.lines.len());
        let expected = format_status_line(&axis_config(true), 500);
        assert!(status.lines.iter().all(|line| *line == expected));
        drop(tx);
    }

    #[test]
    fn test_run_reports_lost_producer_after_cleanup() {
        let (tx, stream) = SampleStream::channel();
        let mut engine = Engine::new(note_config(), RecordingTransport::default(), stream, QuitSignal::new());
        feed(&tx, 1);
        drop(tx);

        let result = engine.run(&mut NoStatus);
        assert!(matches!(result, Err(Error::Device(_))));
        assert!(engine.is_disconnected());
        // The buffered press is still handled before the cleanup
        let sent = &engine.transport().sent;
        assert_eq!(sent[0], [0x90, 60, 100]);
        assert_eq!(sent.len(), 1 + 48);
    }

    #[test]
    fn test_cleanup_tolerates_failures() {
        let mut transport = RecordingTransport::default();
        transport.fail = true;
        assert_eq!(send_all_off(&mut transport, Duration::ZERO), 0);
        assert_eq!(transport.attempts, 48);
    }
}
