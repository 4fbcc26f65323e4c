//! Two-phase axis calibration
//!
//! The user is walked through capturing the minimum and then the maximum
//! raw value of an axis. Each phase is a countdown followed by a timed hold:
//!
//! - During the countdown samples are drained into the change detector so
//!   the stream stays current, but the bounds are not touched.
//! - During the hold the running minimum (or maximum) of every changed
//!   sample is tracked. A hold that sees no change at all keeps the value
//!   present when the hold started.
//!
//! After both phases the bounds are swapped if needed and written to the
//! mapping. Raising the quit signal at any point aborts without writing.

use crate::config::MappingConfig;
use crate::detector::ChangeDetector;
use crate::error::{Error, Result};
use crate::shutdown::QuitSignal;
use crate::source::{pump_until, SampleStream};
use crossterm::cursor::MoveToColumn;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::queue;
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

/// Which bound a phase captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Min,
    Max,
}

impl CalibrationPhase {
    /// Short label used in countdown messages
    pub fn label(&self) -> &'static str {
        match self {
            CalibrationPhase::Min => "MIN",
            CalibrationPhase::Max => "MAX",
        }
    }

    fn position(&self) -> &'static str {
        match self {
            CalibrationPhase::Min => "MINIMUM",
            CalibrationPhase::Max => "MAXIMUM",
        }
    }

    /// Fold `value` into the running extreme for this phase
    fn fold(&self, extreme: Option<i64>, value: i64) -> i64 {
        match (self, extreme) {
            (_, None) => value,
            (CalibrationPhase::Min, Some(e)) => e.min(value),
            (CalibrationPhase::Max, Some(e)) => e.max(value),
        }
    }
}

impl fmt::Display for CalibrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationPhase::Min => write!(f, "Minimum"),
            CalibrationPhase::Max => write!(f, "Maximum"),
        }
    }
}

/// Durations used by the procedure
#[derive(Debug, Clone, Copy)]
pub struct CalibrationTiming {
    /// Number of countdown ticks before each hold
    pub countdown_ticks: u32,
    /// Length of one countdown tick
    pub tick: Duration,
    /// How often the countdown checks for quit
    pub countdown_poll: Duration,
    /// Length of the hold window
    pub hold: Duration,
    /// Sleep between sample drains during the hold
    pub hold_poll: Duration,
    /// How often hold progress is reported
    pub display_interval: Duration,
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            countdown_ticks: 5,
            tick: Duration::from_secs(1),
            countdown_poll: Duration::from_millis(100),
            hold: Duration::from_secs(10),
            hold_poll: Duration::from_millis(5),
            display_interval: Duration::from_millis(100),
        }
    }
}

/// Live state of a running hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldProgress {
    /// Whole seconds left, rounded
    pub seconds_left: u64,
    /// Latest raw value
    pub current: i64,
    /// Running extreme, or the current value if nothing changed yet
    pub extreme: i64,
}

/// Outcome of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: CalibrationPhase,
    /// Captured bound
    pub value: i64,
    /// The control never changed during the hold
    pub no_change: bool,
}

/// Outcome of a completed calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationResult {
    /// Stored minimum
    pub min: i64,
    /// Stored maximum
    pub max: i64,
    /// The captured bounds were in the wrong order and have been swapped
    pub swapped: bool,
    pub min_phase: PhaseReport,
    pub max_phase: PhaseReport,
}

impl CalibrationResult {
    /// Both bounds are equal, output will be constant
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }
}

/// Receives progress callbacks while calibration runs
pub trait CalibrationObserver {
    /// A phase is about to begin its countdown
    fn phase_started(&mut self, _phase: CalibrationPhase, _control: &str) {}

    /// One countdown tick, `seconds_left` counts down to 1
    fn countdown(&mut self, _phase: CalibrationPhase, _seconds_left: u32) {}

    /// The hold window has opened
    fn hold_started(&mut self, _phase: CalibrationPhase, _hold: Duration) {}

    /// Periodic hold progress
    fn holding(&mut self, _phase: CalibrationPhase, _progress: &HoldProgress) {}

    /// A phase finished
    fn phase_done(&mut self, _report: &PhaseReport) {}

    /// Both phases finished and bounds were normalized
    fn finished(&mut self, _result: &CalibrationResult) {}
}

/// Observer that ignores every callback
pub struct SilentObserver;

impl CalibrationObserver for SilentObserver {}

/// Observer printing calibration progress to a terminal
pub struct ConsoleObserver<W: Write> {
    out: W,
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn overwrite_line(&mut self, text: &str) {
        let _ = queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(text)
        );
        let _ = self.out.flush();
    }

    fn clear_line(&mut self) {
        self.overwrite_line("");
    }
}

impl<W: Write> CalibrationObserver for ConsoleObserver<W> {
    fn phase_started(&mut self, phase: CalibrationPhase, control: &str) {
        let step = match phase {
            CalibrationPhase::Min => 1,
            CalibrationPhase::Max => 2,
        };
        let _ = writeln!(self.out, "\n--- Calibrating {} ---", phase);
        let _ = writeln!(
            self.out,
            "{}. Move the control [{}] fully to its desired {} position.",
            step,
            control,
            phase.position()
        );
        let _ = writeln!(self.out, "   Get ready!");
    }

    fn countdown(&mut self, phase: CalibrationPhase, seconds_left: u32) {
        let text = format!(
            "Starting {} capture in {} second(s)...",
            phase.label(),
            seconds_left
        );
        self.overwrite_line(&text);
    }

    fn hold_started(&mut self, phase: CalibrationPhase, hold: Duration) {
        self.clear_line();
        let _ = writeln!(
            self.out,
            "   OK. Now HOLD the control steady at the {} position for {} seconds.",
            phase.position(),
            hold.as_secs()
        );
    }

    fn holding(&mut self, phase: CalibrationPhase, progress: &HoldProgress) {
        let text = format!(
            "Capturing... ({:>3}s) Current: {:>6} {}: {:>6}",
            progress.seconds_left,
            progress.current,
            match phase {
                CalibrationPhase::Min => "Min",
                CalibrationPhase::Max => "Max",
            },
            progress.extreme
        );
        self.overwrite_line(&text);
    }

    fn phase_done(&mut self, report: &PhaseReport) {
        self.clear_line();
        let _ = writeln!(self.out, "   {} value captured: {}", report.phase, report.value);
        if report.no_change {
            let _ = writeln!(
                self.out,
                "   Warning: no movement detected, using the value before the hold."
            );
        }
    }

    fn finished(&mut self, result: &CalibrationResult) {
        if result.swapped {
            let _ = writeln!(self.out, "\nNote: Min value was greater than Max value. Swapping.");
            let _ = writeln!(self.out, "  New Min: {}, New Max: {}", result.min, result.max);
        } else if result.is_degenerate() {
            let _ = writeln!(
                self.out,
                "\nWarning: Minimum and Maximum calibrated values are the same ({}).",
                result.min
            );
            let _ = writeln!(self.out, "         MIDI output will be fixed until recalibrated.");
        }
        let _ = writeln!(self.out, "\nCalibration complete.");
    }
}

/// Drives the calibration procedure over a live sample stream
pub struct Calibrator<'a> {
    stream: &'a SampleStream,
    detector: &'a mut ChangeDetector,
    quit: &'a QuitSignal,
    timing: CalibrationTiming,
}

impl<'a> Calibrator<'a> {
    pub fn new(stream: &'a SampleStream, detector: &'a mut ChangeDetector, quit: &'a QuitSignal) -> Self {
        Self {
            stream,
            detector,
            quit,
            timing: CalibrationTiming::default(),
        }
    }

    /// Override the default durations
    pub fn with_timing(mut self, timing: CalibrationTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Calibrate the mapped control and store the bounds in `config`.
    ///
    /// Buttons need no calibration and return `Ok(None)` without touching
    /// the config. An abort returns [`Error::CalibrationAborted`] and leaves
    /// the config as it was.
    pub fn run(
        mut self,
        config: &mut MappingConfig,
        observer: &mut dyn CalibrationObserver,
    ) -> Result<Option<CalibrationResult>> {
        if !config.control.is_axis() {
            log::debug!("{} is a button, skipping calibration", config.control.name);
            return Ok(None);
        }

        log::info!("Calibrating {}", config.control.name);
        let min_phase = self.phase(CalibrationPhase::Min, &config.control.name, observer)?;
        let max_phase = self.phase(CalibrationPhase::Max, &config.control.name, observer)?;

        let (mut min, mut max) = (min_phase.value, max_phase.value);
        let swapped = min > max;
        if swapped {
            std::mem::swap(&mut min, &mut max);
            log::info!("Calibration bounds were reversed, swapped to {}..{}", min, max);
        } else if min == max {
            log::warn!(
                "Calibrated minimum and maximum are both {}, output will be constant",
                min
            );
        }

        let result = CalibrationResult {
            min,
            max,
            swapped,
            min_phase,
            max_phase,
        };
        config.set_calibration(min, max);
        observer.finished(&result);
        log::info!("Calibration done: {}..{}", min, max);
        Ok(Some(result))
    }

    fn phase(
        &mut self,
        phase: CalibrationPhase,
        control: &str,
        observer: &mut dyn CalibrationObserver,
    ) -> Result<PhaseReport> {
        observer.phase_started(phase, control);
        self.countdown(phase, observer)?;
        let report = self.hold(phase, observer)?;
        if report.no_change {
            log::warn!(
                "No change detected while capturing {}, keeping {}",
                phase,
                report.value
            );
        }
        observer.phase_done(&report);
        Ok(report)
    }

    fn countdown(&mut self, phase: CalibrationPhase, observer: &mut dyn CalibrationObserver) -> Result<()> {
        let stream = self.stream;
        let detector = &mut *self.detector;
        for seconds_left in (1..=self.timing.countdown_ticks).rev() {
            observer.countdown(phase, seconds_left);
            let deadline = Instant::now() + self.timing.tick;
            let completed = pump_until(self.quit, deadline, self.timing.countdown_poll, |_| {
                for sample in stream.drain() {
                    detector.observe(sample.value);
                }
            });
            if !completed {
                return Err(Error::CalibrationAborted);
            }
        }
        Ok(())
    }

    fn hold(&mut self, phase: CalibrationPhase, observer: &mut dyn CalibrationObserver) -> Result<PhaseReport> {
        let timing = self.timing;
        let stream = self.stream;
        let detector = &mut *self.detector;

        let initial = detector.current();
        detector.take_change();
        observer.hold_started(phase, timing.hold);

        let start = Instant::now();
        let deadline = start + timing.hold;
        let mut extreme: Option<i64> = None;
        let mut last_display: Option<Instant> = None;

        let completed = pump_until(self.quit, deadline, timing.hold_poll, |now| {
            for sample in stream.drain() {
                if detector.observe(sample.value) {
                    extreme = Some(phase.fold(extreme, sample.value));
                }
            }
            detector.take_change();

            let due = last_display
                .map(|last| now.saturating_duration_since(last) >= timing.display_interval)
                .unwrap_or(true);
            if due {
                let remaining = deadline.saturating_duration_since(now);
                let progress = HoldProgress {
                    seconds_left: (remaining.as_millis() as u64 + 500) / 1000,
                    current: detector.current(),
                    extreme: extreme.unwrap_or_else(|| detector.current()),
                };
                observer.holding(phase, &progress);
                last_display = Some(now);
            }
        });

        if !completed {
            return Err(Error::CalibrationAborted);
        }

        Ok(PhaseReport {
            phase,
            value: extreme.unwrap_or(initial),
            no_change: extreme.is_none(),
        })
    }
}
