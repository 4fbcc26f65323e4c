//! Outbound MIDI dispatch
//!
//! A candidate message passes two gates before it reaches the transport:
//!
//! 1. Value suppression: a control change whose value equals the last sent
//!    value is dropped.
//! 2. Rate limiting: a send is only allowed once `interval` has elapsed
//!    since the previous send. Candidates arriving earlier are dropped, not
//!    queued; the next qualifying sample supersedes them.
//!
//! Edge suppression for buttons happens before this point, in the mapper.

use crate::error::TransportError;
use crate::mapper::MidiMessage;
use crate::transport::MidiTransport;
use std::time::{Duration, Instant};

/// What happened to a candidate message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The message was transmitted
    Sent,
    /// Same CC value as the last send, nothing transmitted
    Unchanged,
    /// Interval since the last send has not elapsed, candidate dropped
    RateLimited,
}

/// Rate limiter and repeat suppressor for one mapped control
#[derive(Debug, Clone)]
pub struct DispatchScheduler {
    interval: Duration,
    last_sent_value: Option<u8>,
    // None until the first send, so the first change is never rate limited
    last_send: Option<Instant>,
}

impl DispatchScheduler {
    /// Create a scheduler enforcing `interval` between sends
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent_value: None,
            last_send: None,
        }
    }

    /// Last CC value that was transmitted, if any
    pub fn last_sent_value(&self) -> Option<u8> {
        self.last_sent_value
    }

    /// Time of the last send attempt
    pub fn last_send(&self) -> Option<Instant> {
        self.last_send
    }

    /// Decide whether `message` goes out at `now`, and send it if so.
    ///
    /// A failed send still counts as an attempt for rate limiting but does
    /// not update the last sent value. Nothing is retried.
    pub fn dispatch(
        &mut self,
        message: &MidiMessage,
        now: Instant,
        transport: &mut dyn MidiTransport,
    ) -> Result<Dispatch, TransportError> {
        let cc_value = message.cc_value();
        if cc_value.is_some() && cc_value == self.last_sent_value {
            return Ok(Dispatch::Unchanged);
        }

        if let Some(last) = self.last_send {
            if now.saturating_duration_since(last) < self.interval {
                return Ok(Dispatch::RateLimited);
            }
        }

        self.last_send = Some(now);
        transport.send_message(message)?;
        // Note messages reset CC tracking so the next CC always goes out
        self.last_sent_value = cc_value;
        Ok(Dispatch::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;

    fn cc(value: u8) -> MidiMessage {
        MidiMessage::ControlChange { channel: 0, controller: 1, value }
    }

    #[test]
    fn test_first_send_not_blocked() {
        let mut scheduler = DispatchScheduler::new(Duration::from_secs(10));
        let mut transport = RecordingTransport::default();
        let result = scheduler.dispatch(&cc(10), Instant::now(), &mut transport);
        assert_eq!(result, Ok(Dispatch::Sent));
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn test_rate_limit_drops_then_allows() {
        let mut scheduler = DispatchScheduler::new(Duration::from_millis(50));
        let mut transport = RecordingTransport::default();
        let t0 = Instant::now();

        assert_eq!(scheduler.dispatch(&cc(10), t0, &mut transport), Ok(Dispatch::Sent));
        assert_eq!(
            scheduler.dispatch(&cc(20), t0 + Duration::from_millis(10), &mut transport),
            Ok(Dispatch::RateLimited)
        );
        assert_eq!(
            scheduler.dispatch(&cc(30), t0 + Duration::from_millis(60), &mut transport),
            Ok(Dispatch::Sent)
        );
        assert_eq!(transport.sent, vec![[0xB0, 1, 10], [0xB0, 1, 30]]);
    }

    #[test]
    fn test_repeated_value_suppressed() {
        let mut scheduler = DispatchScheduler::new(Duration::from_millis(1));
        let mut transport = RecordingTransport::default();
        let t0 = Instant::now();

        scheduler.dispatch(&cc(64), t0, &mut transport).unwrap();
        let later = t0 + Duration::from_millis(100);
        assert_eq!(scheduler.dispatch(&cc(64), later, &mut transport), Ok(Dispatch::Unchanged));
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(scheduler.last_sent_value(), Some(64));
    }

    #[test]
    fn test_notes_are_not_value_suppressed() {
        let mut scheduler = DispatchScheduler::new(Duration::from_millis(1));
        let mut transport = RecordingTransport::default();
        let t0 = Instant::now();
        let on = MidiMessage::NoteOn { channel: 0, note: 60, velocity: 100 };

        scheduler.dispatch(&cc(5), t0, &mut transport).unwrap();
        scheduler.dispatch(&on, t0 + Duration::from_millis(5), &mut transport).unwrap();
        scheduler.dispatch(&on, t0 + Duration::from_millis(10), &mut transport).unwrap();
        assert_eq!(transport.sent.len(), 3);
        assert_eq!(scheduler.last_sent_value(), None);
    }

    #[test]
    fn test_failed_send_keeps_last_value() {
        let mut scheduler = DispatchScheduler::new(Duration::from_millis(1));
        let mut transport = RecordingTransport::default();
        let t0 = Instant::now();

        scheduler.dispatch(&cc(1), t0, &mut transport).unwrap();
        transport.fail = true;
        let t1 = t0 + Duration::from_millis(5);
        assert!(scheduler.dispatch(&cc(2), t1, &mut transport).is_err());
        assert_eq!(scheduler.last_sent_value(), Some(1));
        assert_eq!(scheduler.last_send(), Some(t1));
        // Not retried: nothing else was attempted
        assert_eq!(transport.attempts, 2);
    }
}
