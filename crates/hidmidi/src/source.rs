//! Sample delivery from the producer thread to the engine
//!
//! A [`SampleProducer`] runs on its own thread, blocking on the device, and
//! pushes [`ControlSample`]s into an unbounded channel in the order it
//! observed them. The engine and calibration drain the channel without
//! blocking through [`SampleStream`].

use crate::control::ControlSample;
use crate::error::{Error, Result};
use crate::shutdown::QuitSignal;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Something that reads one control and forwards its samples.
///
/// Implementations own their device handle; it is released when `run`
/// returns. `run` must return within one polling quantum (100 ms) of
/// `quit` being raised.
pub trait SampleProducer: Send {
    /// Forward samples to `tx` until `quit` is raised or the device fails
    fn run(self: Box<Self>, tx: Sender<ControlSample>, quit: QuitSignal) -> Result<()>;
}

/// Consumer end of the sample channel
pub struct SampleStream {
    rx: Receiver<ControlSample>,
}

impl SampleStream {
    /// Create a connected sender/stream pair
    pub fn channel() -> (Sender<ControlSample>, SampleStream) {
        let (tx, rx) = unbounded();
        (tx, SampleStream { rx })
    }

    /// Next buffered sample, without blocking
    pub fn try_next(&self) -> Option<ControlSample> {
        self.rx.try_recv().ok()
    }

    /// Drain all buffered samples in submission order
    pub fn drain(&self) -> impl Iterator<Item = ControlSample> + '_ {
        self.rx.try_iter()
    }

    /// Hand every buffered sample to `f` in submission order. Returns false
    /// once the stream is empty and the producer has dropped its sender.
    pub fn drain_into(&self, mut f: impl FnMut(ControlSample)) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(sample) => f(sample),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }
}

/// Owns the producer thread. Dropping the handle stops and joins it.
pub struct ProducerHandle {
    stop: QuitSignal,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ProducerHandle {
    /// Start `producer` on a new thread. The producer stops when `quit` is
    /// raised or the handle is stopped.
    pub fn spawn(producer: Box<dyn SampleProducer>, quit: &QuitSignal) -> Result<(Self, SampleStream)> {
        let (tx, stream) = SampleStream::channel();
        let stop = quit.child();
        let producer_stop = stop.clone();

        let thread = thread::Builder::new()
            .name("hidmidi-producer".to_string())
            .spawn(move || {
                let result = producer.run(tx, producer_stop);
                if let Err(ref e) = result {
                    log::error!("Sample producer stopped: {}", e);
                }
                result
            })?;

        Ok((
            Self {
                stop,
                thread: Some(thread),
            },
            stream,
        ))
    }

    /// Stop the producer and wait for it to release the device
    pub fn stop(mut self) -> Result<()> {
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        self.stop.raise();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Device("Sample producer thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        let _ = self.join();
    }
}

/// Cooperative wait: call `step` repeatedly until `deadline`, sleeping at
/// most `quantum` between calls. Returns false as soon as `quit` is raised.
pub fn pump_until(
    quit: &QuitSignal,
    deadline: Instant,
    quantum: Duration,
    mut step: impl FnMut(Instant),
) -> bool {
    loop {
        let now = Instant::now();
        step(now);
        if quit.is_raised() {
            return false;
        }
        if now >= deadline {
            return true;
        }
        thread::sleep(quantum.min(deadline - now));
    }
}

/// Producer that replays a fixed script of `(delay, value)` pairs
#[cfg(test)]
pub(crate) struct ScriptedProducer {
    pub script: Vec<(Duration, i64)>,
}

#[cfg(test)]
impl SampleProducer for ScriptedProducer {
    fn run(self: Box<Self>, tx: Sender<ControlSample>, quit: QuitSignal) -> Result<()> {
        for (delay, value) in self.script {
            thread::sleep(delay);
            if quit.is_raised() {
                break;
            }
            if tx.send(ControlSample::now(value)).is_err() {
                break;
            }
        }
        while !quit.is_raised() {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let (tx, stream) = SampleStream::channel();
        for value in [3, 1, 2, 2] {
            tx.send(ControlSample::now(value)).unwrap();
        }
        let values: Vec<i64> = stream.drain().map(|s| s.value).collect();
        assert_eq!(values, vec![3, 1, 2, 2]);
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_drain_into_keeps_timestamps_and_reports_disconnect() {
        let (tx, stream) = SampleStream::channel();
        let base = Instant::now();
        tx.send(ControlSample::at(10, base)).unwrap();
        tx.send(ControlSample::at(20, base + Duration::from_millis(3))).unwrap();

        let mut seen = Vec::new();
        assert!(stream.drain_into(|s| seen.push(s)));
        assert_eq!(seen.len(), 2);
        assert_eq!((seen[0].value, seen[0].timestamp), (10, base));
        assert_eq!(seen[1].timestamp - seen[0].timestamp, Duration::from_millis(3));

        tx.send(ControlSample::at(30, base)).unwrap();
        drop(tx);
        seen.clear();
        assert!(!stream.drain_into(|s| seen.push(s)));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].value, 30);
    }

    #[test]
    fn test_producer_handle_delivers_and_joins() {
        let quit = QuitSignal::new();
        let producer = ScriptedProducer {
            script: vec![(Duration::ZERO, 5), (Duration::ZERO, 6)],
        };
        let (handle, stream) = ProducerHandle::spawn(Box::new(producer), &quit).unwrap();

        let mut values = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while values.len() < 2 && Instant::now() < deadline {
            values.extend(stream.drain().map(|s| s.value));
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(values, vec![5, 6]);

        handle.stop().unwrap();
        // Stopping the producer does not raise the global signal
        assert!(!quit.is_raised());
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_pump_stops_on_quit() {
        let quit = QuitSignal::new();
        let mut calls = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        let completed = pump_until(&quit, deadline, Duration::from_millis(1), |_| {
            calls += 1;
            if calls == 3 {
                quit.raise();
            }
        });
        assert!(!completed);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_pump_runs_to_deadline() {
        let quit = QuitSignal::new();
        let start = Instant::now();
        let completed = pump_until(&quit, start + Duration::from_millis(20), Duration::from_millis(5), |_| {});
        assert!(completed);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
