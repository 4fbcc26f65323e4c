//! evdev backend (Linux)
//!
//! Devices are the `/dev/input/event*` nodes that report at least one key
//! or absolute axis. Reading requires access to the node, usually through
//! membership in the `input` group.

use super::{DeviceEnumerator, DeviceInfo};
use crate::control::{ControlDescriptor, ControlKind, ControlSample};
use crate::error::{Error, Result};
use crate::shutdown::QuitSignal;
use crate::source::SampleProducer;
use ::evdev::{Device, Key};
use crossbeam_channel::Sender;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use std::io;
use std::os::unix::io::AsRawFd;

/// Longest time the producer waits before checking the quit signal
const POLL_TIMEOUT_MS: i32 = 100;

/// Enumerates devices through evdev
pub struct EvdevEnumerator;

fn device_info(path: std::path::PathBuf, device: &Device) -> DeviceInfo {
    DeviceInfo {
        path,
        name: device.name().unwrap_or("Unknown Device").to_string(),
        buttons: device.supported_keys().map(|keys| keys.iter().count()).unwrap_or(0),
        axes: device
            .supported_absolute_axes()
            .map(|axes| axes.iter().count())
            .unwrap_or(0),
    }
}

fn open_device(info: &DeviceInfo) -> Result<Device> {
    Device::open(&info.path)
        .map_err(|e| Error::Device(format!("Cannot open {}: {}", info.path.display(), e)))
}

impl DeviceEnumerator for EvdevEnumerator {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut devices: Vec<DeviceInfo> = ::evdev::enumerate()
            .map(|(path, device)| device_info(path, &device))
            .filter(|info| info.buttons > 0 || info.axes > 0)
            .collect();
        devices.sort_by(|a, b| a.path.cmp(&b.path));
        log::debug!("Found {} input devices", devices.len());
        Ok(devices)
    }

    fn list_controls(&self, info: &DeviceInfo) -> Result<Vec<ControlDescriptor>> {
        let device = open_device(info)?;
        let mut controls = Vec::new();

        if let Some(keys) = device.supported_keys() {
            for key in keys.iter() {
                controls.push(ControlDescriptor::button(key.code(), format!("{:?}", key)));
            }
        }

        if let Some(axes) = device.supported_absolute_axes() {
            let state = device.get_abs_state()?;
            for axis in axes.iter() {
                let absinfo = &state[axis.0 as usize];
                controls.push(ControlDescriptor::axis(
                    axis.0,
                    format!("{:?}", axis),
                    absinfo.minimum as i64,
                    absinfo.maximum as i64,
                ));
            }
        }

        Ok(controls)
    }

    fn open(&self, info: &DeviceInfo, control: &ControlDescriptor) -> Result<Box<dyn SampleProducer>> {
        let device = open_device(info)?;
        log::info!("Opened input device: {} ({})", info.name, info.path.display());
        Ok(Box::new(EvdevProducer {
            device,
            control: control.clone(),
        }))
    }
}

/// Reads one control from an owned evdev device
pub struct EvdevProducer {
    device: Device,
    control: ControlDescriptor,
}

impl EvdevProducer {
    /// Current state of the control, read directly from the device
    fn initial_value(&self) -> Result<i64> {
        let code = self.control.address.code;
        match self.control.kind {
            ControlKind::Button => {
                let keys = self.device.get_key_state()?;
                Ok(keys.contains(Key::new(code)) as i64)
            }
            ControlKind::Axis => {
                let state = self.device.get_abs_state()?;
                state
                    .get(code as usize)
                    .map(|absinfo| absinfo.value as i64)
                    .ok_or_else(|| Error::Device(format!("Axis code {} out of range", code)))
            }
        }
    }

    /// Wait until the device is readable. Returns false on timeout.
    fn wait_readable(&self) -> Result<bool> {
        let mut fds = [PollFd::new(self.device.as_raw_fd(), PollFlags::POLLIN)];
        let ready = match poll(&mut fds, POLL_TIMEOUT_MS) {
            Ok(ready) => ready,
            Err(Errno::EINTR) => return Ok(false),
            Err(errno) => return Err(io::Error::from(errno).into()),
        };
        let revents = fds[0].revents().unwrap_or_else(PollFlags::empty);
        check_revents(revents)?;
        Ok(ready > 0)
    }
}

/// Fail when poll reports the device as gone
fn check_revents(revents: PollFlags) -> Result<()> {
    if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL) {
        return Err(Error::Device("Input device disconnected".to_string()));
    }
    Ok(())
}

impl SampleProducer for EvdevProducer {
    fn run(mut self: Box<Self>, tx: Sender<ControlSample>, quit: QuitSignal) -> Result<()> {
        let event_type = self.control.address.event_type;
        let code = self.control.address.code;
        let is_button = self.control.is_button();

        match self.initial_value() {
            Ok(value) => {
                if tx.send(ControlSample::now(value)).is_err() {
                    return Ok(());
                }
            }
            Err(e) => log::warn!("Cannot read initial state of {}: {}", self.control.name, e),
        }

        while !quit.is_raised() {
            if !self.wait_readable()? {
                continue;
            }

            let values: Vec<i64> = self
                .device
                .fetch_events()?
                .filter(|event| event.event_type().0 == event_type && event.code() == code)
                .map(|event| {
                    let value = event.value() as i64;
                    // Key autorepeat reports 2
                    if is_button {
                        (value != 0) as i64
                    } else {
                        value
                    }
                })
                .collect();

            for value in values {
                log::trace!("{} = {}", self.control.name, value);
                if tx.send(ControlSample::now(value)).is_err() {
                    return Ok(());
                }
            }
        }

        log::debug!("Input producer for {} stopped", self.control.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_hangup_is_reported_as_disconnect() {
        assert!(check_revents(PollFlags::POLLIN).is_ok());
        assert!(check_revents(PollFlags::empty()).is_ok());
        assert!(matches!(check_revents(PollFlags::POLLHUP), Err(Error::Device(_))));
        assert!(matches!(
            check_revents(PollFlags::POLLIN | PollFlags::POLLERR),
            Err(Error::Device(_))
        ));
    }

    #[test]
    fn test_poll_times_out_and_wakes_on_data() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut fds = [PollFd::new(a.as_raw_fd(), PollFlags::POLLIN)];
        assert_eq!(poll(&mut fds, 10).unwrap(), 0);

        std::io::Write::write_all(&mut &b, b"x").unwrap();
        let mut fds = [PollFd::new(a.as_raw_fd(), PollFlags::POLLIN)];
        assert_eq!(poll(&mut fds, POLL_TIMEOUT_MS).unwrap(), 1);
        assert!(fds[0].revents().unwrap().contains(PollFlags::POLLIN));
    }
}
