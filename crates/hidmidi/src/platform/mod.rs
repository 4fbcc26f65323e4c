//! Input device backends
//!
//! A backend lists devices and their controls, and opens a
//! [`SampleProducer`] for one control. The device handle is moved into the
//! producer and released when it stops.

#[cfg(target_os = "linux")]
pub mod linux;

use crate::control::ControlDescriptor;
use crate::error::{Error, Result};
use crate::source::SampleProducer;
use std::fmt;
use std::path::PathBuf;

/// An input device that exposes at least one button or absolute axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device node
    pub path: PathBuf,
    /// Name reported by the device
    pub name: String,
    /// Number of buttons
    pub buttons: usize,
    /// Number of absolute axes
    pub axes: usize,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) [Buttons: {}, Axes: {}]",
            self.name,
            self.path.display(),
            self.buttons,
            self.axes
        )
    }
}

/// Device discovery and access for one platform
pub trait DeviceEnumerator {
    /// All usable input devices
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Buttons and axes of `device`, buttons first
    fn list_controls(&self, device: &DeviceInfo) -> Result<Vec<ControlDescriptor>>;

    /// Open `device` and return a producer for `control`
    fn open(&self, device: &DeviceInfo, control: &ControlDescriptor) -> Result<Box<dyn SampleProducer>>;

    /// Find a configured device again: by node path first, then by name
    fn find_device(&self, path: &str, name: &str) -> Result<DeviceInfo> {
        let devices = self.list_devices()?;
        if let Some(device) = devices.iter().find(|d| d.path.to_string_lossy() == path) {
            return Ok(device.clone());
        }
        if !name.is_empty() {
            if let Some(device) = devices.iter().find(|d| d.name == name) {
                log::warn!(
                    "Device '{}' moved from {} to {}",
                    name,
                    path,
                    device.path.display()
                );
                return Ok(device.clone());
            }
        }
        Err(Error::Device(format!(
            "Configured device '{}' ({}) not found",
            name, path
        )))
    }
}

/// The backend for the current platform
#[cfg(target_os = "linux")]
pub fn default_enumerator() -> Result<Box<dyn DeviceEnumerator>> {
    Ok(Box::new(linux::EvdevEnumerator))
}

/// The backend for the current platform
#[cfg(not(target_os = "linux"))]
pub fn default_enumerator() -> Result<Box<dyn DeviceEnumerator>> {
    Err(Error::Device("No input backend for this platform".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEnumerator(Vec<DeviceInfo>);

    impl DeviceEnumerator for FakeEnumerator {
        fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
            Ok(self.0.clone())
        }

        fn list_controls(&self, _device: &DeviceInfo) -> Result<Vec<ControlDescriptor>> {
            Ok(Vec::new())
        }

        fn open(&self, _device: &DeviceInfo, _control: &ControlDescriptor) -> Result<Box<dyn SampleProducer>> {
            Err(Error::Device("not supported".to_string()))
        }
    }

    fn device(path: &str, name: &str) -> DeviceInfo {
        DeviceInfo {
            path: PathBuf::from(path),
            name: name.to_string(),
            buttons: 12,
            axes: 6,
        }
    }

    fn enumerator() -> FakeEnumerator {
        FakeEnumerator(vec![
            device("/dev/input/event3", "Logitech Extreme 3D"),
            device("/dev/input/event5", "Wireless Controller"),
        ])
    }

    #[test]
    fn test_find_by_path() {
        let found = enumerator()
            .find_device("/dev/input/event5", "Something Else")
            .unwrap();
        assert_eq!(found.name, "Wireless Controller");
    }

    #[test]
    fn test_find_falls_back_to_name() {
        let found = enumerator()
            .find_device("/dev/input/event9", "Logitech Extreme 3D")
            .unwrap();
        assert_eq!(found.path, PathBuf::from("/dev/input/event3"));
    }

    #[test]
    fn test_missing_device_is_error() {
        let result = enumerator().find_device("/dev/input/event9", "Gone");
        assert!(matches!(result, Err(Error::Device(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            device("/dev/input/event3", "Stick").to_string(),
            "Stick (/dev/input/event3) [Buttons: 12, Axes: 6]"
        );
    }
}
