use std::fmt;
use std::slice;

/// A video source known to the system.
///
/// A device is a value: it owns its human-readable name and its back-end
/// specific identifier (a `/dev/videoN` path for v4l2, a stringified index
/// for videoInput-style capture, a locator for pipeline capture) and can be
/// cloned freely. It outlives any session started from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    name: String,
    identifier: String,
}

impl Device {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Device {
            name: name.into(),
            identifier: identifier.into(),
        }
    }

    /// Human-readable device name, e.g. the card name reported by the driver
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Back-end specific identifier used to open the device
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.identifier)
    }
}

/// An ordered list of devices produced by enumeration.
///
/// The order reflects enumeration order. The list is independent of any
/// session; dropping it does not affect captures started from its entries.
#[derive(Debug, Default)]
pub struct DeviceList {
    devices: Vec<Device>,
}

impl DeviceList {
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn first(&self) -> Option<&Device> {
        self.devices.first()
    }

    pub fn iter(&self) -> slice::Iter<'_, Device> {
        self.devices.iter()
    }
}

impl From<Vec<Device>> for DeviceList {
    fn from(devices: Vec<Device>) -> Self {
        DeviceList { devices }
    }
}

impl<'a> IntoIterator for &'a DeviceList {
    type Item = &'a Device;
    type IntoIter = slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

#[cfg(all(target_os = "linux", feature = "v4l2"))]
mod probe {
    use std::mem;
    use std::path::Path;

    use log::debug;

    use super::{Device, DeviceList};
    use crate::capability::{Capabilities, Flags};
    use crate::v4l2;
    use crate::v4l2::videodev::v4l2_capability;

    /// Number of /dev/videoN nodes probed during enumeration
    const NUM_DEVICES_SEARCH: usize = 16;

    /// Returns a list of capture devices currently known to the system
    ///
    /// Candidate nodes /dev/video0 .. /dev/video15 are probed in order;
    /// nodes that are missing, fail to open or do not advertise the video
    /// capture capability are skipped silently.
    ///
    /// # Example
    ///
    /// ```no_run
    /// for dev in &framegrab::device::enum_devices() {
    ///     println!("{}: {}", dev.identifier(), dev.name());
    /// }
    /// ```
    pub fn enum_devices() -> DeviceList {
        scan(Path::new("/dev"))
    }

    pub(crate) fn scan(root: &Path) -> DeviceList {
        let mut devices = Vec::new();

        for i in 0..NUM_DEVICES_SEARCH {
            let path = root.join(format!("video{}", i));
            if !path.exists() {
                continue;
            }

            match query(&path) {
                Some(device) => devices.push(device),
                None => debug!("skipping {}: not a capture device", path.display()),
            }
        }

        DeviceList::from(devices)
    }

    fn query(path: &Path) -> Option<Device> {
        let fd = match v4l2::open(path, libc::O_RDONLY) {
            Ok(fd) => fd,
            Err(e) => {
                debug!("error opening {}: {}", path.display(), e);
                return None;
            }
        };

        let mut caps: v4l2_capability = unsafe { mem::zeroed() };
        let res = unsafe {
            v4l2::xioctl(
                fd,
                v4l2::vidioc::VIDIOC_QUERYCAP,
                &mut caps as *mut _ as *mut std::os::raw::c_void,
            )
        };

        if let Err(e) = v4l2::close(fd) {
            debug!("error closing {}: {}", path.display(), e);
        }

        res.ok()?;

        let caps = Capabilities::from(caps);
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return None;
        }

        Some(Device::new(caps.card, path.to_string_lossy()))
    }
}

#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub use probe::enum_devices;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_is_a_value() {
        let dev = Device::new("MockCam", "/dev/video0");
        let copy = dev.clone();
        drop(dev);
        assert_eq!(copy.name(), "MockCam");
        assert_eq!(copy.identifier(), "/dev/video0");
    }

    #[test]
    fn list_preserves_enumeration_order() {
        let list = DeviceList::from(vec![
            Device::new("a", "0"),
            Device::new("b", "1"),
            Device::new("c", "2"),
        ]);

        assert_eq!(list.len(), 3);
        let names: Vec<&str> = list.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(list.get(1).unwrap().identifier(), "1");
        assert!(list.get(3).is_none());
    }

    #[cfg(all(target_os = "linux", feature = "v4l2"))]
    mod probe {
        use super::super::probe::scan;

        #[test]
        fn empty_dir_yields_no_devices() {
            let dir = tempfile::tempdir().unwrap();
            assert!(scan(dir.path()).is_empty());
        }

        #[test]
        fn regular_files_are_skipped() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("video0"), b"not a device").unwrap();
            assert!(scan(dir.path()).is_empty());
        }
    }
}
