use bitflags::bitflags;
use std::{fmt, str};

use crate::v4l2::videodev::v4l2_capability;

bitflags! {
    /// Device capability flags as reported by VIDIOC_QUERYCAP
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        const VIDEO_CAPTURE         = 0x0000_0001;
        const VIDEO_OUTPUT          = 0x0000_0002;
        const VIDEO_OVERLAY         = 0x0000_0004;
        const VIDEO_CAPTURE_MPLANE  = 0x0000_1000;
        const VIDEO_OUTPUT_MPLANE   = 0x0000_2000;
        const VIDEO_M2M             = 0x0000_8000;
        const READ_WRITE            = 0x0100_0000;
        const ASYNC_IO              = 0x0200_0000;
        const STREAMING             = 0x0400_0000;
        const DEVICE_CAPS           = 0x8000_0000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Self {
        Self::from_bits_truncate(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
/// Device capabilities
pub struct Capabilities {
    /// Driver name, e.g. uvc for usb video class devices
    pub driver: String,
    /// Card name
    pub card: String,
    /// Bus name, e.g. USB or PCI
    pub bus: String,
    /// Version number MAJOR.MINOR.PATCH
    pub version: (u8, u8, u8),

    /// Capability flags of the physical device as a whole
    pub capabilities: Flags,
}

fn c_string(buf: &[u8]) -> String {
    str::from_utf8(buf)
        .unwrap_or("")
        .trim_matches(char::from(0))
        .to_string()
}

impl From<v4l2_capability> for Capabilities {
    fn from(cap: v4l2_capability) -> Self {
        Self {
            driver: c_string(&cap.driver),
            card: c_string(&cap.card),
            bus: c_string(&cap.bus_info),
            version: (
                ((cap.version >> 16) & 0xff) as u8,
                ((cap.version >> 8) & 0xff) as u8,
                (cap.version & 0xff) as u8,
            ),
            capabilities: Flags::from(cap.capabilities),
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Driver       : {}", self.driver)?;
        writeln!(f, "Card         : {}", self.card)?;
        writeln!(f, "Bus          : {}", self.bus)?;
        writeln!(
            f,
            "Version      : {}.{}.{}",
            self.version.0, self.version.1, self.version.2
        )?;
        writeln!(f, "Capabilities : {}", self.capabilities)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_name_is_nul_trimmed() {
        let mut raw: v4l2_capability = unsafe { std::mem::zeroed() };
        raw.card[..7].copy_from_slice(b"MockCam");
        raw.capabilities = (Flags::VIDEO_CAPTURE | Flags::STREAMING).bits();
        raw.version = 0x0005_0A01;

        let caps = Capabilities::from(raw);
        assert_eq!(caps.card, "MockCam");
        assert_eq!(caps.version, (5, 10, 1));
        assert!(caps.capabilities.contains(Flags::VIDEO_CAPTURE));
        assert!(caps.capabilities.contains(Flags::STREAMING));
        assert!(!caps.capabilities.contains(Flags::READ_WRITE));
    }
}
