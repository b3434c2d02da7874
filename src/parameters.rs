use bitflags::bitflags;
use std::{fmt, mem};

use crate::fraction::Fraction;
use crate::v4l2::videodev::v4l2_captureparm;

bitflags! {
    /// Streaming parameter capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const TIME_PER_FRAME = 0x1000;
    }
}

impl From<u32> for Capabilities {
    fn from(caps: u32) -> Self {
        Capabilities::from_bits_truncate(caps)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Copy, Clone)]
/// Streaming parameters (single-planar)
pub struct Parameters {
    pub capabilities: Capabilities,
    pub interval: Fraction,
}

impl Parameters {
    pub fn new(interval: Fraction) -> Self {
        Parameters {
            capabilities: Capabilities::from(0),
            interval,
        }
    }

    /// Time-per-frame interval for a decimal frame rate.
    ///
    /// The kernel expresses rates as an interval fraction, so the 100/x
    /// encoding keeps two decimal places of the requested rate. A rate of
    /// zero clears the interval, leaving the rate unconstrained.
    pub fn with_rate(fps: f64) -> Self {
        let interval = if fps == 0.0 {
            Fraction::new(0, 0)
        } else {
            Fraction::new(100, (fps * 100.0) as u32)
        };

        Parameters::new(interval)
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "capabilities : {}", self.capabilities)?;
        writeln!(f, "interval     : {} [s]", self.interval)?;
        Ok(())
    }
}

impl From<v4l2_captureparm> for Parameters {
    fn from(params: v4l2_captureparm) -> Self {
        Parameters {
            capabilities: Capabilities::from(params.capability),
            interval: Fraction::from(params.timeperframe),
        }
    }
}

impl From<Parameters> for v4l2_captureparm {
    fn from(parameters: Parameters) -> Self {
        let mut params: v4l2_captureparm = unsafe { mem::zeroed() };
        params.capability = parameters.capabilities.bits();
        params.timeperframe = parameters.interval.into();
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_encoding() {
        assert_eq!(Parameters::with_rate(30.0).interval, Fraction::new(100, 3000));
        assert_eq!(Parameters::with_rate(0.0).interval, Fraction::new(0, 0));
        // 1000/33 ms per frame
        assert_eq!(
            Parameters::with_rate(1000.0 / 33.0).interval,
            Fraction::new(100, 3030)
        );
    }
}
