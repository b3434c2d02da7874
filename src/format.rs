use std::{fmt, mem};

use crate::fourcc::FourCC;
use crate::v4l2::videodev::{v4l2_pix_format, V4L2_FIELD_NONE};

#[derive(Debug, Copy, Clone)]
/// Negotiated capture format (single-planar, progressive)
pub struct Format {
    /// width in pixels
    pub width: u32,
    /// height in pixels
    pub height: u32,
    /// pixelformat code
    pub fourcc: FourCC,
    /// bytes per line
    pub stride: u32,
    /// number of bytes required to store an image
    pub size: u32,
}

impl Format {
    /// Returns a capture format request
    ///
    /// Stride and image size are left zero; the driver fills them in during
    /// negotiation.
    ///
    /// # Arguments
    ///
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    /// * `fourcc` - Four character code (pixelformat)
    pub fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Format {
            width,
            height,
            fourcc,
            stride: 0,
            size: 0,
        }
    }

    /// Applies the minimum stride and image size a conforming driver would
    /// report. Some drivers return garbage here, so the negotiated values
    /// are clamped from below.
    pub fn apply_driver_paranoia(&mut self) {
        let min_stride = self.width * 2;
        if self.stride < min_stride {
            self.stride = min_stride;
        }
        let min_size = self.stride * self.height;
        if self.size < min_size {
            self.size = min_size;
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "width  : {}", self.width)?;
        writeln!(f, "height : {}", self.height)?;
        writeln!(f, "fourcc : {}", self.fourcc)?;
        writeln!(f, "stride : {}", self.stride)?;
        writeln!(f, "size   : {}", self.size)?;
        Ok(())
    }
}

impl From<v4l2_pix_format> for Format {
    fn from(fmt: v4l2_pix_format) -> Self {
        Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.pixelformat),
            stride: fmt.bytesperline,
            size: fmt.sizeimage,
        }
    }
}

impl From<Format> for v4l2_pix_format {
    fn from(format: Format) -> Self {
        let mut fmt: v4l2_pix_format = unsafe { mem::zeroed() };
        fmt.width = format.width;
        fmt.height = format.height;
        fmt.pixelformat = format.fourcc.into();
        fmt.field = V4L2_FIELD_NONE;
        fmt.bytesperline = format.stride;
        fmt.sizeimage = format.size;
        fmt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paranoia_clamps_from_below() {
        let mut format = Format::new(640, 480, FourCC::new(b"RGB3"));
        format.stride = 100;
        format.size = 1000;
        format.apply_driver_paranoia();
        assert_eq!(format.stride, 1280);
        assert_eq!(format.size, 1280 * 480);
    }

    #[test]
    fn paranoia_keeps_sane_values() {
        let mut format = Format::new(640, 480, FourCC::new(b"RGB3"));
        format.stride = 640 * 3;
        format.size = 640 * 3 * 480;
        format.apply_driver_paranoia();
        assert_eq!(format.stride, 640 * 3);
        assert_eq!(format.size, 640 * 3 * 480);
    }
}
