//! FFI definitions mirroring the `videodev2.h` structures used by this
//! crate.
//!
//! We carry our own copies of these instead of generating bindings at build
//! time: the capture driver touches a small, stable subset of the UAPI, and
//! the request codes in [`vidioc`](super::vidioc) are computed from these
//! very definitions, so struct sizes and ioctl numbers always agree.

#![allow(non_camel_case_types)]

use std::os::raw::{c_ulong, c_void};

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;

pub const V4L2_FIELD_NONE: u32 = 1;

pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_MEMORY_USERPTR: u32 = 2;

#[repr(C)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_pix_format {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

#[repr(C)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format_union,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_format_union {
    pub pix: v4l2_pix_format,
    // The kernel union also holds pointer-bearing variants (v4l2_window et
    // al.), so it is 200 bytes with pointer alignment. raw_data keeps the
    // size, the zero-length member keeps the alignment on every arch.
    pub raw_data: [u8; 200],
    pub _align: [c_ulong; 0],
}

#[repr(C)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer_m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_buffer_m {
    pub offset: u32,
    pub userptr: c_ulong,
    pub planes: *mut c_void,
    pub fd: i32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct v4l2_fract {
    pub numerator: u32,
    pub denominator: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_captureparm {
    pub capability: u32,
    pub capturemode: u32,
    pub timeperframe: v4l2_fract,
    pub extendedmode: u32,
    pub readbuffers: u32,
    pub reserved: [u32; 4],
}

#[repr(C)]
pub struct v4l2_streamparm {
    pub type_: u32,
    pub parm: v4l2_streamparm_union,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_streamparm_union {
    pub capture: v4l2_captureparm,
    pub raw_data: [u8; 200],
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct v4l2_rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
pub struct v4l2_cropcap {
    pub type_: u32,
    pub bounds: v4l2_rect,
    pub defrect: v4l2_rect,
    pub pixelaspect: v4l2_fract,
}

#[repr(C)]
pub struct v4l2_crop {
    pub type_: u32,
    pub c: v4l2_rect,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    // The ioctl request codes encode the argument size, so a wrong struct
    // layout would make every call fail with ENOTTY. Pin the layouts that
    // differ between targets.
    #[test]
    #[cfg(target_pointer_width = "64")]
    fn abi_sizes() {
        assert_eq!(mem::size_of::<v4l2_capability>(), 104);
        assert_eq!(mem::size_of::<v4l2_format>(), 208);
        assert_eq!(mem::size_of::<v4l2_requestbuffers>(), 20);
        assert_eq!(mem::size_of::<v4l2_buffer>(), 88);
        assert_eq!(mem::size_of::<v4l2_streamparm>(), 204);
    }

    #[test]
    fn format_union_holds_pix() {
        assert!(mem::size_of::<v4l2_pix_format>() <= 200);
    }
}
