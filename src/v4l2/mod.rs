//! Thin safe-ish wrappers around the raw v4l2 kernel interface: syscall
//! plumbing, ioctl request codes and the `videodev2.h` structures.

pub mod videodev;

pub mod vidioc;

mod api;
pub use api::*;
