//! Cross-platform video frame capture.
//!
//! This crate enumerates attached video sources, negotiates a pixel format
//! and frame geometry with one of them, and delivers successive
//! uncompressed frames into a caller-visible byte buffer. Three back-ends
//! share the public contract:
//!
//! * **v4l2** (Linux, default feature `v4l2`): speaks directly to the
//!   kernel video layer. Devices advertising streaming I/O are captured
//!   through a ring of memory-mapped kernel buffers; others fall back to
//!   plain read() calls. User-pointer I/O is available for integrations
//!   that want caller-owned buffers. Frames are delivered as RGB24.
//! * **videoInput-style** ([`VideoInput`]): wraps a platform library that
//!   already encapsulates enumeration, setup and pixel polling, as found
//!   on Windows. Frames are delivered as BGR24.
//! * **media-pipeline** (feature `gst`): expresses capture as a GStreamer
//!   graph (source → convert → app-sink) opened from a URI, a file path or
//!   a pipeline description. Frames are delivered as BGR, GRAY8 or raw
//!   bayer, as negotiated through the sink caps.
//!
//! The [`Grabber`] facade owns the chosen back-end and drives the session
//! lifecycle:
//!
//! ```no_run
//! use framegrab::Grabber;
//!
//! let mut grabber = Grabber::new();
//! grabber.start_session(640, 480, 33, None)?;
//!
//! grabber.next_frame()?;
//! let frame = grabber.image().unwrap();
//! assert_eq!(
//!     frame.len() as u32,
//!     grabber.width() * grabber.height() * 3
//! );
//!
//! grabber.stop_session();
//! # Ok::<(), framegrab::Error>(())
//! ```
//!
//! `next_frame` is the only blocking operation; its wait is bounded by
//! [`Grabber::set_timeout`]. One session is driven from one thread of
//! control; distinct sessions against distinct devices may run in
//! parallel.

pub mod config;
pub use config::Config;

pub mod device;
pub use device::{Device, DeviceList};

mod error;
pub use error::{Error, Result};

mod fourcc;
pub use fourcc::FourCC;

mod fraction;
pub use fraction::Fraction;

pub mod grabber;
pub use grabber::Grabber;

pub mod videoinput;
pub use videoinput::VideoInput;

#[cfg(all(target_os = "linux", feature = "v4l2"))]
mod capability;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub use capability::Capabilities;

#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod capture;

#[cfg(all(target_os = "linux", feature = "v4l2"))]
mod format;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub use format::Format;

#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod io;

#[cfg(all(target_os = "linux", feature = "v4l2"))]
mod memory;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub use memory::Memory;

#[cfg(all(target_os = "linux", feature = "v4l2"))]
mod parameters;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub use parameters::Parameters;

#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod v4l2;

#[cfg(feature = "gst")]
pub mod pipeline;
