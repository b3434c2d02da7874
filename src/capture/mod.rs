//! V4L2 capture driver.
//!
//! A [`Session`] owns one device node through the whole
//! open → init → stream lifecycle and delivers frames into a caller-owned
//! byte buffer. The lifecycle is a strict state machine:
//!
//! ```text
//! Closed -> open() -> Opened -> init() -> Initialised
//! Initialised -> start() -> Streaming
//! Streaming -> next_frame()* -> Streaming
//! Streaming -> stop() -> Initialised
//! Initialised -> uninit() -> Opened
//! Opened -> close() -> Closed
//! ```
//!
//! Operations issued in the wrong state fail with
//! [`Error::InvalidState`](crate::Error::InvalidState); no failure ever
//! terminates the process.

use std::os::raw::{c_int, c_void};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, mem};

use log::{debug, warn};

use crate::capability::{Capabilities, Flags};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::fourcc::FourCC;
use crate::fraction::Fraction;
use crate::io::{mmap, read, userptr, Method};
use crate::parameters::Parameters;
use crate::v4l2;
use crate::v4l2::videodev::*;

/// Buffers requested for the streaming I/O methods
const STREAM_BUFFERS: u32 = 4;

/// Identifiers are device node paths; anything longer than this is not one.
const MAX_IDENTIFIER_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Opened,
    Initialised,
    Streaming,
}

#[derive(Debug)]
enum Buffers {
    None,
    Read(read::Arena),
    Mmap(mmap::Arena),
    UserPtr(userptr::Arena),
}

/// Caller-visible frame store.
///
/// Reallocated only when the incoming frame size changes, so the exposed
/// slice keeps its address between same-sized frames.
#[derive(Debug)]
pub(crate) struct RgbBuffer {
    data: Vec<u8>,
}

impl RgbBuffer {
    pub(crate) fn new() -> Self {
        RgbBuffer { data: Vec::new() }
    }

    pub(crate) fn update(&mut self, frame: &[u8]) {
        if self.data.len() != frame.len() {
            self.data = vec![0u8; frame.len()];
        }
        self.data.copy_from_slice(frame);
    }

    pub(crate) fn get(&self) -> Option<&[u8]> {
        if self.data.is_empty() {
            None
        } else {
            Some(&self.data)
        }
    }
}

/// One active capture against one v4l2 device node.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    fd: c_int,
    state: State,
    force_read: bool,
    method: Method,
    format: Format,
    buffers: Buffers,
    rgb: RgbBuffer,
}

impl Session {
    /// Opens the device node read-write and non-blocking.
    ///
    /// The path must exist and be a character device.
    ///
    /// # Arguments
    ///
    /// * `path` - Device node path, e.g. "/dev/video0"
    /// * `force_read` - Use read() I/O even if the device streams
    pub fn open<P: AsRef<Path>>(path: P, force_read: bool) -> Result<Self> {
        let path = path.as_ref();

        if path.as_os_str().len() > MAX_IDENTIFIER_LEN {
            return Err(Error::Config(format!(
                "device identifier exceeds {} bytes",
                MAX_IDENTIFIER_LEN
            )));
        }

        let meta = fs::metadata(path)
            .map_err(|e| Error::DeviceUnavailable(format!("{}: {}", path.display(), e)))?;
        if !meta.file_type().is_char_device() {
            return Err(Error::DeviceUnavailable(format!(
                "{} is not a character device",
                path.display()
            )));
        }

        let fd = v4l2::open(path, libc::O_RDWR | libc::O_NONBLOCK)
            .map_err(|e| Error::DeviceUnavailable(format!("{}: {}", path.display(), e)))?;

        Ok(Session {
            path: path.to_path_buf(),
            fd,
            state: State::Opened,
            force_read,
            method: Method::Read,
            format: Format::new(0, 0, FourCC::new(b"RGB3")),
            buffers: Buffers::None,
            rgb: RgbBuffer::new(),
        })
    }

    /// Negotiates the format and allocates capture buffers, selecting the
    /// I/O method from the device capabilities and the configuration.
    ///
    /// # Arguments
    ///
    /// * `width` / `height` - Requested geometry; the driver may negotiate
    ///   different values, see [`format`](Session::format)
    /// * `fps` - Requested frame rate, 0.0 leaves the rate unconstrained
    pub fn init(&mut self, width: u32, height: u32, fps: f64) -> Result<()> {
        if self.state != State::Opened {
            return Err(Error::InvalidState("init requires an opened device"));
        }

        let caps = self.query_caps()?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(Error::Unsupported(format!(
                "{} is not a video capture device",
                self.path.display()
            )));
        }

        let method = Method::select(&caps, self.force_read);
        self.init_device(&caps, method, width, height, fps)
    }

    /// Like [`init`](Session::init), but with a caller-chosen I/O method.
    ///
    /// User-pointer I/O is never auto-selected; this is the entry point for
    /// integrations that want it.
    pub fn init_with_method(
        &mut self,
        width: u32,
        height: u32,
        fps: f64,
        method: Method,
    ) -> Result<()> {
        if self.state != State::Opened {
            return Err(Error::InvalidState("init requires an opened device"));
        }

        let caps = self.query_caps()?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(Error::Unsupported(format!(
                "{} is not a video capture device",
                self.path.display()
            )));
        }

        self.init_device(&caps, method, width, height, fps)
    }

    fn query_caps(&self) -> Result<Capabilities> {
        let mut raw: v4l2_capability = unsafe { mem::zeroed() };
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_QUERYCAP,
                &mut raw as *mut _ as *mut c_void,
            )
            .map_err(|e| match e.raw_os_error() {
                Some(libc::EINVAL) | Some(libc::ENOTTY) => {
                    Error::Unsupported(format!("{} is not a v4l2 device", self.path.display()))
                }
                _ => Error::Io(e),
            })?;
        }

        Ok(Capabilities::from(raw))
    }

    fn init_device(
        &mut self,
        caps: &Capabilities,
        method: Method,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Result<()> {
        match method {
            Method::Read => {
                if !caps.capabilities.contains(Flags::READ_WRITE) {
                    return Err(Error::Unsupported(format!(
                        "{} does not support read i/o",
                        self.path.display()
                    )));
                }
            }
            Method::Mmap | Method::UserPtr => {
                if !caps.capabilities.contains(Flags::STREAMING) {
                    return Err(Error::Unsupported(format!(
                        "{} does not support streaming i/o",
                        self.path.display()
                    )));
                }
            }
        }

        self.reset_crop();

        // VIDIOC_S_FMT may change width and height
        let mut fmt: v4l2_format = unsafe { mem::zeroed() };
        fmt.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        fmt.fmt.pix = Format::new(width, height, FourCC::new(b"RGB3")).into();
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_S_FMT,
                &mut fmt as *mut _ as *mut c_void,
            )?;
        }

        let mut format = Format::from(unsafe { fmt.fmt.pix });
        format.apply_driver_paranoia();

        self.set_rate(fps);

        self.buffers = match method {
            Method::Read => Buffers::Read(read::Arena::new(format.size as usize)),
            Method::Mmap => {
                let mut arena = mmap::Arena::new(self.fd);
                arena.allocate(STREAM_BUFFERS)?;
                Buffers::Mmap(arena)
            }
            Method::UserPtr => {
                let mut arena = userptr::Arena::new(self.fd);
                arena.allocate(STREAM_BUFFERS, format.size as usize)?;
                Buffers::UserPtr(arena)
            }
        };

        self.method = method;
        self.format = format;
        self.state = State::Initialised;
        Ok(())
    }

    // Reset cropping to the default rectangle. Devices without cropping
    // support report errors here, which are ignored.
    fn reset_crop(&self) {
        let mut cropcap: v4l2_cropcap = unsafe { mem::zeroed() };
        cropcap.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        let res = unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_CROPCAP,
                &mut cropcap as *mut _ as *mut c_void,
            )
        };
        if res.is_err() {
            return;
        }

        let mut crop: v4l2_crop = unsafe { mem::zeroed() };
        crop.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        crop.c = cropcap.defrect;
        let _ = unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_S_CROP,
                &mut crop as *mut _ as *mut c_void,
            )
        };
    }

    // A device that cannot do the requested rate still captures; rate
    // failures degrade to a warning.
    fn set_rate(&self, fps: f64) {
        let mut parm: v4l2_streamparm = unsafe { mem::zeroed() };
        parm.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        let res = unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_G_PARM,
                &mut parm as *mut _ as *mut c_void,
            )
        };
        if let Err(e) = res {
            warn!("unable to get frame rate: {}", e);
            return;
        }

        let params = Parameters::with_rate(fps);
        let mut capture: v4l2_captureparm = unsafe { parm.parm.capture };
        capture.timeperframe = params.interval.into();
        parm.parm.capture = capture;
        let res = unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_S_PARM,
                &mut parm as *mut _ as *mut c_void,
            )
        };
        if let Err(e) = res {
            warn!("unable to set frame rate: {}", e);
            return;
        }

        let res = unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_G_PARM,
                &mut parm as *mut _ as *mut c_void,
            )
        };
        match res {
            Ok(()) => {
                let actual = Fraction::from(unsafe { parm.parm.capture.timeperframe });
                debug!("negotiated frame interval: {}", actual);
            }
            Err(e) => warn!("unable to get frame rate: {}", e),
        }
    }

    /// Queues all buffers and starts the stream.
    ///
    /// A no-op for read I/O, which has no device-side queue.
    pub fn start(&mut self) -> Result<()> {
        if self.state != State::Initialised {
            return Err(Error::InvalidState("start requires an initialised device"));
        }

        match &mut self.buffers {
            Buffers::Read(_) => {}
            Buffers::Mmap(arena) => {
                for index in 0..arena.len() as u32 {
                    arena.queue(index)?;
                }
                self.stream_on()?;
            }
            Buffers::UserPtr(arena) => {
                for index in 0..arena.len() as u32 {
                    arena.queue(index)?;
                }
                self.stream_on()?;
            }
            Buffers::None => {
                return Err(Error::InvalidState("no buffers allocated"));
            }
        }

        self.state = State::Streaming;
        Ok(())
    }

    fn stream_on(&self) -> Result<()> {
        let mut typ: c_int = V4L2_BUF_TYPE_VIDEO_CAPTURE as c_int;
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_STREAMON,
                &mut typ as *mut _ as *mut c_void,
            )?;
        }
        Ok(())
    }

    fn stream_off(&self) -> Result<()> {
        let mut typ: c_int = V4L2_BUF_TYPE_VIDEO_CAPTURE as c_int;
        unsafe {
            v4l2::xioctl(
                self.fd,
                v4l2::vidioc::VIDIOC_STREAMOFF,
                &mut typ as *mut _ as *mut c_void,
            )?;
        }
        Ok(())
    }

    /// Blocks until the next frame has been copied into the session buffer
    /// or the timeout elapses.
    ///
    /// The wait is restarted when the device signals readiness but the
    /// driver then reports EAGAIN or a transient EIO.
    pub fn next_frame(&mut self, timeout: Duration) -> Result<()> {
        if self.state != State::Streaming {
            return Err(Error::InvalidState("next_frame requires a streaming device"));
        }

        loop {
            if !v4l2::wait_readable(self.fd, timeout)? {
                return Err(Error::Timeout);
            }

            if self.read_frame()? {
                return Ok(());
            }
            // EAGAIN: readiness without a frame, wait again
        }
    }

    // One frame delivery attempt. Ok(false) means "not ready" (EAGAIN, or
    // an EIO the v4l2 API allows ignoring); everything else is an error.
    fn read_frame(&mut self) -> Result<bool> {
        fn not_ready(e: &std::io::Error) -> bool {
            matches!(e.raw_os_error(), Some(libc::EAGAIN) | Some(libc::EIO))
        }

        match &mut self.buffers {
            Buffers::Read(arena) => match arena.fill(self.fd) {
                Ok(_) => {
                    self.rgb.update(arena.data());
                    Ok(true)
                }
                Err(ref e) if not_ready(e) => Ok(false),
                Err(e) => Err(Error::Io(e)),
            },
            Buffers::Mmap(arena) => {
                let index = match arena.dequeue() {
                    Ok(index) => index,
                    Err(ref e) if not_ready(e) => return Ok(false),
                    Err(e) => return Err(Error::Io(e)),
                };
                self.rgb.update(arena.get(index));
                arena.queue(index)?;
                Ok(true)
            }
            Buffers::UserPtr(arena) => {
                let index = match arena.dequeue() {
                    Ok(index) => index,
                    Err(ref e) if not_ready(e) => return Ok(false),
                    Err(e) => return Err(Error::Io(e)),
                };
                self.rgb.update(arena.get(index));
                arena.queue(index)?;
                Ok(true)
            }
            Buffers::None => Err(Error::InvalidState("no buffers allocated")),
        }
    }

    /// Stops the stream; buffers stay allocated.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != State::Streaming {
            return Err(Error::InvalidState("stop requires a streaming device"));
        }

        match self.buffers {
            Buffers::Read(_) => {}
            _ => self.stream_off()?,
        }

        self.state = State::Initialised;
        Ok(())
    }

    /// Releases all capture buffers.
    pub fn uninit(&mut self) -> Result<()> {
        if self.state != State::Initialised {
            return Err(Error::InvalidState("uninit requires an initialised device"));
        }

        match &mut self.buffers {
            Buffers::Mmap(arena) => arena.release()?,
            Buffers::UserPtr(arena) => arena.release()?,
            _ => {}
        }
        self.buffers = Buffers::None;

        self.state = State::Opened;
        Ok(())
    }

    /// Closes the device node.
    pub fn close(&mut self) -> Result<()> {
        if self.state != State::Opened {
            return Err(Error::InvalidState("close requires an uninitialised device"));
        }

        v4l2::close(self.fd)?;
        self.fd = -1;
        self.state = State::Closed;
        Ok(())
    }

    /// The negotiated capture format; geometry may differ from the request.
    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    /// The active I/O method, fixed at init time.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The most recently captured frame.
    ///
    /// The slice stays valid (and keeps its address, for unchanged frame
    /// sizes) until the next [`next_frame`](Session::next_frame) call or
    /// the end of the session.
    pub fn image(&self) -> Option<&[u8]> {
        self.rgb.get()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == State::Streaming {
            if let Err(e) = self.stop() {
                warn!("failed to stop capture on {}: {}", self.path.display(), e);
            }
        }
        if self.state == State::Initialised {
            if let Err(e) = self.uninit() {
                warn!("failed to uninit {}: {}", self.path.display(), e);
            }
        }
        if self.state == State::Opened {
            if let Err(e) = self.close() {
                warn!("failed to close {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_buffer_reallocates_on_size_change() {
        let mut rgb = RgbBuffer::new();
        assert!(rgb.get().is_none());

        rgb.update(&[1, 2, 3, 4]);
        assert_eq!(rgb.get().unwrap(), &[1u8, 2, 3, 4][..]);
        let addr = rgb.get().unwrap().as_ptr();

        // same size: contents replaced in place
        rgb.update(&[5, 6, 7, 8]);
        assert_eq!(rgb.get().unwrap(), &[5u8, 6, 7, 8][..]);
        assert_eq!(rgb.get().unwrap().as_ptr(), addr);

        // different size: reallocated
        rgb.update(&[9, 9]);
        assert_eq!(rgb.get().unwrap(), &[9u8, 9][..]);
        assert_eq!(rgb.get().unwrap().len(), 2);
    }

    #[test]
    fn open_rejects_missing_path() {
        let err = Session::open("/dev/video-does-not-exist", false).unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
    }

    #[test]
    fn open_rejects_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video0");
        fs::write(&path, b"pixels").unwrap();

        let err = Session::open(&path, false).unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
    }

    #[test]
    fn open_rejects_oversized_identifiers() {
        let path = format!("/dev/{}", "v".repeat(300));
        let err = Session::open(&path, false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    // /dev/null is a character device but not a v4l2 one, which exercises
    // the state machine without capture hardware.
    #[test]
    fn init_rejects_non_v4l2_char_devices() {
        let mut session = Session::open("/dev/null", false).unwrap();
        let err = session.init(640, 480, 0.0).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn lifecycle_enforces_state_order() {
        let mut session = Session::open("/dev/null", false).unwrap();

        assert!(matches!(
            session.start().unwrap_err(),
            Error::InvalidState(_)
        ));
        assert!(matches!(
            session.next_frame(Duration::from_millis(10)).unwrap_err(),
            Error::InvalidState(_)
        ));
        assert!(matches!(session.stop().unwrap_err(), Error::InvalidState(_)));
        assert!(matches!(
            session.uninit().unwrap_err(),
            Error::InvalidState(_)
        ));

        session.close().unwrap();
        assert!(matches!(
            session.close().unwrap_err(),
            Error::InvalidState(_)
        ));
    }

    // Requires a real capture device.
    #[test]
    #[ignore]
    fn streams_frames_from_video0() {
        let mut session = Session::open("/dev/video0", false).unwrap();
        session.init(640, 480, 0.0).unwrap();
        session.start().unwrap();

        for _ in 0..4 {
            session.next_frame(Duration::from_secs(5)).unwrap();
            let image = session.image().unwrap();
            assert_eq!(image.len(), session.format().size as usize);
        }

        session.stop().unwrap();
        session.uninit().unwrap();
        session.close().unwrap();
    }
}
