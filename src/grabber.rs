//! Public capture facade.
//!
//! A [`Grabber`] owns one back-end and at most one active session, and
//! translates the public operations (enumerate, start, grab, stop) into
//! back-end calls. The back-end is picked at construction time and held as
//! a plain enum variant, so every dispatch is explicit.

use std::time::Duration;

use crate::config::Config;
use crate::device::{Device, DeviceList};
use crate::error::{Error, Result};
use crate::videoinput::{self, VideoInput};

#[cfg(all(target_os = "linux", feature = "v4l2"))]
use crate::capture;
#[cfg(feature = "gst")]
use crate::pipeline;

/// Default bound on the per-frame wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

enum Backend {
    #[cfg(all(target_os = "linux", feature = "v4l2"))]
    V4l2(Option<capture::Session>),
    VideoInput(videoinput::Session),
    #[cfg(feature = "gst")]
    Pipeline(Option<pipeline::Session>),
}

/// Video capture facade over the platform back-ends.
///
/// ```no_run
/// use framegrab::Grabber;
///
/// let mut grabber = Grabber::new();
/// let devices = grabber.video_devices();
/// println!("{} devices", devices.len());
///
/// grabber.start_session(640, 480, 33, devices.first())?;
/// grabber.next_frame()?;
/// let frame = grabber.image().unwrap();
/// println!("{}x{}: {} bytes", grabber.width(), grabber.height(), frame.len());
/// grabber.stop_session();
/// # Ok::<(), framegrab::Error>(())
/// ```
pub struct Grabber {
    backend: Backend,
    config: Config,
    timeout: Duration,
}

impl Grabber {
    /// A grabber over the platform default back-end, configured from the
    /// environment.
    #[cfg(all(target_os = "linux", feature = "v4l2"))]
    pub fn new() -> Self {
        Grabber::with_config(Config::from_env())
    }

    /// A v4l2 grabber with explicit configuration.
    #[cfg(all(target_os = "linux", feature = "v4l2"))]
    pub fn with_config(config: Config) -> Self {
        Grabber {
            backend: Backend::V4l2(None),
            config,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A grabber over a videoInput-style library supplied by the
    /// integration.
    pub fn with_video_input(vi: Box<dyn VideoInput>) -> Self {
        let config = Config::from_env();
        Grabber {
            backend: Backend::VideoInput(videoinput::Session::new(vi, config.verbose)),
            config,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// A grabber over the media-pipeline back-end.
    ///
    /// Pipeline sources are not enumerable; sessions are started from a
    /// [`Device`] whose identifier is a URI, a file path or a pipeline
    /// description.
    #[cfg(feature = "gst")]
    pub fn with_pipeline() -> Self {
        Grabber {
            backend: Backend::Pipeline(None),
            config: Config::from_env(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Enumerates the capture devices the active back-end can see.
    pub fn video_devices(&mut self) -> DeviceList {
        match &mut self.backend {
            #[cfg(all(target_os = "linux", feature = "v4l2"))]
            Backend::V4l2(_) => crate::device::enum_devices(),
            Backend::VideoInput(session) => session.devices(),
            #[cfg(feature = "gst")]
            Backend::Pipeline(_) => DeviceList::default(),
        }
    }

    /// Starts a capture session.
    ///
    /// Any existing session is stopped first. Without an explicit device
    /// the first enumerated one is used; if there is none, the call fails
    /// and nothing is allocated. A non-zero `ms_per_frame` requests a rate
    /// of `1000 / ms_per_frame` frames per second; zero leaves the rate
    /// unconstrained. The negotiated geometry may differ from the request,
    /// see [`width`](Grabber::width) and [`height`](Grabber::height).
    pub fn start_session(
        &mut self,
        width: u32,
        height: u32,
        ms_per_frame: u32,
        device: Option<&Device>,
    ) -> Result<()> {
        self.stop_session();

        let device = match device {
            Some(device) => device.clone(),
            None => match self.video_devices().first() {
                Some(device) => device.clone(),
                None => {
                    return Err(Error::DeviceUnavailable(
                        "no capture devices found".into(),
                    ))
                }
            },
        };

        let fps = if ms_per_frame > 0 {
            1000.0 / f64::from(ms_per_frame)
        } else {
            0.0
        };

        match &mut self.backend {
            #[cfg(all(target_os = "linux", feature = "v4l2"))]
            Backend::V4l2(slot) => {
                let mut session =
                    capture::Session::open(device.identifier(), self.config.force_read)?;
                session.init(width, height, fps)?;
                session.start()?;
                *slot = Some(session);
            }
            Backend::VideoInput(session) => {
                session.start(width, height, ms_per_frame, device.identifier())?;
            }
            #[cfg(feature = "gst")]
            Backend::Pipeline(slot) => {
                let mut session = pipeline::Session::open(device.identifier())?;
                if width > 0 {
                    session.set(pipeline::Property::FrameWidth, f64::from(width))?;
                }
                if height > 0 {
                    session.set(pipeline::Property::FrameHeight, f64::from(height))?;
                }
                if fps > 0.0 {
                    session.set(pipeline::Property::Fps, fps)?;
                }
                *slot = Some(session);
            }
        }

        Ok(())
    }

    /// Stops the active session, releasing the device and all buffers.
    /// Calling this without a session is a no-op.
    pub fn stop_session(&mut self) {
        match &mut self.backend {
            #[cfg(all(target_os = "linux", feature = "v4l2"))]
            Backend::V4l2(slot) => {
                if let Some(mut session) = slot.take() {
                    if let Err(e) = teardown(&mut session) {
                        log::warn!("error stopping session: {}", e);
                    }
                }
            }
            Backend::VideoInput(session) => session.stop(),
            #[cfg(feature = "gst")]
            Backend::Pipeline(slot) => {
                slot.take();
            }
        }
    }

    /// Blocks until the next frame is available.
    ///
    /// Bounded by the configured timeout on the v4l2 and videoInput-style
    /// back-ends; the pipeline back-end blocks on its sink instead.
    pub fn next_frame(&mut self) -> Result<()> {
        let timeout = self.timeout;

        match &mut self.backend {
            #[cfg(all(target_os = "linux", feature = "v4l2"))]
            Backend::V4l2(Some(session)) => session.next_frame(timeout),
            #[cfg(all(target_os = "linux", feature = "v4l2"))]
            Backend::V4l2(None) => Err(Error::InvalidState("no active session")),
            Backend::VideoInput(session) => session.next_frame(timeout),
            #[cfg(feature = "gst")]
            Backend::Pipeline(Some(session)) => session.next_frame(),
            #[cfg(feature = "gst")]
            Backend::Pipeline(None) => Err(Error::InvalidState("no active session")),
        }
    }

    /// The frame surfaced by the last successful
    /// [`next_frame`](Grabber::next_frame).
    ///
    /// The slice is valid until the next `next_frame` or
    /// [`stop_session`](Grabber::stop_session) call.
    pub fn image(&self) -> Option<&[u8]> {
        match &self.backend {
            #[cfg(all(target_os = "linux", feature = "v4l2"))]
            Backend::V4l2(session) => session.as_ref().and_then(|s| s.image()),
            Backend::VideoInput(session) => session.image(),
            #[cfg(feature = "gst")]
            Backend::Pipeline(session) => session.as_ref().and_then(|s| s.image()),
        }
    }

    /// Negotiated frame width; 0 without a session.
    pub fn width(&self) -> u32 {
        match &self.backend {
            #[cfg(all(target_os = "linux", feature = "v4l2"))]
            Backend::V4l2(session) => session.as_ref().map(|s| s.width()).unwrap_or(0),
            Backend::VideoInput(session) => session.width(),
            #[cfg(feature = "gst")]
            Backend::Pipeline(session) => session
                .as_ref()
                .and_then(|s| s.get(pipeline::Property::FrameWidth))
                .unwrap_or(0.0) as u32,
        }
    }

    /// Negotiated frame height; 0 without a session.
    pub fn height(&self) -> u32 {
        match &self.backend {
            #[cfg(all(target_os = "linux", feature = "v4l2"))]
            Backend::V4l2(session) => session.as_ref().map(|s| s.height()).unwrap_or(0),
            Backend::VideoInput(session) => session.height(),
            #[cfg(feature = "gst")]
            Backend::Pipeline(session) => session
                .as_ref()
                .and_then(|s| s.get(pipeline::Property::FrameHeight))
                .unwrap_or(0.0) as u32,
        }
    }

    /// Bounds the wait in [`next_frame`](Grabber::next_frame).
    ///
    /// Ignored by the pipeline back-end, whose readiness is driven by the
    /// sink.
    pub fn set_timeout(&mut self, ms: u64) {
        self.timeout = Duration::from_millis(ms);
    }
}

#[cfg(all(target_os = "linux", feature = "v4l2"))]
fn teardown(session: &mut capture::Session) -> Result<()> {
    session.stop()?;
    session.uninit()?;
    session.close()
}

#[cfg(all(target_os = "linux", feature = "v4l2"))]
impl Default for Grabber {
    fn default() -> Self {
        Grabber::new()
    }
}

impl Drop for Grabber {
    fn drop(&mut self) {
        self.stop_session();
    }
}
