//! videoInput-style capture driver.
//!
//! The wrapped platform library already encapsulates device enumeration,
//! format setup, frame polling and pixel retrieval; it is modelled here as
//! the [`VideoInput`] trait and supplied by the integration. The driver
//! adds a device-list adapter, a bounded polling loop around the frame
//! flag, and ownership of the destination pixel buffer.

use std::thread;
use std::time::Duration;

use crate::device::{Device, DeviceList};
use crate::error::{Error, Result};

/// Interval between frame-flag polls
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Boundary of the wrapped video input library.
///
/// Pixel data is expected in BGR order, bottom-up flipping already undone
/// by the library.
pub trait VideoInput {
    /// Enable or disable verbose library logging
    fn set_verbose(&mut self, verbose: bool);

    /// Number of attached devices
    fn list_devices(&mut self) -> usize;

    /// Human-readable name of the device at `index`
    fn device_name(&mut self, index: usize) -> Option<String>;

    /// Request a target frame rate before setup
    fn set_ideal_framerate(&mut self, index: usize, fps: u32);

    /// Configure the device with the requested geometry
    fn setup_device(&mut self, index: usize, width: u32, height: u32) -> bool;

    /// Whether the device at `index` is currently set up
    fn is_device_setup(&self, index: usize) -> bool;

    /// Negotiated width, valid once set up
    fn width(&self, index: usize) -> u32;

    /// Negotiated height, valid once set up
    fn height(&self, index: usize) -> u32;

    /// Size of one frame in bytes, valid once set up
    fn size(&self, index: usize) -> usize;

    /// Whether a frame has arrived since the last pixel fetch
    fn is_frame_new(&mut self, index: usize) -> bool;

    /// Copy the current frame into `dest` in BGR order, no flipping
    fn fill_pixels(&mut self, index: usize, dest: &mut [u8]) -> bool;

    /// Stop the device at `index`
    fn stop_device(&mut self, index: usize);
}

/// One capture session over a [`VideoInput`] implementation.
pub struct Session {
    vi: Box<dyn VideoInput>,
    device: usize,
    buffer: Option<Vec<u8>>,
    width: u32,
    height: u32,
}

impl Session {
    pub fn new(mut vi: Box<dyn VideoInput>, verbose: bool) -> Self {
        vi.set_verbose(verbose);
        Session {
            vi,
            device: 0,
            buffer: None,
            width: 0,
            height: 0,
        }
    }

    /// Lists the devices the library reports, identified by index.
    pub fn devices(&mut self) -> DeviceList {
        let count = self.vi.list_devices();
        let mut devices = Vec::with_capacity(count);

        for index in 0..count {
            let name = self
                .vi
                .device_name(index)
                .unwrap_or_else(|| format!("device {}", index));
            devices.push(Device::new(name, index.to_string()));
        }

        DeviceList::from(devices)
    }

    /// Sets up the identified device and allocates the frame buffer.
    ///
    /// Any existing setup is torn down first. The identifier must be a
    /// device index as produced by [`devices`](Session::devices).
    pub fn start(
        &mut self,
        width: u32,
        height: u32,
        ms_per_frame: u32,
        identifier: &str,
    ) -> Result<()> {
        self.teardown();

        let index: usize = identifier.parse().map_err(|_| {
            Error::DeviceUnavailable(format!("invalid device identifier '{}'", identifier))
        })?;
        if index >= self.vi.list_devices() {
            return Err(Error::DeviceUnavailable(format!(
                "device index {} out of range",
                index
            )));
        }

        if ms_per_frame > 0 {
            self.vi
                .set_ideal_framerate(index, (1000.0 / f64::from(ms_per_frame)) as u32);
        }

        self.vi.setup_device(index, width, height);
        if !self.vi.is_device_setup(index) {
            return Err(Error::DeviceUnavailable(format!(
                "device {} failed to set up",
                index
            )));
        }

        // the library is authoritative for the negotiated geometry
        self.device = index;
        self.width = self.vi.width(index);
        self.height = self.vi.height(index);
        self.buffer = Some(vec![0u8; self.vi.size(index)]);

        Ok(())
    }

    /// Polls for a new frame until one arrives or the timeout elapses,
    /// then fetches its pixels into the session buffer.
    pub fn next_frame(&mut self, timeout: Duration) -> Result<()> {
        let buffer = match self.buffer.as_mut() {
            Some(buffer) => buffer,
            None => return Err(Error::InvalidState("next_frame requires an active session")),
        };

        let mut waited = Duration::from_millis(0);
        while waited < timeout {
            if self.vi.is_frame_new(self.device) {
                self.vi.fill_pixels(self.device, buffer);
                return Ok(());
            }

            thread::sleep(POLL_INTERVAL);
            waited += POLL_INTERVAL;
        }

        Err(Error::Timeout)
    }

    /// Frees the frame buffer and stops the device. Idempotent.
    pub fn stop(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.buffer.take().is_some() && self.vi.is_device_setup(self.device) {
            self.vi.stop_device(self.device);
        }
        self.width = 0;
        self.height = 0;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The most recent frame in BGR order.
    ///
    /// Valid until the next [`next_frame`](Session::next_frame) or
    /// [`stop`](Session::stop); zero-filled before the first frame.
    pub fn image(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
