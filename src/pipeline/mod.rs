//! Media-pipeline capture driver.
//!
//! Capture is expressed as a GStreamer dataflow graph ending in an
//! app-sink from which frames are pulled synchronously. A [`Session`] is
//! opened from a locator that may be a URI, a file path or a pipeline
//! description in the gst-launch mini-language; the graph is only started
//! when the first frame is requested, so capture properties can still be
//! set cheaply beforehand.

use std::str::FromStr;
use std::sync::OnceLock;

use gstreamer as gst;
use gstreamer_app as gst_app;

use gst::prelude::*;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::fraction::Fraction;

mod property;
pub use property::Property;

/// Pixel formats accepted from the graph: 8-bit three-band BGR, 8-bit
/// grayscale, and the raw bayer variants.
const ACCEPTED_CAPS: &str =
    "video/x-raw, format=(string){BGR, GRAY8}; video/x-bayer, format=(string){rggb, bggr, grbg, gbrg}";

/// Upper bound on pipeline state transitions
const STATE_CHANGE_TIMEOUT: gst::ClockTime = gst::ClockTime::from_seconds(5);

/// Raw scale of GST_FORMAT_PERCENT position queries
const PERCENT_MAX: f64 = 1_000_000.0;

// Library init must happen exactly once per process; later sessions reuse
// it.
fn ensure_init() -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(Error::Config)
}

fn uri_protocol(locator: &str) -> Option<&str> {
    locator.split_once("://").map(|(scheme, _)| scheme)
}

// A locator is treated as a URI when it carries a scheme; everything else
// resolves as a path or a pipeline description.
fn has_uri_scheme(locator: &str) -> bool {
    match uri_protocol(locator) {
        Some(scheme) => {
            let mut chars = scheme.chars();
            match chars.next() {
                Some(first) if first.is_ascii_alphabetic() => {
                    chars.all(|c| c.is_ascii_alphanumeric() || "+.-".contains(c))
                }
                _ => false,
            }
        }
        None => false,
    }
}

/// Caps filters applied to the sink by the property setters.
#[derive(Debug, Default, Clone, Copy)]
struct Filters {
    width: Option<i32>,
    height: Option<i32>,
    framerate: Option<gst::Fraction>,
    /// Whether a filter has ever been applied; the BGR collapse outlives
    /// the filters themselves
    collapsed: bool,
}

impl Filters {
    fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.framerate.is_none()
    }
}

/// One capture session over a GStreamer graph.
pub struct Session {
    pipeline: gst::Element,
    sink: gst_app::AppSink,
    filters: Filters,
    /// Caps of the most recently pulled sample
    caps: Option<gst::Caps>,
    /// Readable mapping of the most recent frame; replaced on every pull
    map: Option<gst::buffer::MappedBuffer<gst::buffer::Readable>>,
}

impl Session {
    /// Opens a source and builds the capture graph around it.
    ///
    /// The locator may be:
    /// - a URI, e.g. `file:///movie.avi` or `rtsp://host/stream`
    /// - a filesystem path
    /// - a pipeline description, e.g. `videotestsrc ! videoconvert ! appsink`;
    ///   the description must contain a sink element whose name contains
    ///   `appsink` or `opencvsink`
    ///
    /// URI and description sources count as live: the sink drops stale
    /// frames instead of back-pressuring the graph. File sources deliver
    /// every frame.
    pub fn open(locator: &str) -> Result<Self> {
        ensure_init()?;

        let (pipeline, sink, live) = if has_uri_scheme(locator) {
            let (pipeline, sink) = build_uri_pipeline(locator)?;
            (pipeline, sink, true)
        } else if let Ok(path) = std::fs::canonicalize(locator) {
            // an existing file: not a live source, the sink must not drop
            let file_uri = gst::glib::filename_to_uri(&path, None)
                .map_err(|e| Error::Config(format!("error opening {}: {}", locator, e)))?;
            let (pipeline, sink) = build_uri_pipeline(file_uri.as_str())?;
            (pipeline, sink, false)
        } else {
            let bin = gst::parse::launch(locator)
                .map_err(|e| Error::Config(format!("error parsing pipeline: {}", e)))?;
            let sink = find_app_sink(&bin)?;
            (bin, sink, true)
        };

        sink.set_max_buffers(1);
        sink.set_drop(live);
        // all pulls are synchronous and blocking
        sink.set_property("emit-signals", false);
        let caps = gst::Caps::from_str(ACCEPTED_CAPS)
            .map_err(|e| Error::Config(format!("invalid sink caps: {}", e)))?;
        sink.set_caps(Some(&caps));

        Ok(Session {
            pipeline,
            sink,
            filters: Filters::default(),
            caps: None,
            map: None,
        })
    }

    /// Pulls the next sample from the sink, starting the pipeline if it is
    /// not playing yet.
    ///
    /// Once the stream has ended, every further call reports
    /// [`Error::Eos`].
    pub fn next_frame(&mut self) -> Result<()> {
        if !self.is_playing() {
            self.start_pipeline()?;
        }

        if self.sink.is_eos() {
            return Err(Error::Eos);
        }

        // release the previous frame before pulling the next
        self.map = None;

        let sample = self.sink.pull_sample().map_err(|_| {
            if self.sink.is_eos() {
                Error::Eos
            } else {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "unable to pull sample from sink",
                ))
            }
        })?;

        let caps = sample.caps_owned();
        let buffer = sample.buffer_owned().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "sample carries no buffer",
            ))
        })?;
        let map = buffer.into_mapped_buffer_readable().map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "unable to map frame buffer",
            ))
        })?;

        self.caps = caps;
        self.map = Some(map);
        Ok(())
    }

    /// The most recently pulled frame.
    ///
    /// The slice is invalidated by the next
    /// [`next_frame`](Session::next_frame), by property setters that
    /// restart the pipeline, and by dropping the session.
    pub fn image(&self) -> Option<&[u8]> {
        self.map.as_ref().map(|map| map.as_slice())
    }

    /// Number of colour bands of the last frame: 3 for BGR, 1 for GRAY8
    /// and the bayer formats. 0 before the first frame.
    pub fn bands(&self) -> u32 {
        let structure = match self.caps.as_ref().and_then(|caps| caps.structure(0)) {
            Some(structure) => structure,
            None => return 0,
        };

        let name: &str = structure.name().as_ref();
        if name == "video/x-bayer" {
            return 1;
        }
        if name == "video/x-raw" {
            return match structure.get::<&str>("format") {
                Ok("BGR") => 3,
                Ok("GRAY8") => 1,
                _ => 0,
            };
        }
        0
    }

    /// Reads a property.
    ///
    /// Position properties query the graph; geometry and rate come from
    /// the caps of the last pulled sample and are `None` (with a warning)
    /// before the first frame.
    pub fn get(&self, property: Property) -> Option<f64> {
        match property {
            Property::PosMsec => self
                .query_position(gst::Format::Time)
                .map(|ns| ns as f64 * 1e-6),
            Property::PosFrames => self.query_position(gst::Format::Default).map(|v| v as f64),
            Property::PosAviRatio => self
                .query_position(gst::Format::Percent)
                .map(|v| v as f64 / PERCENT_MAX),
            Property::FrameWidth => self.caps_int("width"),
            Property::FrameHeight => self.caps_int("height"),
            Property::Fps => self.caps_framerate(),
            Property::QueueLength => Some(f64::from(self.sink.max_buffers())),
        }
    }

    /// Writes a property.
    ///
    /// Position properties seek the graph; geometry and rate mutate the
    /// sink caps filter. A playing pipeline is briefly stopped and
    /// restarted around the change.
    pub fn set(&mut self, property: Property, value: f64) -> Result<()> {
        let was_playing = self.is_playing();
        if was_playing {
            self.stop_pipeline();
        }

        match property {
            Property::PosMsec => self.seek(gst::Format::Time, (value * 1e6) as i64),
            Property::PosFrames => self.seek(gst::Format::Default, value as i64),
            Property::PosAviRatio => self.seek(gst::Format::Percent, (value * PERCENT_MAX) as i64),
            Property::FrameWidth => {
                self.filters.width = if value > 0.0 { Some(value as i32) } else { None };
                self.apply_filters();
            }
            Property::FrameHeight => {
                self.filters.height = if value > 0.0 { Some(value as i32) } else { None };
                self.apply_filters();
            }
            Property::Fps => {
                self.filters.framerate = if value > 0.0 {
                    let frac = Fraction::approximate(value);
                    Some(gst::Fraction::new(
                        frac.numerator as i32,
                        frac.denominator as i32,
                    ))
                } else {
                    None
                };
                self.apply_filters();
            }
            Property::QueueLength => self.sink.set_max_buffers(value as u32),
        }

        if was_playing {
            self.start_pipeline()?;
        }
        Ok(())
    }

    fn query_position(&self, format: gst::Format) -> Option<i64> {
        match self.sink.query_position_generic(format) {
            Some(value) => Some(value.value()),
            None => {
                warn!("unable to query position of stream");
                None
            }
        }
    }

    fn caps_int(&self, field: &str) -> Option<f64> {
        let caps = match &self.caps {
            Some(caps) => caps,
            None => {
                warn!("unable to query {} of frame; no frame grabbed yet", field);
                return None;
            }
        };

        let value = caps.structure(0)?.get::<i32>(field).ok()?;
        Some(f64::from(value))
    }

    fn caps_framerate(&self) -> Option<f64> {
        let caps = match &self.caps {
            Some(caps) => caps,
            None => {
                warn!("unable to query framerate of stream; no frame grabbed yet");
                return None;
            }
        };

        let frac = caps.structure(0)?.get::<gst::Fraction>("framerate").ok()?;
        Some(f64::from(frac.numer()) / f64::from(frac.denom()))
    }

    fn seek(&self, format: gst::Format, value: i64) {
        let flags = gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE;
        let position = gst::GenericFormattedValue::new(format, value);
        if let Err(e) = self.pipeline.seek_simple(flags, position) {
            warn!("unable to seek: {}", e);
        }
    }

    // Applying a filter collapses the sink caps to filtered BGR, which is
    // what the converter produces anyway. The collapse is permanent:
    // removing every filter leaves plain BGR caps, not the initial accept
    // set. Removals before any filter was applied leave the sink alone.
    fn apply_filters(&mut self) {
        if self.filters.is_empty() && !self.filters.collapsed {
            return;
        }
        self.filters.collapsed = true;

        let mut builder = gst::Caps::builder("video/x-raw").field("format", "BGR");
        if let Some(width) = self.filters.width {
            builder = builder.field("width", width);
        }
        if let Some(height) = self.filters.height {
            builder = builder.field("height", height);
        }
        if let Some(framerate) = self.filters.framerate {
            builder = builder.field("framerate", framerate);
        }
        self.sink.set_caps(Some(&builder.build()));
    }

    fn is_playing(&self) -> bool {
        let (res, current, _pending) = self.pipeline.state(STATE_CHANGE_TIMEOUT);
        res.is_ok() && current == gst::State::Playing
    }

    fn start_pipeline(&mut self) -> Result<()> {
        if self.pipeline.set_state(gst::State::Playing).is_err() {
            return Err(Error::Config("unable to start pipeline".into()));
        }
        self.drain_bus()
    }

    fn stop_pipeline(&mut self) {
        if self.pipeline.set_state(gst::State::Null).is_err() {
            warn!("unable to stop pipeline");
        }
    }

    // Pop pending bus messages; errors drive the pipeline back to NULL,
    // and a missing plugin fails the caller.
    fn drain_bus(&self) -> Result<()> {
        let bus = match self.pipeline.bus() {
            Some(bus) => bus,
            None => return Ok(()),
        };

        let mut missing_plugin = false;

        while let Some(msg) = bus.pop() {
            use gst::MessageView;
            match msg.view() {
                MessageView::Element(element) => {
                    // pbutils marks missing-plugin messages with a
                    // "missing-plugin" structure on an element message
                    if let Some(structure) = element.structure() {
                        let name: &str = structure.name().as_ref();
                        if name == "missing-plugin" {
                            warn!("gstreamer installation is missing a required plugin");
                            missing_plugin = true;
                        }
                    }
                }
                MessageView::Error(err) => {
                    warn!("pipeline error: {} ({:?})", err.error(), err.debug());
                    let _ = self.pipeline.set_state(gst::State::Null);
                }
                MessageView::Eos(..) => debug!("reached end of stream"),
                MessageView::StateChanged(s) => {
                    debug!("pipeline state {:?} -> {:?}", s.old(), s.current());
                }
                _ => {}
            }
        }

        if missing_plugin {
            return Err(Error::Config(
                "gstreamer installation is missing a required plugin".into(),
            ));
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // unmap before the graph goes away
        self.map = None;
        self.caps = None;
        if self.pipeline.set_state(gst::State::Null).is_err() {
            warn!("unable to stop pipeline");
        }
    }
}

// The manual pipeline's frame sink is the first sink element whose name
// marks it as an app-sink.
fn find_app_sink(bin: &gst::Element) -> Result<gst_app::AppSink> {
    let bin = bin
        .clone()
        .downcast::<gst::Bin>()
        .map_err(|_| Error::Config("pipeline description is not a bin".into()))?;

    for element in bin.iterate_sinks() {
        let element = match element {
            Ok(element) => element,
            Err(_) => break,
        };

        let name = element.name();
        if name.contains("appsink") || name.contains("opencvsink") {
            return element
                .downcast::<gst_app::AppSink>()
                .map_err(|_| Error::Config("frame sink is not an appsink".into()));
        }
    }

    Err(Error::Config(
        "cannot find appsink in manual pipeline".into(),
    ))
}

fn build_uri_pipeline(uri: &str) -> Result<(gst::Element, gst_app::AppSink)> {
    let pipeline = gst::Pipeline::new();
    let convert = gst::ElementFactory::make("videoconvert")
        .build()
        .map_err(|_| Error::Config("missing plugin: videoconvert".into()))?;
    let sink = gst_app::AppSink::builder().build();

    // The v4l2 source element does not support caps renegotiation through
    // a decodebin, so setting capture properties would not work; it
    // becomes a source element made from the URI instead.
    let (source, linked_statically) = if uri_protocol(uri) == Some("v4l2") {
        let source = gst::Element::make_from_uri(gst::URIType::Src, uri, None)
            .map_err(|_| Error::Config(format!("cannot create source for '{}'", uri)))?;
        (source, true)
    } else {
        let decode = gst::ElementFactory::make("uridecodebin")
            .build()
            .map_err(|_| Error::Config("missing plugin: uridecodebin".into()))?;
        decode.set_property("uri", uri);
        (decode, false)
    };

    pipeline
        .add_many([&source, &convert, sink.upcast_ref()])
        .map_err(|e| Error::Config(e.to_string()))?;

    if linked_statically {
        source
            .link(&convert)
            .map_err(|_| Error::Config("cannot link source -> converter".into()))?;
    } else {
        // decodebin discovers its output pad from the stream, which is not
        // known at construction time; link the pad when it appears
        let convert = convert.clone();
        source.connect_pad_added(move |_, pad| {
            let sinkpad = match convert.static_pad("sink") {
                Some(sinkpad) => sinkpad,
                None => {
                    warn!("converter has no sink pad");
                    return;
                }
            };
            if let Err(e) = pad.link(&sinkpad) {
                warn!("cannot link decoder pad: {:?}", e);
            }
        });
    }

    convert
        .link(&sink)
        .map_err(|_| Error::Config("cannot link converter -> sink".into()))?;

    Ok((pipeline.upcast(), sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_scheme_detection() {
        assert!(has_uri_scheme("rtsp://host/stream"));
        assert!(has_uri_scheme("file:///movie.avi"));
        assert!(has_uri_scheme("v4l2:///dev/video0"));
        assert!(!has_uri_scheme("/path/to/movie.avi"));
        assert!(!has_uri_scheme("videotestsrc ! videoconvert ! appsink"));
        assert!(!has_uri_scheme("://missing-scheme"));
        assert!(!has_uri_scheme("0ddly://numeric-first"));
    }

    #[test]
    fn protocol_extraction() {
        assert_eq!(uri_protocol("v4l2:///dev/video0"), Some("v4l2"));
        assert_eq!(uri_protocol("plain/path"), None);
    }

    // Requires a GStreamer install with the base plugin set.
    #[test]
    #[ignore]
    fn manual_pipeline_delivers_frames() {
        let mut session = Session::open("videotestsrc ! videoconvert ! appsink").unwrap();
        session.next_frame().unwrap();

        let image = session.image().unwrap();
        assert!(!image.is_empty());

        let width = session.get(Property::FrameWidth).unwrap();
        let height = session.get(Property::FrameHeight).unwrap();
        assert!(width > 0.0 && height > 0.0);
        assert_eq!(session.bands(), 3);
        assert_eq!(image.len(), (width * height * 3.0) as usize);
    }

    // Requires a GStreamer install with the base plugin set.
    #[test]
    #[ignore]
    fn cleared_filters_keep_the_collapsed_bgr_caps() {
        let mut session = Session::open("videotestsrc ! videoconvert ! appsink").unwrap();

        // apply a geometry filter, then remove it again
        session.set(Property::FrameWidth, 320.0).unwrap();
        session.set(Property::FrameWidth, 0.0).unwrap();

        // the initial accept caps also admit GRAY8 and bayer; once a
        // filter has been applied only BGR remains negotiable
        session.next_frame().unwrap();
        assert_eq!(session.bands(), 3);
    }

    #[test]
    #[ignore]
    fn open_rejects_description_without_sink() {
        let err = Session::open("videotestsrc ! fakesink").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
