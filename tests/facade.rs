// Facade end-to-end tests over a scripted videoInput-style back-end.
//
// The mock library plays the role the platform capture library would: it
// owns enumeration, setup and pixel polling, while the crate supplies the
// session lifecycle, the timeout loop and the destination buffer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use framegrab::{Device, Error, Grabber, VideoInput};

#[derive(Default)]
struct MockState {
    devices: Vec<String>,
    granted: (u32, u32),
    frames: VecDeque<Vec<u8>>,
    setup: Option<usize>,
    ideal_fps: Option<u32>,
    stops: usize,
    verbose: Option<bool>,
}

#[derive(Clone)]
struct MockVideoInput(Arc<Mutex<MockState>>);

impl MockVideoInput {
    fn new(devices: &[&str], granted: (u32, u32)) -> Self {
        MockVideoInput(Arc::new(Mutex::new(MockState {
            devices: devices.iter().map(|s| s.to_string()).collect(),
            granted,
            ..MockState::default()
        })))
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    fn push_frame(&self, frame: Vec<u8>) {
        self.state().frames.push_back(frame);
    }
}

impl VideoInput for MockVideoInput {
    fn set_verbose(&mut self, verbose: bool) {
        self.state().verbose = Some(verbose);
    }

    fn list_devices(&mut self) -> usize {
        self.state().devices.len()
    }

    fn device_name(&mut self, index: usize) -> Option<String> {
        self.state().devices.get(index).cloned()
    }

    fn set_ideal_framerate(&mut self, _index: usize, fps: u32) {
        self.state().ideal_fps = Some(fps);
    }

    fn setup_device(&mut self, index: usize, _width: u32, _height: u32) -> bool {
        self.state().setup = Some(index);
        true
    }

    fn is_device_setup(&self, index: usize) -> bool {
        self.state().setup == Some(index)
    }

    fn width(&self, _index: usize) -> u32 {
        self.state().granted.0
    }

    fn height(&self, _index: usize) -> u32 {
        self.state().granted.1
    }

    fn size(&self, _index: usize) -> usize {
        let (w, h) = self.state().granted;
        (w * h * 3) as usize
    }

    fn is_frame_new(&mut self, _index: usize) -> bool {
        !self.state().frames.is_empty()
    }

    fn fill_pixels(&mut self, _index: usize, dest: &mut [u8]) -> bool {
        match self.state().frames.pop_front() {
            Some(frame) => {
                dest.copy_from_slice(&frame);
                true
            }
            None => false,
        }
    }

    fn stop_device(&mut self, _index: usize) {
        let mut state = self.state();
        state.stops += 1;
        state.setup = None;
    }
}

fn frame(size: usize, fill: u8) -> Vec<u8> {
    vec![fill; size]
}

fn logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn enumerates_devices_with_index_identifiers() {
    logging();
    let mock = MockVideoInput::new(&["Front Camera", "Back Camera"], (640, 480));
    let mut grabber = Grabber::with_video_input(Box::new(mock.clone()));

    let devices = grabber.video_devices();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices.get(0).unwrap().name(), "Front Camera");
    assert_eq!(devices.get(0).unwrap().identifier(), "0");
    assert_eq!(devices.get(1).unwrap().name(), "Back Camera");
    assert_eq!(devices.get(1).unwrap().identifier(), "1");

    // the facade forwarded the verbosity flag at construction
    assert!(mock.state().verbose.is_some());
}

#[test]
fn start_without_devices_fails_and_allocates_nothing() {
    let mock = MockVideoInput::new(&[], (640, 480));
    let mut grabber = Grabber::with_video_input(Box::new(mock.clone()));

    assert_eq!(grabber.video_devices().len(), 0);

    let err = grabber.start_session(640, 480, 0, None).unwrap_err();
    assert!(matches!(err, Error::DeviceUnavailable(_)));
    assert_eq!(grabber.width(), 0);
    assert_eq!(grabber.height(), 0);
    assert!(grabber.image().is_none());
    assert!(mock.state().setup.is_none());
}

#[test]
fn captures_frames_in_source_order() {
    logging();
    let mock = MockVideoInput::new(&["Cam"], (640, 480));
    let size = 640 * 480 * 3;
    for fill in 1..=4u8 {
        mock.push_frame(frame(size, fill));
    }

    let mut grabber = Grabber::with_video_input(Box::new(mock.clone()));
    grabber.start_session(640, 480, 33, None).unwrap();

    // 33 ms per frame targets 1000/33 = 30 fps
    assert_eq!(mock.state().ideal_fps, Some(30));
    assert_eq!(grabber.width(), 640);
    assert_eq!(grabber.height(), 480);

    let mut first_addr = None;
    for fill in 1..=4u8 {
        grabber.next_frame().unwrap();
        let image = grabber.image().unwrap();
        assert_eq!(image.len() as u32, grabber.width() * grabber.height() * 3);
        assert!(image.iter().all(|&b| b == fill));

        // the destination buffer is stable while the frame size is
        let addr = image.as_ptr();
        match first_addr {
            None => first_addr = Some(addr),
            Some(first) => assert_eq!(addr, first),
        }
    }

    grabber.stop_session();
}

#[test]
fn next_frame_times_out_within_the_configured_window() {
    let mock = MockVideoInput::new(&["Cam"], (320, 240));
    let mut grabber = Grabber::with_video_input(Box::new(mock));
    grabber.start_session(320, 240, 0, None).unwrap();
    grabber.set_timeout(250);

    let begin = Instant::now();
    let err = grabber.next_frame().unwrap_err();
    let elapsed = begin.elapsed().as_millis();

    assert!(matches!(err, Error::Timeout));
    assert!(elapsed >= 240, "timed out after only {} ms", elapsed);
    assert!(elapsed <= 400, "timed out late, after {} ms", elapsed);
}

#[test]
fn invalid_identifier_is_rejected() {
    let mock = MockVideoInput::new(&["Cam"], (640, 480));
    let mut grabber = Grabber::with_video_input(Box::new(mock));

    let device = Device::new("Cam", "banana");
    let err = grabber.start_session(640, 480, 0, Some(&device)).unwrap_err();
    assert!(matches!(err, Error::DeviceUnavailable(_)));
}

#[test]
fn out_of_range_index_is_rejected() {
    let mock = MockVideoInput::new(&["Cam"], (640, 480));
    let mut grabber = Grabber::with_video_input(Box::new(mock));

    let device = Device::new("Cam", "7");
    let err = grabber.start_session(640, 480, 0, Some(&device)).unwrap_err();
    assert!(matches!(err, Error::DeviceUnavailable(_)));
}

#[test]
fn explicit_device_selects_by_identifier() {
    let mock = MockVideoInput::new(&["Front", "Back"], (640, 480));
    let mut grabber = Grabber::with_video_input(Box::new(mock.clone()));

    let device = Device::new("Back", "1");
    grabber.start_session(640, 480, 0, Some(&device)).unwrap();
    assert_eq!(mock.state().setup, Some(1));
}

#[test]
fn stop_session_is_idempotent() {
    let mock = MockVideoInput::new(&["Cam"], (640, 480));
    let mut grabber = Grabber::with_video_input(Box::new(mock.clone()));
    grabber.start_session(640, 480, 0, None).unwrap();

    grabber.stop_session();
    grabber.stop_session();

    assert_eq!(mock.state().stops, 1);
    assert_eq!(grabber.width(), 0);
    assert!(grabber.image().is_none());
    assert!(matches!(
        grabber.next_frame().unwrap_err(),
        Error::InvalidState(_)
    ));
}

#[test]
fn restarting_replaces_the_session() {
    let mock = MockVideoInput::new(&["Cam"], (640, 480));
    let mut grabber = Grabber::with_video_input(Box::new(mock.clone()));

    grabber.start_session(640, 480, 0, None).unwrap();
    grabber.start_session(320, 240, 0, None).unwrap();

    // the first setup was torn down before the second one
    assert_eq!(mock.state().stops, 1);
    assert_eq!(mock.state().setup, Some(0));
}

#[test]
fn negotiated_geometry_may_differ_from_request() {
    // the library grants 320x240 no matter what was asked for
    let mock = MockVideoInput::new(&["Cam"], (320, 240));
    mock.push_frame(frame(320 * 240 * 3, 42));

    let mut grabber = Grabber::with_video_input(Box::new(mock));
    grabber.start_session(1920, 1080, 0, None).unwrap();

    assert_eq!(grabber.width(), 320);
    assert_eq!(grabber.height(), 240);

    grabber.next_frame().unwrap();
    assert_eq!(grabber.image().unwrap().len(), 320 * 240 * 3);
}
