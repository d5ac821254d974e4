use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gotham::hyper::body::HttpBody;
use gotham::hyper::header::CONTENT_TYPE;
use gotham::hyper::{Body, Response, StatusCode};
use gotham::test::{Server, TestServer};
use serde_json::Value;

use crate::config::{DriveConfig, StreamConfig};
use crate::error::Result;
use crate::frame::{Frame, PixelFormat};
use crate::light::{Light, LightOutput};
use crate::motor::Drivable;
use crate::remote::*;
use crate::store::FrameStore;
use crate::stream::{VideoFeed, STREAM_CONTENT_TYPE};
use crate::turret::{Launcher, Transport, TurretCommand};

const FORM: mime::Mime = mime::APPLICATION_WWW_FORM_URLENCODED;

#[derive(Default)]
struct FakeCar {
    left: f64,
    right: f64,
    writes: usize,
}

impl Drivable for FakeCar {
    fn set_left(&mut self, value: f64) -> Result<()> {
        self.left = value;
        self.writes += 1;
        Ok(())
    }

    fn set_right(&mut self, value: f64) -> Result<()> {
        self.right = value;
        self.writes += 1;
        Ok(())
    }

    fn left(&self) -> f64 {
        self.left
    }

    fn right(&self) -> f64 {
        self.right
    }
}

#[derive(Clone, Default)]
struct Pin {
    high: Arc<Mutex<bool>>,
}

impl LightOutput for Pin {
    fn set(&mut self, on: bool) -> Result<()> {
        *self.high.lock().unwrap() = on;
        Ok(())
    }
}

struct Rover {
    server: TestServer,
    control: RoverControl<FakeCar, Pin>,
    pins: Vec<Pin>,
    _page: LandingPage,
}

impl Rover {
    fn new() -> Self {
        let pins = vec![Pin::default(), Pin::default()];
        let control = RoverControl::new(
            FakeCar::default(),
            Light::new(pins.clone()).unwrap(),
            &DriveConfig::default(),
        );
        let page = LandingPage::write(ROVER_PAGE_HTML).unwrap();
        let feed = VideoFeed::new(FrameStore::new(), &StreamConfig::default());
        let server = TestServer::new(rover_router(feed, control.clone(), &page)).unwrap();
        Rover {
            server,
            control,
            pins,
            _page: page,
        }
    }

    fn post(&self, path: &str, body: &'static str) -> (StatusCode, String) {
        let response = self
            .server
            .client()
            .post(format!("http://localhost{path}"), body, FORM)
            .perform()
            .unwrap();
        let status = response.status();
        (status, response.read_utf8_body().unwrap())
    }

    fn status(&self) -> Value {
        let response = self
            .server
            .client()
            .get("http://localhost/status")
            .perform()
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_str(&response.read_utf8_body().unwrap()).unwrap()
    }

    fn pins_high(&self) -> Vec<bool> {
        self.pins.iter().map(|p| *p.high.lock().unwrap()).collect()
    }
}

#[test]
fn serves_landing_page() {
    let rover = Rover::new();
    let response = rover.server.client().get("http://localhost/").perform().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.read_utf8_body().unwrap().contains("/set_axis_values"));
}

#[test]
fn axis_values_drive_motors() {
    let rover = Rover::new();
    let (status, body) = rover.post(
        "/set_axis_values",
        "data%5B%5D=0.9&data%5B%5D=-0.8&data%5B%5D=0.3&data%5B%5D=0.1",
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SUCCESS);

    let car = rover.control.car();
    assert_eq!(car.left, -0.5 * -0.8);
    assert_eq!(car.right, 0.0);
}

#[test]
fn status_reports_last_command() {
    let rover = Rover::new();
    rover.post(
        "/set_axis_values",
        "data%5B%5D=0&data%5B%5D=0.5&data%5B%5D=0&data%5B%5D=-1",
    );
    let status = rover.status();
    assert_eq!(status["left motor"].as_f64(), Some(-0.25));
    assert_eq!(status["right motor"].as_f64(), Some(0.5));
    assert_eq!(status.as_object().unwrap().len(), 2);
}

#[test]
fn short_axis_payload_is_rejected() {
    let rover = Rover::new();
    let (status, _) = rover.post("/set_axis_values", "data%5B%5D=0.5&data%5B%5D=0.5");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = rover.post(
        "/set_axis_values",
        "data%5B%5D=0&data%5B%5D=fast&data%5B%5D=0&data%5B%5D=0",
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = rover.post(
        "/set_axis_values",
        "data%5B%5D=0&data%5B%5D=NaN&data%5B%5D=0&data%5B%5D=inf",
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(rover.control.car().writes, 0);
    assert_eq!(rover.status()["left motor"].as_f64(), Some(0.0));
}

#[test]
fn stop_zeroes_motors() {
    let rover = Rover::new();
    rover.post(
        "/set_axis_values",
        "data%5B%5D=0&data%5B%5D=1&data%5B%5D=0&data%5B%5D=1",
    );
    let (status, body) = rover.post("/stop", "");
    assert_eq!((status, body.as_str()), (StatusCode::OK, SUCCESS));
    let car = rover.control.car();
    assert_eq!((car.left, car.right), (0.0, 0.0));
}

#[test]
fn light_toggles_both_outputs() {
    let rover = Rover::new();
    assert_eq!(rover.pins_high(), vec![false, false]);
    assert_eq!(rover.post("/light", "").0, StatusCode::OK);
    assert_eq!(rover.pins_high(), vec![true, true]);
    assert_eq!(rover.post("/light", "").0, StatusCode::OK);
    assert_eq!(rover.pins_high(), vec![false, false]);
}

#[test]
fn light_button_toggles() {
    let rover = Rover::new();
    let released = "data%5B%5D=true&data%5B%5D=false&data%5B%5D=false&data%5B%5D=false\
                    &data%5B%5D=false&data%5B%5D=false&data%5B%5D=false&data%5B%5D=false\
                    &data%5B%5D=false";
    let pressed = "data%5B%5D=false&data%5B%5D=false&data%5B%5D=false&data%5B%5D=false\
                   &data%5B%5D=false&data%5B%5D=false&data%5B%5D=false&data%5B%5D=false\
                   &data%5B%5D=true";
    assert_eq!(rover.post("/set_button_values", released), (StatusCode::OK, SUCCESS.to_string()));
    assert!(!rover.control.light().is_on());
    assert_eq!(rover.post("/set_button_values", pressed).0, StatusCode::OK);
    assert!(rover.control.light().is_on());
    assert_eq!(rover.pins_high(), vec![true, true]);
}

#[test]
fn short_button_payload_is_rejected() {
    let rover = Rover::new();
    let (status, _) = rover.post("/set_button_values", "data%5B%5D=true&data%5B%5D=true");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!rover.control.light().is_on());
}

#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<[u8; 8]>>>,
}

impl Transport for Recorder {
    fn send(&mut self, payload: &[u8; 8]) -> Result<()> {
        self.sent.lock().unwrap().push(*payload);
        Ok(())
    }
}

struct Turret {
    server: TestServer,
    recorder: Recorder,
    control: LauncherControl<Recorder>,
    _page: LandingPage,
}

fn launcher(hold: Duration) -> Turret {
    let recorder = Recorder::default();
    let control = LauncherControl::new(Launcher::new(recorder.clone()), hold);
    let page = LandingPage::write(LAUNCHER_PAGE_HTML).unwrap();
    let feed = VideoFeed::new(FrameStore::new(), &StreamConfig::default());
    let server = TestServer::new(launcher_router(feed, control.clone(), &page)).unwrap();
    Turret {
        server,
        recorder,
        control,
        _page: page,
    }
}

fn post(server: &TestServer, path: &str) -> (StatusCode, String) {
    let response = server
        .client()
        .post(format!("http://localhost{path}"), "", mime::TEXT_PLAIN)
        .perform()
        .unwrap();
    let status = response.status();
    (status, response.read_utf8_body().unwrap())
}

#[test]
fn left_then_right_run_in_sequence() {
    let hold = Duration::from_millis(50);
    let Turret {
        server, recorder, ..
    } = launcher(hold);
    let start = Instant::now();
    assert_eq!(post(&server, "/left"), (StatusCode::OK, SUCCESS.to_string()));
    assert!(start.elapsed() >= hold);
    assert_eq!(post(&server, "/right"), (StatusCode::OK, SUCCESS.to_string()));
    assert!(start.elapsed() >= hold * 2);
    assert_eq!(
        *recorder.sent.lock().unwrap(),
        vec![
            TurretCommand::Left.payload(),
            TurretCommand::Stop.payload(),
            TurretCommand::Right.payload(),
            TurretCommand::Stop.payload(),
        ]
    );
}

#[test]
fn fire_sends_single_pulse() {
    let Turret {
        server, recorder, ..
    } = launcher(Duration::ZERO);
    assert_eq!(post(&server, "/fire"), (StatusCode::OK, SUCCESS.to_string()));
    assert_eq!(*recorder.sent.lock().unwrap(), vec![TurretCommand::Fire.payload()]);
}

#[test]
fn launcher_status_is_empty_object() {
    let server = launcher(Duration::ZERO).server;
    let response = server.client().get("http://localhost/status").perform().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.read_utf8_body().unwrap(), "{}");
}

#[test]
fn launcher_page_has_controls() {
    let turret = launcher(Duration::ZERO);
    let body = turret
        .server
        .client()
        .get("http://localhost/")
        .perform()
        .unwrap()
        .read_utf8_body()
        .unwrap();
    assert!(body.contains("/fire"));
    assert!(body.contains("/video_image"));
}

#[test]
fn fire_is_not_held_up_by_a_move() {
    let turret = launcher(Duration::from_millis(800));
    let control = turret.control.clone();
    let moving = std::thread::spawn(move || {
        control
            .launcher()
            .pulse(TurretCommand::Left, Duration::from_millis(800))
    });
    std::thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    assert_eq!(post(&turret.server, "/fire"), (StatusCode::OK, SUCCESS.to_string()));
    assert!(start.elapsed() < Duration::from_millis(400));

    moving.join().unwrap().unwrap();
    assert_eq!(
        *turret.recorder.sent.lock().unwrap(),
        vec![
            TurretCommand::Left.payload(),
            TurretCommand::Fire.payload(),
            TurretCommand::Stop.payload(),
        ]
    );
}

#[test]
fn video_route_streams_multipart_jpeg() {
    let frames = FrameStore::new();
    frames.publish(Frame::new(8, 8, PixelFormat::Rgb, vec![40u8; 8 * 8 * 3]).unwrap());
    let recorder = Recorder::default();
    let control = LauncherControl::new(Launcher::new(recorder), Duration::ZERO);
    let page = LandingPage::write(LAUNCHER_PAGE_HTML).unwrap();
    let feed = VideoFeed::new(frames, &StreamConfig::default());
    let server = TestServer::new(launcher_router(feed, control, &page)).unwrap();

    let response: Response<Body> = server
        .client()
        .get("http://localhost/video_image")
        .perform()
        .unwrap()
        .into();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], STREAM_CONTENT_TYPE);

    let mut body = response.into_body();
    let chunk = server.run_future(body.data()).unwrap().unwrap();
    assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));
}
