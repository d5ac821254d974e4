use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use tracing::info;

use jetson_remote::camera::{open_camera, CameraKind};
use jetson_remote::capture::CaptureLoop;
use jetson_remote::config::{parse_choice, Config};
use jetson_remote::inference::{load_annotator, NetworkKind};
use jetson_remote::light::GpioLight;
use jetson_remote::motor::MotorHat;
use jetson_remote::remote::{rover_router, serve, LandingPage, RoverControl, ROVER_PAGE_HTML};
use jetson_remote::store::FrameStore;
use jetson_remote::stream::VideoFeed;

/// Drives a JetBot from a browser gamepad while streaming its camera.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Camera to stream from: onboard or usb.
    #[arg(long, default_value = "onboard")]
    camera: String,

    /// Network drawn over the stream: detect, segment or none.
    #[arg(long, default_value = "detect")]
    network: String,

    /// TOML file overriding the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    jetson_remote::init_logging();

    let args = Args::parse();
    let camera_kind: CameraKind = parse_choice("camera", &args.camera);
    let network: NetworkKind = parse_choice("network", &args.network);
    let config = Config::load(args.config.as_deref())?;

    info!("Opening {camera_kind} camera");
    let camera = open_camera(camera_kind, &config.camera)?;
    info!("Loading {network} network");
    let annotator = load_annotator(network, &config.network)?;

    let car = MotorHat::open(&config.drive)?;
    let light = GpioLight::open(&config.light.pins)?;
    let control = RoverControl::new(car, light, &config.drive);

    let frames = FrameStore::new();
    CaptureLoop::new(camera, frames.clone(), config.capture.interval())
        .with_annotator(annotator)
        .spawn()?;

    let page = LandingPage::write(ROVER_PAGE_HTML)?;
    let feed = VideoFeed::new(frames, &config.stream);
    serve(&config.server.bind, rover_router(feed, control, &page))?;
    Ok(())
}
