use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use tracing::info;

use jetson_remote::camera::{open_camera, CameraKind};
use jetson_remote::capture::CaptureLoop;
use jetson_remote::config::{parse_choice, Config};
use jetson_remote::remote::{
    launcher_router, serve, LandingPage, LauncherControl, LAUNCHER_PAGE_HTML,
};
use jetson_remote::store::FrameStore;
use jetson_remote::stream::VideoFeed;
use jetson_remote::turret::{open_transport, Launcher};

/// Aims and fires a USB missile launcher from the browser.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Camera to stream from: onboard or usb.
    #[arg(long, default_value = "onboard")]
    camera: String,

    /// TOML file overriding the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    jetson_remote::init_logging();

    let args = Args::parse();
    let camera_kind: CameraKind = parse_choice("camera", &args.camera);
    let config = Config::load(args.config.as_deref())?;

    info!("Opening {camera_kind} camera");
    let camera = open_camera(camera_kind, &config.camera)?;

    info!(
        vendor = config.launcher.vendor_id,
        product = config.launcher.product_id,
        "Opening launcher"
    );
    let launcher = Launcher::new(open_transport(&config.launcher)?);
    let control = LauncherControl::new(launcher, config.launcher.hold());

    let frames = FrameStore::new();
    CaptureLoop::new(camera, frames.clone(), config.capture.interval()).spawn()?;

    let page = LandingPage::write(LAUNCHER_PAGE_HTML)?;
    let feed = VideoFeed::new(frames, &config.stream);
    serve(&config.server.bind, launcher_router(feed, control, &page))?;
    Ok(())
}
