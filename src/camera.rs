use std::fmt;
use std::str::FromStr;

use crate::config::{CameraConfig, Choice};
use crate::error::Result;
use crate::frame::Frame;

/// Source of frames for the capture loop.
pub trait Camera: Send {
    fn capture(&mut self) -> Result<Frame>;

    /// Waits for outstanding device work on the last frame.
    fn synchronize(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn capture(&mut self) -> Result<Frame> {
        (**self).capture()
    }

    fn synchronize(&mut self) -> Result<()> {
        (**self).synchronize()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraKind {
    /// CSI sensor on the carrier board.
    Onboard,
    Usb,
}

impl Choice for CameraKind {
    const VARIANTS: &'static [&'static str] = &["onboard", "usb"];
}

impl FromStr for CameraKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "onboard" => Ok(CameraKind::Onboard),
            "usb" => Ok(CameraKind::Usb),
            other => Err(format!("unknown camera {other}")),
        }
    }
}

impl fmt::Display for CameraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CameraKind::Onboard => "onboard",
            CameraKind::Usb => "usb",
        })
    }
}

/// Opens the camera selected on the command line.
pub fn open_camera(kind: CameraKind, config: &CameraConfig) -> Result<Box<dyn Camera>> {
    #[cfg(feature = "opencv")]
    return Ok(Box::new(CvCamera::open(kind, config)?));

    #[cfg(not(feature = "opencv"))]
    {
        let _ = config;
        Err(crate::error::Error::Camera(format!(
            "{kind} camera needs the opencv feature"
        )))
    }
}

#[cfg(feature = "opencv")]
pub use self::cv::{frame_to_mat, mat_to_frame, CvCamera};

#[cfg(feature = "opencv")]
mod cv {
    use opencv::core::Mat;
    use opencv::prelude::*;
    use opencv::videoio::{self, VideoCapture};
    use tracing::info;

    use super::{Camera, CameraKind};
    use crate::config::CameraConfig;
    use crate::error::{Error, Result};
    use crate::frame::{Frame, PixelFormat};

    /// OpenCV capture from the onboard CSI sensor (through GStreamer) or a
    /// V4L2 USB device. Frames come out in BGR order.
    pub struct CvCamera {
        cap: VideoCapture,
        mat: Mat,
    }

    impl CvCamera {
        pub fn open(kind: CameraKind, config: &CameraConfig) -> Result<Self> {
            let cap = match kind {
                CameraKind::Onboard => {
                    VideoCapture::from_file(&onboard_pipeline(config), videoio::CAP_GSTREAMER)?
                }
                CameraKind::Usb => {
                    let mut cap = VideoCapture::from_file(&config.usb_device, videoio::CAP_V4L2)?;
                    cap.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)?;
                    cap.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)?;
                    cap
                }
            };
            if !cap.is_opened()? {
                return Err(Error::Camera(format!("failed to open {kind} camera")));
            }
            info!(camera = %kind, width = config.width, height = config.height, "camera opened");
            Ok(CvCamera {
                cap,
                mat: Mat::default(),
            })
        }
    }

    impl Camera for CvCamera {
        fn capture(&mut self) -> Result<Frame> {
            if !self.cap.read(&mut self.mat)? {
                return Err(Error::Camera("camera returned no frame".into()));
            }
            mat_to_frame(&self.mat)
        }
    }

    fn onboard_pipeline(config: &CameraConfig) -> String {
        format!(
            "nvarguscamerasrc sensor-id={} ! \
             video/x-raw(memory:NVMM), width={}, height={}, format=NV12, framerate={}/1 ! \
             nvvidconv ! video/x-raw, format=BGRx ! videoconvert ! video/x-raw, format=BGR ! \
             appsink drop=1",
            config.sensor_id, config.width, config.height, config.framerate
        )
    }

    /// Copies an 8-bit, 3-channel BGR mat into a frame.
    pub fn mat_to_frame(mat: &Mat) -> Result<Frame> {
        let owned;
        let mat = if mat.is_continuous() {
            mat
        } else {
            owned = mat.try_clone()?;
            &owned
        };
        Frame::new(
            mat.cols() as u32,
            mat.rows() as u32,
            PixelFormat::Bgr,
            mat.data_bytes()?.to_vec(),
        )
    }

    /// Copies a frame into an owned BGR mat.
    pub fn frame_to_mat(frame: &Frame) -> Result<Mat> {
        let bgr = frame.convert(PixelFormat::Bgr);
        let flat = Mat::from_slice(&bgr.data[..])?;
        Ok(flat.reshape(3, bgr.height as i32)?.try_clone()?)
    }
}
