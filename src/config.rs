use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings shared by both servers, read from an optional TOML file.
/// Every table and key may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
    pub network: NetworkConfig,
    pub drive: DriveConfig,
    pub light: LightConfig,
    pub launcher: LauncherConfig,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8666".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// CSI sensor used by the onboard camera.
    pub sensor_id: u32,
    pub usb_device: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            framerate: 30,
            sensor_id: 0,
            usb_device: "/dev/video1".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub interval_ms: u64,
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { interval_ms: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub jpeg_quality: u8,
    pub interval_ms: u64,
}

impl StreamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 95,
            interval_ms: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub detect_model: PathBuf,
    pub detect_config: PathBuf,
    /// One class name per line, indexed by class id.
    pub detect_labels: PathBuf,
    pub detect_threshold: f32,
    pub segment_model: PathBuf,
    /// Overlay opacity out of 255.
    pub overlay_alpha: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            detect_model: "networks/ssd-mobilenet-v2/frozen_inference_graph.pb".into(),
            detect_config: "networks/ssd-mobilenet-v2/ssd_mobilenet_v2_coco.pbtxt".into(),
            detect_labels: "networks/ssd-mobilenet-v2/ssd_coco_labels.txt".into(),
            detect_threshold: 0.5,
            segment_model: "networks/fcn-resnet18-sun/fcn_resnet18.onnx".into(),
            overlay_alpha: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub i2c_bus: u8,
    pub i2c_address: u16,
    pub left_motor: u8,
    pub right_motor: u8,
    pub left_axis: usize,
    pub right_axis: usize,
    pub dead_zone: f64,
    pub scale: f64,
    pub light_button: usize,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            i2c_address: 0x60,
            left_motor: 1,
            right_motor: 2,
            left_axis: 1,
            right_axis: 3,
            dead_zone: 0.2,
            scale: -0.5,
            light_button: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// BCM pin numbers driven together.
    pub pins: Vec<u8>,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self { pins: vec![13, 21] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Hid,
    Usb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub transport: TransportKind,
    pub hold_ms: u64,
}

impl LauncherConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x2123,
            product_id: 0x1010,
            transport: TransportKind::Hid,
            hold_ms: 1000,
        }
    }
}

/// A command line value restricted to a fixed set of names.
pub trait Choice: FromStr + Sized {
    const VARIANTS: &'static [&'static str];
}

/// Parses a restricted command line value. An invalid value prints the
/// accepted names and exits the process with status 0.
pub fn parse_choice<T: Choice>(argument: &str, value: &str) -> T {
    match value.parse() {
        Ok(choice) => choice,
        Err(_) => {
            println!("{}", invalid_choice_message::<T>(argument));
            std::process::exit(0)
        }
    }
}

pub fn invalid_choice_message<T: Choice>(argument: &str) -> String {
    format!(
        "ERROR! Invalid value for {argument} argument.\nPossible values: {}.",
        T::VARIANTS.iter().join(", ")
    )
}
