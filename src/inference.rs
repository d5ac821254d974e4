use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::info;

use crate::config::{Choice, NetworkConfig};
use crate::error::Result;
use crate::frame::Frame;

/// Draws network output over a frame.
pub trait Annotator: Send {
    fn annotate(&mut self, frame: Frame) -> Result<Frame>;

    /// Waits for outstanding device work on the last frame.
    fn synchronize(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<A: Annotator + ?Sized> Annotator for Box<A> {
    fn annotate(&mut self, frame: Frame) -> Result<Frame> {
        (**self).annotate(frame)
    }

    fn synchronize(&mut self) -> Result<()> {
        (**self).synchronize()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    /// Object boxes from SSD-MobileNet-v2.
    Detect,
    /// Class overlay from FCN-ResNet18-SUN.
    Segment,
    /// Raw camera frames.
    Passthrough,
}

impl Choice for NetworkKind {
    const VARIANTS: &'static [&'static str] = &["detect", "segment", "none"];
}

impl FromStr for NetworkKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "detect" => Ok(NetworkKind::Detect),
            "segment" => Ok(NetworkKind::Segment),
            "none" => Ok(NetworkKind::Passthrough),
            other => Err(format!("unknown network {other}")),
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkKind::Detect => "detect",
            NetworkKind::Segment => "segment",
            NetworkKind::Passthrough => "none",
        })
    }
}

/// Loads the annotator for `kind`; `Passthrough` loads nothing.
pub fn load_annotator(
    kind: NetworkKind,
    config: &NetworkConfig,
) -> Result<Option<Box<dyn Annotator>>> {
    let annotator: Box<dyn Annotator> = match kind {
        NetworkKind::Passthrough => return Ok(None),
        #[cfg(feature = "opencv")]
        NetworkKind::Detect => Box::new(cv::DetectNet::load(config)?),
        #[cfg(feature = "opencv")]
        NetworkKind::Segment => Box::new(cv::SegNet::load(config)?),
        #[cfg(not(feature = "opencv"))]
        NetworkKind::Detect | NetworkKind::Segment => {
            let _ = config;
            return Err(crate::error::Error::Inference(format!(
                "network {kind} needs the opencv feature"
            )));
        }
    };
    info!(network = %kind, "network loaded");
    Ok(Some(annotator))
}

/// Reads a class label file, one name per line.
pub fn read_labels(path: &Path) -> Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(|line| line.trim().to_owned())
        .collect())
}

pub fn class_label(labels: &[String], class_id: i32) -> String {
    usize::try_from(class_id)
        .ok()
        .and_then(|id| labels.get(id))
        .filter(|name| !name.is_empty())
        .cloned()
        .unwrap_or_else(|| format!("class {class_id}"))
}

#[cfg(feature = "opencv")]
pub use self::cv::{DetectNet, SegNet};

#[cfg(feature = "opencv")]
mod cv {
    use std::path::Path;

    use opencv::core::{self, Mat, Point, Rect, Scalar, Size, Vector, CV_8U};
    use opencv::dnn::{DetectionModel, SegmentationModel};
    use opencv::imgproc;
    use opencv::prelude::*;

    use super::{class_label, read_labels, Annotator};
    use crate::camera::{frame_to_mat, mat_to_frame};
    use crate::config::NetworkConfig;
    use crate::error::{Error, Result};
    use crate::frame::Frame;

    const NMS_THRESHOLD: f32 = 0.4;

    fn dnn_err(err: opencv::Error) -> Error {
        Error::Inference(err.to_string())
    }

    fn path_str(path: &Path) -> Result<&str> {
        path.to_str()
            .ok_or_else(|| Error::Inference(format!("non UTF-8 model path {}", path.display())))
    }

    /// SSD-MobileNet-v2 object detection drawn as labelled boxes.
    pub struct DetectNet {
        model: DetectionModel,
        labels: Vec<String>,
        threshold: f32,
    }

    impl DetectNet {
        pub fn load(config: &NetworkConfig) -> Result<Self> {
            let mut model = DetectionModel::new(
                path_str(&config.detect_model)?,
                path_str(&config.detect_config)?,
            )
            .map_err(dnn_err)?;
            model
                .set_input_params(
                    1.0 / 127.5,
                    Size::new(300, 300),
                    Scalar::all(127.5),
                    true,
                    false,
                )
                .map_err(dnn_err)?;
            Ok(DetectNet {
                model,
                labels: read_labels(&config.detect_labels)?,
                threshold: config.detect_threshold,
            })
        }
    }

    impl Annotator for DetectNet {
        fn annotate(&mut self, frame: Frame) -> Result<Frame> {
            let mut mat = frame_to_mat(&frame)?;
            let mut class_ids = Vector::<i32>::new();
            let mut confidences = Vector::<f32>::new();
            let mut boxes = Vector::<Rect>::new();
            self.model
                .detect(
                    &mat,
                    &mut class_ids,
                    &mut confidences,
                    &mut boxes,
                    self.threshold,
                    NMS_THRESHOLD,
                )
                .map_err(dnn_err)?;

            let color = Scalar::new(0.0, 255.0, 0.0, 0.0);
            for ((class_id, confidence), rect) in class_ids.iter().zip(confidences.iter()).zip(boxes.iter()) {
                imgproc::rectangle(&mut mat, rect, color, 2, imgproc::LINE_8, 0)?;
                imgproc::put_text(
                    &mut mat,
                    &format!(
                        "{}: {:.0}%",
                        class_label(&self.labels, class_id),
                        confidence * 100.0
                    ),
                    Point::new(rect.x, (rect.y - 6).max(12)),
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    0.5,
                    color,
                    1,
                    imgproc::LINE_AA,
                    false,
                )?;
            }
            mat_to_frame(&mat)
        }
    }

    /// FCN-ResNet18-SUN segmentation blended over the frame.
    pub struct SegNet {
        model: SegmentationModel,
        alpha: f64,
    }

    impl SegNet {
        pub fn load(config: &NetworkConfig) -> Result<Self> {
            let mut model =
                SegmentationModel::new(path_str(&config.segment_model)?, "").map_err(dnn_err)?;
            model
                .set_input_params(
                    1.0 / 255.0,
                    Size::new(512, 400),
                    Scalar::default(),
                    true,
                    false,
                )
                .map_err(dnn_err)?;
            Ok(SegNet {
                model,
                alpha: f64::from(config.overlay_alpha) / 255.0,
            })
        }
    }

    impl Annotator for SegNet {
        fn annotate(&mut self, frame: Frame) -> Result<Frame> {
            let mat = frame_to_mat(&frame)?;
            let mut classes = Mat::default();
            self.model.segment(&mat, &mut classes).map_err(dnn_err)?;

            // Spread the 21 SUN classes over the color map.
            let mut spread = Mat::default();
            classes.convert_to(&mut spread, CV_8U, 12.0, 0.0)?;
            let mut colored = Mat::default();
            imgproc::apply_color_map(&spread, &mut colored, imgproc::COLORMAP_JET)?;
            let mut overlay = Mat::default();
            imgproc::resize(
                &colored,
                &mut overlay,
                mat.size()?,
                0.0,
                0.0,
                imgproc::INTER_NEAREST,
            )?;

            let mut blended = Mat::default();
            core::add_weighted(&mat, 1.0 - self.alpha, &overlay, self.alpha, 0.0, &mut blended, -1)?;
            mat_to_frame(&blended)
        }
    }
}
