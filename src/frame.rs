use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::error::{Error, Result};

/// Pixel order the JPEG encoder consumes. The capture loop converts every
/// frame to this before publishing.
pub const ENCODER_FORMAT: PixelFormat = PixelFormat::Rgb;

pub const BOUNDARY: &str = "frame";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba,
    Rgb,
    Bgr,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
        }
    }

    fn rgb(&self, px: &[u8]) -> [u8; 3] {
        match self {
            PixelFormat::Rgba | PixelFormat::Rgb => [px[0], px[1], px[2]],
            PixelFormat::Bgr => [px[2], px[1], px[0]],
        }
    }

    fn write(&self, [r, g, b]: [u8; 3], out: &mut BytesMut) {
        match self {
            PixelFormat::Rgba => out.put_slice(&[r, g, b, 255]),
            PixelFormat::Rgb => out.put_slice(&[r, g, b]),
            PixelFormat::Bgr => out.put_slice(&[b, g, r]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(Error::Frame(format!(
                "{width}x{height} {format:?} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Frame {
            width,
            height,
            format,
            data,
        })
    }

    /// Returns the frame in `target` pixel order. Alpha is dropped going to
    /// three channels and filled opaque coming from them.
    pub fn convert(&self, target: PixelFormat) -> Frame {
        if self.format == target {
            return self.clone();
        }
        let pixels = self.width as usize * self.height as usize;
        let mut out = BytesMut::with_capacity(pixels * target.bytes_per_pixel());
        for px in self.data.chunks_exact(self.format.bytes_per_pixel()) {
            target.write(self.format.rgb(px), &mut out);
        }
        Frame {
            width: self.width,
            height: self.height,
            format: target,
            data: out.freeze(),
        }
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let rgb = frame.convert(PixelFormat::Rgb);
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode(
        &rgb.data,
        rgb.width,
        rgb.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(jpeg)
}

pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let mut chunk = BytesMut::with_capacity(jpeg.len() + 64);
    chunk.put_slice(b"--");
    chunk.put_slice(BOUNDARY.as_bytes());
    chunk.put_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    chunk.put_slice(jpeg);
    chunk.put_slice(b"\r\n");
    chunk.freeze()
}
