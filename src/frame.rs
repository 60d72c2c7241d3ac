//! Captured frames.
//!
//! A `Frame` owns tightly packed RGB24 pixels at the resolution the camera
//! negotiated. Frames only touch disk when the capture loop hands them to the
//! detection client as a temporary JPEG artifact.

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};
use std::path::Path;

/// One RGB frame pulled from a camera source.
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap RGB24 pixels. Fails when the buffer length does not match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Encode the frame as JPEG at `path`.
    pub fn write_jpeg(&self, path: &Path) -> Result<()> {
        let image = RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))?;
        image
            .save_with_format(path, ImageFormat::Jpeg)
            .with_context(|| format!("write jpeg {}", path.display()))
    }
}
