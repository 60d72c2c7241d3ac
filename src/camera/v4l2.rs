//! V4L2 camera backend.
//!
//! Opens a local device node, negotiates the configured resolution and
//! converts each captured buffer to RGB24.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CameraConfig, CameraStats};
use crate::frame::Frame;

pub(super) struct DeviceCamera {
    config: CameraConfig,
    device_path: String,
    state: DeviceState,
    format: PixelFormat,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceCamera {
    pub(super) fn open(config: CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device_path = config.device_path();
        let mut device = v4l::Device::with_path(&device_path)
            .with_context(|| format!("cannot open camera {}", device_path))?;

        let mut requested = device.format().context("read v4l2 format")?;
        requested.width = config.width;
        requested.height = config.height;
        requested.fourcc = v4l::FourCC::new(b"YUYV");

        let format = match device.set_format(&requested) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("camera {}: failed to set format: {}", device_path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera {} negotiated unsupported pixel format {}",
                device_path,
                format.fourcc
            )
        })?;

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("camera {}: failed to set fps: {}", device_path, err);
            }
        }

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "camera {} opened ({}x{}, {:?})",
            device_path,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            config,
            device_path,
            state,
            format: pixel_format,
            frame_count: 0,
            active_width: format.width,
            active_height: format.height,
        })
    }

    pub(super) fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let buf = self
            .state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;
        let pixels = normalize_to_rgb(&buf, self.active_width, self.active_height, self.format)?;

        self.frame_count += 1;
        Frame::from_rgb(pixels, self.active_width, self.active_height)
    }

    pub(super) fn resolution(&self) -> (u32, u32) {
        (self.active_width, self.active_height)
    }

    pub(super) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: format!("{} ({})", self.config.device, self.device_path),
        }
    }
}
