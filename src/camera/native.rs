// Copyright (C) 2025 Joshua Kesler
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use super::{CaptureDevice, CaptureError, Frame, poll_channel};
use crate::messages::{camera::CameraMessage, video::VideoConfig};
use crossbeam_channel::{Receiver, TrySendError, bounded};
use nokhwa::{Buffer, CallbackCamera, pixel_format::RgbFormat, utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution}};
use tracing::{info, warn};

const FRAME_QUEUE: usize = 2;

/// A local camera driven by nokhwa's capture thread.
pub struct NativeCamera {
    camera: Option<CallbackCamera>,
    frames: Receiver<CameraMessage>,
    config: VideoConfig
}

impl NativeCamera {
    pub fn open(index: u32, preferred: (u32, u32)) -> Result<Self, CaptureError> {
        let wanted = CameraFormat::new(Resolution::new(preferred.0, preferred.1), FrameFormat::MJPEG, VideoConfig::FALLBACK_FPS as u32);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));
        let (tx, rx) = bounded(FRAME_QUEUE);

        let mut camera = CallbackCamera::new(CameraIndex::Index(index), requested, move |buffer: Buffer| {
            let msg = match buffer.decode_image::<RgbFormat>() {
                Ok(decoded) => CameraMessage::Frame(decoded),
                Err(e) => CameraMessage::Error(format!("Decode failed: {}", e))
            };

            // A full queue means the loop has not caught up; the stale frame wins and this one goes.
            if let Err(TrySendError::Disconnected(_)) = tx.try_send(msg) {
                warn!("Frame receiver gone, dropping frame");
            }
        }).map_err(|e| CaptureError::Unavailable(format!("Camera initialization failed: {}", e)))?;

        if let Err(e) = camera.open_stream() {
            return Err(CaptureError::Unavailable(format!("Stream open failure: {}", e)));
        }

        let format = match camera.camera_format() {
            Ok(f) => f,
            Err(e) => {
                let _ = camera.stop_stream();
                return Err(CaptureError::Unavailable(format!("Query format failed: {}", e)));
            }
        };

        let config = VideoConfig {
            width: format.resolution().width(),
            height: format.resolution().height(),
            fps: format.frame_rate() as f64
        };

        info!("Native camera {} streaming at {} ({})", index, config, format.format());
        Ok(Self { camera: Some(camera), frames: rx, config })
    }
}

impl CaptureDevice for NativeCamera {
    fn config(&self) -> VideoConfig {
        self.config
    }

    fn try_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.camera.is_none() {
            return Err(CaptureError::Closed);
        }

        poll_channel(&self.frames)
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                warn!("Stopping camera stream: {}", e);
            }
        }
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        self.release();
    }
}
