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

mod native;
pub mod stream;

use crate::{media, messages::{camera::CameraMessage, video::VideoConfig}};
use crossbeam_channel::{Receiver, TryRecvError};
use image::RgbImage;
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::{debug, info, warn};

pub type Frame = RgbImage;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("cannot open camera source: {0}")]
    Unavailable(String),
    #[error("camera is not started")]
    Closed,
    #[error("camera connection lost: {0}")]
    Lost(String),
    #[error("end of stream")]
    EndOfStream
}

/// Where frames come from: a local device index or a stream URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    Index(u32),
    Uri(String)
}

impl FromStr for CaptureSource {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CaptureError::Unavailable(String::from("no camera source given")));
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = s.parse() {
                return Ok(CaptureSource::Index(index));
            }
        }

        Ok(CaptureSource::Uri(s.to_string()))
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSource::Index(i) => write!(f, "{}", i),
            CaptureSource::Uri(u) => write!(f, "{}", u)
        }
    }
}

/// An opened device. Implementations hand frames over from their own
/// producer thread, so `try_frame` never waits on the hardware.
pub trait CaptureDevice {
    /// Geometry and rate as the device reports them; the rate may be 0.
    fn config(&self) -> VideoConfig;
    fn try_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
    fn release(&mut self);
}

pub trait CaptureBackend {
    fn open(&self, source: &CaptureSource, preferred: (u32, u32)) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// nokhwa for local indices, ffmpeg for everything addressed by URI.
#[derive(Default)]
pub struct SystemBackend;

impl CaptureBackend for SystemBackend {
    fn open(&self, source: &CaptureSource, preferred: (u32, u32)) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        match source {
            CaptureSource::Index(index) => Ok(Box::new(native::NativeCamera::open(*index, preferred)?)),
            CaptureSource::Uri(uri) => {
                debug!("Preferred size {}x{} does not apply to streams", preferred.0, preferred.1);
                let info = media::probe(uri).map_err(|e| CaptureError::Unavailable(e.to_string()))?;
                Ok(Box::new(stream::StreamDevice::spawn(uri, &info, stream::Delivery::Live)?))
            }
        }
    }
}

/// Takes the next message off a producer channel without blocking.
pub(crate) fn poll_channel(rx: &Receiver<CameraMessage>) -> Result<Option<Frame>, CaptureError> {
    match rx.try_recv() {
        Ok(CameraMessage::Frame(frame)) => Ok(Some(frame)),
        Ok(CameraMessage::Error(e)) => {
            warn!("Dropped frame: {}", e);
            Ok(None)
        },
        Ok(CameraMessage::EndOfStream) => Err(CaptureError::EndOfStream),
        Err(TryRecvError::Empty) => Ok(None),
        Err(TryRecvError::Disconnected) => Err(CaptureError::Lost(String::from("frame producer stopped")))
    }
}

pub struct CaptureSession {
    source: CaptureSource,
    config: VideoConfig,
    device: Option<Box<dyn CaptureDevice>>
}

impl CaptureSession {
    pub fn open<B: CaptureBackend + ?Sized>(backend: &B, source: &CaptureSource) -> Result<Self, CaptureError> {
        let preferred = (VideoConfig::PREFERRED_WIDTH, VideoConfig::PREFERRED_HEIGHT);
        let mut device = backend.open(source, preferred)?;
        let raw = device.config();
        if raw.width == 0 || raw.height == 0 {
            device.release();
            return Err(CaptureError::Unavailable(format!("{} reported an empty frame size", source)));
        }

        let config = VideoConfig::reported(raw.width, raw.height, raw.fps);
        info!("Camera {} opened: {}", source, config);
        Ok(Self { source: source.clone(), config, device: Some(device) })
    }

    pub fn config(&self) -> VideoConfig {
        self.config
    }

    pub fn frame_rate(&self) -> f64 {
        self.config.fps
    }

    pub fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let device = self.device.as_mut().ok_or(CaptureError::Closed)?;
        device.try_frame()
    }

    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
            info!("Camera {} released", self.source);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the source and lets go of it straight away.
pub fn test_connection<B: CaptureBackend + ?Sized>(backend: &B, source: &CaptureSource) -> Result<(), CaptureError> {
    let mut session = CaptureSession::open(backend, source)?;
    session.close();
    Ok(())
}
