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

//! Frames decoded by an ffmpeg child process, for network streams and
//! recorded files alike.

use super::{CaptureDevice, CaptureError, Frame, poll_channel};
use crate::{media::{FFMPEG, MediaInfo}, messages::{camera::CameraMessage, video::VideoConfig}};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use image::RgbImage;
use std::{io::{ErrorKind, Read}, process::{Child, Command, Stdio}, thread};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Keep up with a live source, dropping frames the consumer has not taken.
    Live,
    /// Never drop; ffmpeg is throttled by the consumer.
    Paced
}

pub struct StreamDevice {
    child: Option<Child>,
    frames: Receiver<CameraMessage>,
    config: VideoConfig
}

impl StreamDevice {
    pub fn spawn(input: &str, info: &MediaInfo, delivery: Delivery) -> Result<Self, CaptureError> {
        if info.width == 0 || info.height == 0 {
            return Err(CaptureError::Unavailable(format!("{} has no usable video size", input)));
        }

        let mut child = Command::new(FFMPEG.as_str())
            .args(["-nostdin", "-loglevel", "error", "-i", input, "-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CaptureError::Unavailable(format!("Failed to spawn {}: {}", FFMPEG.as_str(), e)))?;

        let stdout = match child.stdout.take() {
            Some(out) => out,
            None => {
                reap(&mut child);
                return Err(CaptureError::Unavailable(String::from("ffmpeg stdout unavailable")));
            }
        };

        let config = VideoConfig { width: info.width, height: info.height, fps: info.fps };
        let capacity = match delivery { Delivery::Live => 2, Delivery::Paced => 4 };
        let (tx, rx) = bounded(capacity);
        let spawned = thread::Builder::new()
            .name(String::from("ffmpeg-reader"))
            .spawn(move || read_frames(stdout, config, delivery, tx));
        if let Err(e) = spawned {
            reap(&mut child);
            return Err(CaptureError::Unavailable(format!("Reader thread failed: {}", e)));
        }

        info!("Decoding {} at {}", input, config);
        Ok(Self { child: Some(child), frames: rx, config })
    }
}

fn read_frames<R: Read>(mut stdout: R, config: VideoConfig, delivery: Delivery, tx: Sender<CameraMessage>) {
    loop {
        let mut buf = vec![0u8; config.frame_len()];
        let msg = match stdout.read_exact(&mut buf) {
            Ok(()) => match RgbImage::from_raw(config.width, config.height, buf) {
                Some(frame) => CameraMessage::Frame(frame),
                None => CameraMessage::Error(String::from("short frame buffer"))
            },
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                let _ = tx.send(CameraMessage::EndOfStream);
                break;
            },
            Err(e) => {
                let _ = tx.send(CameraMessage::Error(format!("Read failed: {}", e)));
                break;
            }
        };

        let delivered = match delivery {
            Delivery::Paced => tx.send(msg).is_ok(),
            Delivery::Live => !matches!(tx.try_send(msg), Err(TrySendError::Disconnected(_)))
        };
        if !delivered {
            break;
        }
    }
    debug!("ffmpeg reader finished");
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("ffmpeg already exited: {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("ffmpeg wait error: {}", e);
    }
}

impl CaptureDevice for StreamDevice {
    fn config(&self) -> VideoConfig {
        self.config
    }

    fn try_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.child.is_none() {
            return Err(CaptureError::Closed);
        }

        poll_channel(&self.frames)
    }

    fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            reap(&mut child);
        }
    }
}

impl Drop for StreamDevice {
    fn drop(&mut self) {
        self.release();
    }
}
