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

pub mod types;
mod ffmpeg;

pub use ffmpeg::FfmpegSinkFactory;

use crate::{camera::Frame, messages::video::VideoConfig};
use chrono::{DateTime, Local, TimeZone};
use std::{fmt, fs, io, path::{Path, PathBuf}, time::{Duration, Instant}};
use thiserror::Error;
use tracing::{debug, info, warn};
use types::{FourCc, sanitize_name, unique_path};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Please specify {0}.")]
    MissingField(&'static str),
    #[error("Please start the camera before recording.")]
    NotCapturing,
    #[error("Could not create the video file: {0}")]
    SinkUnavailable(String),
    #[error("Frame is {got_width}x{got_height} but the recording is {width}x{height}")]
    FrameSize { width: u32, height: u32, got_width: u32, got_height: u32 },
    #[error("Recording already stopped")]
    Stopped,
    #[error("Write failed: {0}")]
    Io(#[from] io::Error)
}

/// Destination that encodes a sequence of frames into one file.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordError>;
    /// Flushes and closes the file. The sink is gone afterwards whatever the outcome.
    fn finish(self: Box<Self>) -> Result<(), RecordError>;
}

pub trait SinkFactory {
    fn create(&self, path: &Path, config: &VideoConfig, codec: FourCc) -> Result<Box<dyn FrameSink>, RecordError>;
}

pub struct RecordingSession {
    path: PathBuf,
    config: VideoConfig,
    started: Instant,
    sink: Option<Box<dyn FrameSink>>,
    frames: u64,
    stopped_after: Option<Duration>
}

impl RecordingSession {
    pub fn start<F: SinkFactory + ?Sized>(sinks: &F, output_dir: &str, name: &str, config: VideoConfig) -> Result<Self, RecordError> {
        Self::start_at(sinks, output_dir, name, config, &Local::now(), Instant::now())
    }

    /// `at` names the file, `started` anchors the elapsed clock.
    pub fn start_at<F, Tz>(sinks: &F, output_dir: &str, name: &str, config: VideoConfig, at: &DateTime<Tz>, started: Instant) -> Result<Self, RecordError>
    where
        F: SinkFactory + ?Sized,
        Tz: TimeZone,
        Tz::Offset: fmt::Display
    {
        if output_dir.trim().is_empty() {
            return Err(RecordError::MissingField("an output directory"));
        }

        let sanitized = sanitize_name(name);
        if sanitized.is_empty() {
            return Err(RecordError::MissingField("a video name"));
        }

        let dir = Path::new(output_dir);
        fs::create_dir_all(dir).map_err(|e| RecordError::SinkUnavailable(format!("cannot create {}: {}", dir.display(), e)))?;

        let path = unique_path(dir, &sanitized, at);
        let sink = sinks.create(&path, &config, FourCc::XVID)?;
        info!("Recording to {} at {} ({})", path.display(), config, FourCc::XVID);

        Ok(Self { path, config, started, sink: Some(sink), frames: 0, stopped_after: None })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> VideoConfig {
        self.config
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordError> {
        let sink = self.sink.as_mut().ok_or(RecordError::Stopped)?;
        let (got_width, got_height) = frame.dimensions();
        if (got_width, got_height) != (self.config.width, self.config.height) {
            return Err(RecordError::FrameSize { width: self.config.width, height: self.config.height, got_width, got_height });
        }

        sink.write_frame(frame)?;
        self.frames += 1;
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        self.stopped_after.unwrap_or_else(|| now.saturating_duration_since(self.started))
    }

    pub fn stop(&mut self) -> Result<Duration, RecordError> {
        self.stop_at(Instant::now())
    }

    pub fn stop_at(&mut self, now: Instant) -> Result<Duration, RecordError> {
        let Some(sink) = self.sink.take() else {
            return Ok(self.elapsed_at(now));
        };

        let elapsed = now.saturating_duration_since(self.started);
        self.stopped_after = Some(elapsed);
        match sink.finish() {
            Ok(()) => {
                info!("Saved {} ({} frames, {})", self.path.display(), self.frames, types::format_elapsed(elapsed));
                Ok(elapsed)
            },
            Err(e) => {
                warn!("Finishing {} failed: {}", self.path.display(), e);
                Err(e)
            }
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.sink.is_some() {
            debug!("Recording dropped while active, stopping");
            if let Err(e) = self.stop() {
                warn!("Stopping dropped recording: {}", e);
            }
        }
    }
}
