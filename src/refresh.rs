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

//! The cooperative scheduler behind the live view.
//!
//! Nothing here spawns or sleeps. The owner calls [`RefreshLoop::poll`] from
//! its event loop and asks [`RefreshLoop::next_deadline`] how long it may
//! idle. Pending work is two deadlines: the next frame tick and, while
//! recording, the next duration readout. Cancelling either just clears it.

use crate::{
    camera::{CaptureBackend, CaptureError, CaptureSession, CaptureSource, test_connection},
    display::{Viewport, scale_to_viewport},
    messages::video::VideoConfig,
    recorder::{RecordError, RecordingSession, SinkFactory, types::format_elapsed}
};
use chrono::Local;
use image::RgbImage;
use std::{path::Path, time::{Duration, Instant}};
use tracing::{info, warn};

pub const TICK_INTERVAL: Duration = Duration::from_millis(10);
pub const DURATION_INTERVAL: Duration = Duration::from_secs(1);
/// How long the device may go without producing a frame before it counts as lost.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Previewing,
    PreviewingAndRecording
}

/// What one `poll` produced for the UI.
#[derive(Default)]
pub struct TickReport {
    pub display: Option<RgbImage>,
    pub duration: Option<String>,
    /// The camera was shut down because of this.
    pub capture_error: Option<CaptureError>,
    /// The recording was shut down because of this.
    pub record_error: Option<RecordError>
}

pub struct RefreshLoop<B: CaptureBackend, S: SinkFactory> {
    backend: B,
    sinks: S,
    capture: Option<CaptureSession>,
    recording: Option<RecordingSession>,
    next_tick: Option<Instant>,
    next_duration: Option<Instant>,
    last_frame_at: Option<Instant>,
    duration_text: String
}

impl<B: CaptureBackend, S: SinkFactory> RefreshLoop<B, S> {
    pub fn new(backend: B, sinks: S) -> Self {
        Self {
            backend,
            sinks,
            capture: None,
            recording: None,
            next_tick: None,
            next_duration: None,
            last_frame_at: None,
            duration_text: format_elapsed(Duration::ZERO)
        }
    }

    pub fn state(&self) -> LoopState {
        match (&self.capture, &self.recording) {
            (None, _) => LoopState::Stopped,
            (Some(_), None) => LoopState::Previewing,
            (Some(_), Some(_)) => LoopState::PreviewingAndRecording
        }
    }

    /// A running camera already holds the device, so it is not opened twice.
    pub fn test_connection(&self, source: &CaptureSource) -> Result<(), CaptureError> {
        if self.capture.is_some() {
            return Ok(());
        }
        test_connection(&self.backend, source)
    }

    pub fn capture_config(&self) -> Option<VideoConfig> {
        self.capture.as_ref().map(CaptureSession::config)
    }

    pub fn recording_path(&self) -> Option<&Path> {
        self.recording.as_ref().map(RecordingSession::path)
    }

    pub fn duration_text(&self) -> &str {
        &self.duration_text
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [self.next_tick, self.next_duration].into_iter().flatten().min()
    }

    pub fn start_camera(&mut self, source: &CaptureSource, now: Instant) -> Result<VideoConfig, CaptureError> {
        if let Some(capture) = &self.capture {
            return Ok(capture.config());
        }

        let capture = CaptureSession::open(&self.backend, source)?;
        let config = capture.config();
        self.capture = Some(capture);
        self.next_tick = Some(now);
        self.last_frame_at = Some(now);
        Ok(config)
    }

    /// Stops any recording first, then releases the device. Returns the
    /// recording's outcome if one was running.
    pub fn stop_camera(&mut self, now: Instant) -> Option<Result<Duration, RecordError>> {
        let saved = self.stop_recording(now);
        self.next_tick = None;
        self.last_frame_at = None;
        if let Some(mut capture) = self.capture.take() {
            capture.close();
        }
        saved
    }

    pub fn start_recording(&mut self, output_dir: &str, name: &str, now: Instant) -> Result<&Path, RecordError> {
        let Some(capture) = &self.capture else {
            return Err(RecordError::NotCapturing);
        };

        if self.recording.is_none() {
            let session = RecordingSession::start_at(&self.sinks, output_dir, name, capture.config(), &Local::now(), now)?;
            self.recording = Some(session);
            self.duration_text = format_elapsed(Duration::ZERO);
            self.next_duration = Some(now + DURATION_INTERVAL);
        }

        self.recording_path().ok_or(RecordError::Stopped)
    }

    pub fn stop_recording(&mut self, now: Instant) -> Option<Result<Duration, RecordError>> {
        let mut recording = self.recording.take()?;
        self.next_duration = None;
        self.duration_text = format_elapsed(Duration::ZERO);
        Some(recording.stop_at(now))
    }

    pub fn poll(&mut self, now: Instant, viewport: Option<Viewport>) -> TickReport {
        let mut report = TickReport::default();

        if self.next_tick.is_some_and(|at| at <= now) {
            self.tick(now, viewport, &mut report);
        }

        if self.next_duration.is_some_and(|at| at <= now) {
            match &self.recording {
                Some(recording) => {
                    self.duration_text = format_elapsed(recording.elapsed_at(now));
                    report.duration = Some(self.duration_text.clone());
                    self.next_duration = Some(now + DURATION_INTERVAL);
                },
                None => self.next_duration = None
            }
        }

        report
    }

    fn tick(&mut self, now: Instant, viewport: Option<Viewport>, report: &mut TickReport) {
        let Some(capture) = self.capture.as_mut() else {
            self.next_tick = None;
            return;
        };

        match capture.read_frame() {
            Ok(Some(frame)) => {
                self.last_frame_at = Some(now);

                // record before any display work so the file gets the frame untouched
                let written = self.recording.as_mut().map(|r| r.write_frame(&frame));
                if let Some(Err(e)) = written {
                    warn!("Recording write failed: {}", e);
                    if let Some(Err(stop_err)) = self.stop_recording(now) {
                        warn!("Releasing failed recording: {}", stop_err);
                    }
                    report.record_error = Some(e);
                }

                if let Some(viewport) = viewport {
                    report.display = Some(scale_to_viewport(&frame, viewport));
                }
            },
            Ok(None) => {
                let stalled = self.last_frame_at.is_some_and(|at| now.saturating_duration_since(at) >= STALL_TIMEOUT);
                if stalled {
                    let reason = format!("no frame for {} seconds", STALL_TIMEOUT.as_secs());
                    self.fail_capture(now, CaptureError::Lost(reason), report);
                    return;
                }
            },
            Err(e) => {
                self.fail_capture(now, e, report);
                return;
            }
        }

        self.next_tick = Some(now + TICK_INTERVAL);
    }

    fn fail_capture(&mut self, now: Instant, error: CaptureError, report: &mut TickReport) {
        warn!("Stopping camera: {}", error);
        if let Some(Err(e)) = self.stop_camera(now) {
            report.record_error = Some(e);
        }
        report.capture_error = Some(error);
    }
}

impl<B: CaptureBackend, S: SinkFactory> Drop for RefreshLoop<B, S> {
    fn drop(&mut self) {
        if self.capture.is_some() {
            info!("Shutting down live view");
            if let Some(Err(e)) = self.stop_camera(Instant::now()) {
                warn!("Recording did not close cleanly: {}", e);
            }
        }
    }
}
