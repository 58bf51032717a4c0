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

//! In-memory stand-ins for cameras, encoders and media files.

use crate::{
    camera::{CaptureBackend, CaptureDevice, CaptureError, CaptureSource, Frame},
    media::MediaInfo,
    messages::video::VideoConfig,
    playback::{MediaOpener, PlaybackError},
    recorder::{FrameSink, RecordError, SinkFactory, types::FourCc}
};
use image::{Rgb, RgbImage};
use std::{collections::VecDeque, fs, io, path::{Path, PathBuf}, sync::{Arc, Mutex, MutexGuard}, time::Duration};

struct DeviceState {
    config: VideoConfig,
    available: bool,
    open: usize,
    opened_total: usize,
    reads: usize,
    queue: VecDeque<Result<Option<Frame>, CaptureError>>
}

#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<DeviceState>>
}

impl FakeBackend {
    /// `fps` is what the device reports, so 0 exercises the fallback.
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                config: VideoConfig { width, height, fps },
                available: true,
                open: 0,
                opened_total: 0,
                reads: 0,
                queue: VecDeque::new()
            }))
        }
    }

    pub fn unavailable() -> Self {
        let backend = Self::new(1280, 720, 30.0);
        backend.lock().available = false;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap()
    }

    pub fn push_frame(&self) {
        let mut state = self.lock();
        let frame = RgbImage::from_pixel(state.config.width, state.config.height, Rgb([90, 120, 150]));
        state.queue.push_back(Ok(Some(frame)));
    }

    pub fn push_error(&self, error: CaptureError) {
        self.lock().queue.push_back(Err(error));
    }

    pub fn open_count(&self) -> usize {
        self.lock().open
    }

    pub fn opened_total(&self) -> usize {
        self.lock().opened_total
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }
}

impl CaptureBackend for FakeBackend {
    fn open(&self, source: &CaptureSource, _preferred: (u32, u32)) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let mut state = self.lock();
        if !state.available {
            return Err(CaptureError::Unavailable(format!("no device at {}", source)));
        }
        state.open += 1;
        state.opened_total += 1;
        Ok(Box::new(FakeDevice { state: self.state.clone(), released: false }))
    }
}

struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
    released: bool
}

impl CaptureDevice for FakeDevice {
    fn config(&self) -> VideoConfig {
        self.state.lock().unwrap().config
    }

    fn try_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released {
            return Err(CaptureError::Closed);
        }
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        state.queue.pop_front().unwrap_or(Ok(None))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.lock().unwrap().open -= 1;
        }
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone)]
pub struct SinkRecord {
    pub path: PathBuf,
    pub config: VideoConfig,
    pub codec: FourCc,
    pub frames: u64,
    pub sizes: Vec<(u32, u32)>,
    pub finished: bool
}

#[derive(Default)]
struct SinkState {
    refuse: bool,
    fail_writes: bool,
    records: Vec<SinkRecord>
}

/// Sink factory that touches the output file and counts what it was given.
#[derive(Clone, Default)]
pub struct MemorySinks {
    state: Arc<Mutex<SinkState>>
}

impl MemorySinks {
    pub fn failing() -> Self {
        let sinks = Self::default();
        sinks.state.lock().unwrap().refuse = true;
        sinks
    }

    pub fn failing_writes() -> Self {
        let sinks = Self::default();
        sinks.state.lock().unwrap().fail_writes = true;
        sinks
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().records.iter().filter(|r| !r.finished).count()
    }
}

impl SinkFactory for MemorySinks {
    fn create(&self, path: &Path, config: &VideoConfig, codec: FourCc) -> Result<Box<dyn FrameSink>, RecordError> {
        let mut state = self.state.lock().unwrap();
        if state.refuse {
            return Err(RecordError::SinkUnavailable(String::from("encoder refused")));
        }
        fs::File::create(path)?;
        state.records.push(SinkRecord { path: path.to_path_buf(), config: *config, codec, frames: 0, sizes: Vec::new(), finished: false });
        Ok(Box::new(MemorySink { state: self.state.clone(), index: state.records.len() - 1 }))
    }
}

struct MemorySink {
    state: Arc<Mutex<SinkState>>,
    index: usize
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(RecordError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "encoder went away")));
        }
        let record = &mut state.records[self.index];
        record.frames += 1;
        record.sizes.push(frame.dimensions());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), RecordError> {
        self.state.lock().unwrap().records[self.index].finished = true;
        Ok(())
    }
}

/// A media file of `frames` frames followed by end of stream.
#[derive(Clone)]
pub struct FakeMedia {
    backend: FakeBackend,
    frames: usize,
    info: MediaInfo
}

impl FakeMedia {
    pub fn new(frames: usize, fps: f64, duration: Option<Duration>) -> Self {
        Self {
            backend: FakeBackend::new(64, 48, fps),
            frames,
            info: MediaInfo { width: 64, height: 48, fps, duration }
        }
    }

    pub fn backend(&self) -> &FakeBackend {
        &self.backend
    }
}

impl MediaOpener for FakeMedia {
    fn open(&self, path: &Path) -> Result<(Box<dyn CaptureDevice>, MediaInfo), PlaybackError> {
        for _ in 0..self.frames {
            self.backend.push_frame();
        }
        self.backend.push_error(CaptureError::EndOfStream);
        let device = self.backend.open(&CaptureSource::Uri(path.to_string_lossy().into_owned()), (64, 48))?;
        Ok((device, self.info.clone()))
    }
}
