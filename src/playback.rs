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

use crate::{
    camera::{CaptureDevice, CaptureError, Frame, stream::{Delivery, StreamDevice}},
    media::{self, MediaInfo, ProbeError},
    messages::video::VideoConfig,
    recorder::types::format_elapsed
};
use std::{fs, io, path::{Path, PathBuf}, time::{Duration, Instant}};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Cannot read video: {0}")]
    Probe(#[from] ProbeError),
    #[error("Cannot decode video: {0}")]
    Capture(#[from] CaptureError),
    #[error("Cannot delete video: {0}")]
    Io(#[from] io::Error)
}

pub trait MediaOpener {
    fn open(&self, path: &Path) -> Result<(Box<dyn CaptureDevice>, MediaInfo), PlaybackError>;
}

/// ffprobe for the metadata, a paced ffmpeg decode for the frames.
#[derive(Default)]
pub struct FfmpegMedia;

impl MediaOpener for FfmpegMedia {
    fn open(&self, path: &Path) -> Result<(Box<dyn CaptureDevice>, MediaInfo), PlaybackError> {
        let input = path.to_string_lossy();
        let info = media::probe(&input)?;
        let device = StreamDevice::spawn(&input, &info, Delivery::Paced)?;
        Ok((Box::new(device), info))
    }
}

/// A recording being reviewed. Frames are released at the file's own rate
/// as `poll` is called; pausing simply stops pulling.
pub struct PlaybackSession<O: MediaOpener> {
    opener: O,
    path: PathBuf,
    info: MediaInfo,
    device: Option<Box<dyn CaptureDevice>>,
    frame_interval: Duration,
    frames_shown: u32,
    playing: bool,
    finished: bool,
    next_frame_at: Option<Instant>
}

impl<O: MediaOpener> PlaybackSession<O> {
    pub fn open(opener: O, path: impl Into<PathBuf>) -> Result<Self, PlaybackError> {
        let path = path.into();
        let (device, info) = opener.open(&path)?;
        let config = VideoConfig::reported(info.width, info.height, info.fps);
        info!("Opened {} ({})", path.display(), config);

        Ok(Self {
            opener,
            path,
            info,
            device: Some(device),
            frame_interval: config.frame_interval(),
            frames_shown: 0,
            playing: false,
            finished: false,
            next_frame_at: None
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn position(&self) -> Duration {
        self.frame_interval * self.frames_shown
    }

    pub fn time_label(&self) -> String {
        let total = self.info.duration.unwrap_or_else(|| self.position());
        format!("Time: {} / {}", format_elapsed(self.position()), format_elapsed(total))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        if self.playing { self.next_frame_at } else { None }
    }

    /// Play/pause. A finished session starts over from the beginning.
    pub fn toggle(&mut self, now: Instant) -> Result<(), PlaybackError> {
        if self.finished {
            let (device, info) = self.opener.open(&self.path)?;
            self.device = Some(device);
            self.info = info;
            self.frames_shown = 0;
            self.finished = false;
            self.playing = false;
        }

        self.playing = !self.playing;
        self.next_frame_at = self.playing.then_some(now);
        Ok(())
    }

    pub fn poll(&mut self, now: Instant) -> Option<Frame> {
        if !self.playing {
            return None;
        }

        let due = self.next_frame_at.unwrap_or(now);
        if now < due {
            return None;
        }

        let device = self.device.as_mut()?;
        match device.try_frame() {
            Ok(Some(frame)) => {
                self.frames_shown += 1;
                let next = due + self.frame_interval;
                // after a long stall, resume pacing from now instead of bursting
                self.next_frame_at = Some(if next < now { now + self.frame_interval } else { next });
                Some(frame)
            },
            Ok(None) => None,
            Err(CaptureError::EndOfStream) => {
                self.end();
                None
            },
            Err(e) => {
                warn!("Playback of {} stopped: {}", self.path.display(), e);
                self.end();
                None
            }
        }
    }

    fn end(&mut self) {
        self.playing = false;
        self.finished = true;
        self.next_frame_at = None;
        self.close();
    }

    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
        }
    }

    /// Closes the decoder and removes the file from disk.
    pub fn delete(mut self) -> Result<PathBuf, PlaybackError> {
        self.close();
        fs::remove_file(&self.path)?;
        info!("Deleted {}", self.path.display());
        Ok(self.path.clone())
    }
}

impl<O: MediaOpener> Drop for PlaybackSession<O> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMedia;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn starts_paused_and_releases_frames_at_file_rate() {
        let media = FakeMedia::new(10, 10.0, Some(Duration::from_secs(1)));
        let mut playback = PlaybackSession::open(media.clone(), "take.avi").unwrap();
        let t0 = Instant::now();
        assert!(playback.poll(t0).is_none());
        assert_eq!(playback.time_label(), "Time: 00:00:00 / 00:00:01");

        playback.toggle(t0).unwrap();
        assert!(playback.poll(t0).is_some());
        assert!(playback.poll(t0 + ms(50)).is_none());
        assert!(playback.poll(t0 + ms(100)).is_some());
        assert_eq!(playback.position(), ms(200));
        assert_eq!(playback.next_deadline(), Some(t0 + ms(200)));
    }

    #[test]
    fn bogus_file_rate_plays_at_fallback() {
        let media = FakeMedia::new(3, 1e-20, None);
        let mut playback = PlaybackSession::open(media, "take.avi").unwrap();
        let t0 = Instant::now();
        playback.toggle(t0).unwrap();
        assert!(playback.poll(t0).is_some());
        assert_eq!(playback.position(), Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn pause_holds_position() {
        let media = FakeMedia::new(10, 10.0, None);
        let mut playback = PlaybackSession::open(media, "take.avi").unwrap();
        let t0 = Instant::now();
        playback.toggle(t0).unwrap();
        playback.poll(t0).unwrap();

        playback.toggle(t0 + ms(10)).unwrap();
        assert!(!playback.is_playing());
        assert!(playback.poll(t0 + Duration::from_secs(1)).is_none());
        assert_eq!(playback.position(), ms(100));
        assert_eq!(playback.next_deadline(), None);
    }

    #[test]
    fn end_of_stream_finishes_and_replay_reopens() {
        let media = FakeMedia::new(2, 10.0, Some(ms(200)));
        let mut playback = PlaybackSession::open(media.clone(), "take.avi").unwrap();
        let t0 = Instant::now();
        playback.toggle(t0).unwrap();
        assert!(playback.poll(t0).is_some());
        assert!(playback.poll(t0 + ms(100)).is_some());
        assert!(playback.poll(t0 + ms(200)).is_none());
        assert!(playback.is_finished());
        assert!(!playback.is_playing());
        assert_eq!(media.backend().open_count(), 0);
        assert_eq!(playback.time_label(), "Time: 00:00:00 / 00:00:00");

        playback.toggle(t0 + ms(300)).unwrap();
        assert!(playback.is_playing());
        assert_eq!(media.backend().opened_total(), 2);
        assert!(playback.poll(t0 + ms(300)).is_some());
    }

    #[test]
    fn delete_releases_decoder_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Take20240101000000.avi");
        fs::write(&path, b"RIFF").unwrap();

        let media = FakeMedia::new(5, 30.0, None);
        let playback = PlaybackSession::open(media.clone(), &path).unwrap();
        assert_eq!(media.backend().open_count(), 1);

        let removed = playback.delete().unwrap();
        assert_eq!(removed, path);
        assert!(!path.exists());
        assert_eq!(media.backend().open_count(), 0);
    }

    #[test]
    fn deleting_a_missing_file_reports_io() {
        let dir = tempfile::tempdir().unwrap();
        let playback = PlaybackSession::open(FakeMedia::new(1, 30.0, None), dir.path().join("gone.avi")).unwrap();
        assert!(matches!(playback.delete(), Err(PlaybackError::Io(_))));
    }
}
