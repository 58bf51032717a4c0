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

use std::{fmt, time::Duration};

/// Frame geometry and rate shared by a capture device and the recording fed from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64
}

impl VideoConfig {
    pub const PREFERRED_WIDTH: u32 = 1280;
    pub const PREFERRED_HEIGHT: u32 = 720;
    pub const FALLBACK_FPS: f64 = 30.0;
    /// Anything slower than a frame a minute is a bogus report, not a camera.
    pub const MIN_FPS: f64 = 1.0 / 60.0;
    pub const MAX_FPS: f64 = 1000.0;

    /// Builds a config from what a device reports, substituting the fallback
    /// rate when the device has none or an implausible one.
    pub fn reported(width: u32, height: u32, fps: f64) -> Self {
        let fps = if (Self::MIN_FPS..=Self::MAX_FPS).contains(&fps) { fps } else { Self::FALLBACK_FPS };
        Self { width, height, fps }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.fps)
            .unwrap_or_else(|_| Duration::from_secs_f64(1.0 / Self::FALLBACK_FPS))
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl fmt::Display for VideoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}fps", self.width, self.height, self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_falls_back_to_thirty() {
        assert_eq!(VideoConfig::reported(640, 480, 0.0).fps, 30.0);
        assert_eq!(VideoConfig::reported(640, 480, -1.0).fps, 30.0);
        assert_eq!(VideoConfig::reported(640, 480, f64::NAN).fps, 30.0);
        assert_eq!(VideoConfig::reported(640, 480, 25.0).fps, 25.0);
    }

    #[test]
    fn implausible_rates_fall_back_to_thirty() {
        assert_eq!(VideoConfig::reported(640, 480, 1e-20).fps, 30.0);
        assert_eq!(VideoConfig::reported(640, 480, f64::INFINITY).fps, 30.0);
        assert_eq!(VideoConfig::reported(640, 480, 1e9).fps, 30.0);
        assert_eq!(VideoConfig::reported(640, 480, 0.5).fps, 0.5);
    }

    #[test]
    fn frame_interval_follows_rate() {
        assert_eq!(VideoConfig::reported(640, 480, 25.0).frame_interval(), Duration::from_millis(40));
        assert_eq!(VideoConfig::reported(640, 480, 1e-20).frame_interval(), Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn display_matches_recorder_log_format() {
        assert_eq!(VideoConfig::reported(1280, 720, 30.0).to_string(), "1280x720@30fps");
    }
}
