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

//! Locating the ffmpeg tools and asking ffprobe what a stream or file holds.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::{process::{Command, Stdio}, time::Duration};
use thiserror::Error;

pub static FFMPEG: Lazy<String> = Lazy::new(|| std::env::var("FOOTAGE_FFMPEG").unwrap_or_else(|_| String::from("ffmpeg")));
pub static FFPROBE: Lazy<String> = Lazy::new(|| std::env::var("FOOTAGE_FFPROBE").unwrap_or_else(|_| String::from("ffprobe")));

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not run {tool}: {source}")]
    Spawn { tool: String, source: std::io::Error },
    #[error("ffprobe failed: {0}")]
    Failed(String),
    #[error("unreadable ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no video stream found")]
    NoVideoStream
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    /// Zero when the container does not carry a usable rate.
    pub fps: f64,
    pub duration: Option<Duration>
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>
}

pub fn probe(input: &str) -> Result<MediaInfo, ProbeError> {
    let output = Command::new(FFPROBE.as_str())
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,avg_frame_rate,r_frame_rate:format=duration",
            "-of", "json",
            input
        ])
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ProbeError::Spawn { tool: FFPROBE.clone(), source })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ProbeError::Failed(if stderr.is_empty() { output.status.to_string() } else { stderr }));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

pub fn parse_probe_output(json: &str) -> Result<MediaInfo, ProbeError> {
    let parsed: ProbeOutput = serde_json::from_str(json)?;
    let stream = parsed.streams.into_iter()
        .find(|s| s.width.unwrap_or(0) > 0 && s.height.unwrap_or(0) > 0)
        .ok_or(ProbeError::NoVideoStream)?;

    // avg_frame_rate is 0/0 for some live sources where r_frame_rate is still set
    let fps = [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .map(parse_rate)
        .find(|r| *r > 0.0)
        .unwrap_or(0.0);

    let duration = parsed.format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .and_then(|d| Duration::try_from_secs_f64(d).ok());

    Ok(MediaInfo {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        fps,
        duration
    })
}

/// Parses ffprobe's `num/den` rates. Anything unparseable is 0.
pub fn parse_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(n), Ok(d)) if d != 0.0 => n / d,
            _ => 0.0
        },
        None => rate.trim().parse().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_rates() {
        assert_eq!(parse_rate("30/1"), 30.0);
        assert!((parse_rate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), 0.0);
        assert_eq!(parse_rate("25"), 25.0);
        assert_eq!(parse_rate("garbage"), 0.0);
    }

    #[test]
    fn parses_file_probe() {
        let json = r#"{
            "programs": [],
            "streams": [{ "width": 1280, "height": 720, "r_frame_rate": "30/1", "avg_frame_rate": "30/1" }],
            "format": { "duration": "5.000000" }
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info, MediaInfo { width: 1280, height: 720, fps: 30.0, duration: Some(Duration::from_secs(5)) });
    }

    #[test]
    fn live_stream_without_duration_uses_r_frame_rate() {
        let json = r#"{
            "streams": [{ "width": 640, "height": 480, "r_frame_rate": "15/1", "avg_frame_rate": "0/0" }],
            "format": {}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.fps, 15.0);
        assert_eq!(info.duration, None);
    }

    #[test]
    fn unrepresentable_duration_is_unknown() {
        for duration in ["1e30", "-3.0", "NaN", "inf"] {
            let json = format!(r#"{{
                "streams": [{{ "width": 640, "height": 480, "r_frame_rate": "30/1" }}],
                "format": {{ "duration": "{duration}" }}
            }}"#);
            assert_eq!(parse_probe_output(&json).unwrap().duration, None, "{duration}");
        }
    }

    #[test]
    fn audio_only_is_rejected() {
        let json = r#"{ "streams": [], "format": { "duration": "3.0" } }"#;
        assert!(matches!(parse_probe_output(json), Err(ProbeError::NoVideoStream)));
    }
}
