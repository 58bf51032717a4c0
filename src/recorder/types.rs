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

use chrono::{DateTime, TimeZone};
use std::{fmt, path::{Path, PathBuf}, time::Duration};

pub const EXTENSION: &str = "avi";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Four-character codec tag written into the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCc([u8; 4]);

impl FourCc {
    pub const XVID: FourCc = FourCc(*b"XVID");

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strips spaces and path separators so the name stays a single file name.
pub fn sanitize_name(name: &str) -> String {
    name.chars().filter(|c| !matches!(c, ' ' | '/' | '\\')).collect()
}

pub fn file_name<Tz: TimeZone>(sanitized: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display
{
    format!("{}{}.{}", sanitized, at.format(TIMESTAMP_FORMAT), EXTENSION)
}

/// First path in `dir` for this name and time that does not exist yet,
/// appending `_1`, `_2`, ... on collision.
pub fn unique_path<Tz: TimeZone>(dir: &Path, sanitized: &str, at: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: fmt::Display
{
    let path = dir.join(file_name(sanitized, at));
    if !path.exists() {
        return path;
    }

    let stem = format!("{}{}", sanitized, at.format(TIMESTAMP_FORMAT));
    (1u32..)
        .map(|n| dir.join(format!("{}_{}.{}", stem, n, EXTENSION)))
        .find(|p| !p.exists())
        .unwrap_or(path)
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (minutes, seconds) = (total / 60, total % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
