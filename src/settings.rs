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

//! Operator settings kept between runs in a small TOML file.

use serde::{Deserialize, Serialize};
use std::{fs, io::{self, Write}, path::{Path, PathBuf}};
use thiserror::Error;

pub const DEFAULT_PATH: &str = "config/settings.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera_source: String,
    pub output_dir: String
}

impl Default for Settings {
    fn default() -> Self {
        Self { camera_source: String::from("0"), output_dir: default_output_dir() }
    }
}

/// `videos` under the working directory.
pub fn default_output_dir() -> String {
    std::env::current_dir()
        .map(|cwd| cwd.join("videos"))
        .unwrap_or_else(|_| PathBuf::from("videos"))
        .to_string_lossy()
        .into_owned()
}

#[derive(Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(rename = "Settings", default)]
    settings: Settings
}

pub struct SettingsStore {
    path: PathBuf,
    settings: Settings
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), settings: Settings::default() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Reads the file, or writes one with defaults on first run.
    pub fn load_or_create(&mut self) -> Result<(), SettingsError> {
        if self.path.exists() {
            let content = fs::read_to_string(&self.path)?;
            let file: SettingsFile = toml::from_str(&content)?;
            self.settings = file.settings;
        } else {
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    pub fn ensure_output_dir(&self) -> io::Result<()> {
        if self.settings.output_dir.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.settings.output_dir)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(&SettingsFile { settings: self.settings.clone() })?;
        self.atomic_write(&content)?;
        Ok(())
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.path)
    }
}
