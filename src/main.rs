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

mod messages;
mod media;
mod camera;
mod display;
mod recorder;
mod refresh;
mod playback;
mod settings;
mod app;
#[cfg(test)]
mod testing;

use anyhow::Context;
use eframe::NativeOptions;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const TITLE: &str = "Video Capture Tool for AI Model Training";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = settings::SettingsStore::new(settings::DEFAULT_PATH);
    settings.load_or_create().with_context(|| format!("loading {}", settings::DEFAULT_PATH))?;
    if let Err(e) = settings.ensure_output_dir() {
        warn!("Cannot create output directory {}: {}", settings.settings().output_dir, e);
    }
    info!("Settings loaded from {}", settings.path().display());

    let options = NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title(TITLE)
            .with_inner_size([1024.0, 768.0])
            .with_resizable(false),
        ..Default::default()
    };

    eframe::run_native(TITLE, options, Box::new(move |cc| {
        Ok(Box::new(app::FootageApp::new(cc, settings)))
    })).map_err(|e| anyhow::anyhow!("window failed: {}", e))
}
