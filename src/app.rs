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
    camera::{CaptureSource, Frame, SystemBackend},
    display::{Viewport, scale_to_viewport},
    playback::{FfmpegMedia, PlaybackSession},
    recorder::{FfmpegSinkFactory, RecordError, types::format_elapsed},
    refresh::{LoopState, RefreshLoop},
    settings::SettingsStore
};
use eframe::{App, Frame as EguiFrame, egui};
use egui_extras::{Size, StripBuilder};
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
enum ConnectionStatus {
    Disconnected,
    Connected,
    Error,
    Streaming
}

impl ConnectionStatus {
    fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Status: Disconnected",
            ConnectionStatus::Connected => "Status: Connected",
            ConnectionStatus::Error => "Status: Error",
            ConnectionStatus::Streaming => "Status: Streaming"
        }
    }

    fn color(&self) -> egui::Color32 {
        match self {
            ConnectionStatus::Disconnected => egui::Color32::GRAY,
            ConnectionStatus::Connected => egui::Color32::GREEN,
            ConnectionStatus::Error => egui::Color32::RED,
            ConnectionStatus::Streaming => egui::Color32::LIGHT_BLUE
        }
    }
}

fn show_error(title: &str, description: &str) {
    error!("{}: {}", title, description);
    MessageDialog::new()
        .set_level(MessageLevel::Error)
        .set_title(title)
        .set_description(description)
        .set_buttons(MessageButtons::Ok)
        .show();
}

fn show_info(title: &str, description: &str) {
    MessageDialog::new()
        .set_level(MessageLevel::Info)
        .set_title(title)
        .set_description(description)
        .set_buttons(MessageButtons::Ok)
        .show();
}

pub struct FootageApp {
    settings: SettingsStore,
    refresh: RefreshLoop<SystemBackend, FfmpegSinkFactory>,
    playback: Option<PlaybackSession<FfmpegMedia>>,
    camera_source: String,
    output_dir: String,
    video_name: String,
    connection: ConnectionStatus,
    duration_label: String,
    texture: Option<egui::TextureHandle>,
    viewport: Option<Viewport>,
    shut_down: bool
}

impl FootageApp {
    pub fn new(_cc: &eframe::CreationContext, settings: SettingsStore) -> Self {
        let camera_source = settings.settings().camera_source.clone();
        let output_dir = settings.settings().output_dir.clone();
        Self {
            settings,
            refresh: RefreshLoop::new(SystemBackend, FfmpegSinkFactory),
            playback: None,
            camera_source,
            output_dir,
            video_name: String::new(),
            connection: ConnectionStatus::Disconnected,
            duration_label: format_elapsed(Duration::ZERO),
            texture: None,
            viewport: None,
            shut_down: false
        }
    }

    fn parse_source(&self) -> Option<CaptureSource> {
        match self.camera_source.parse::<CaptureSource>() {
            Ok(source) => Some(source),
            Err(e) => {
                show_error("Camera Error", &e.to_string());
                None
            }
        }
    }

    fn test_connection(&mut self) {
        let Some(source) = self.parse_source() else { return };
        match self.refresh.test_connection(&source) {
            Ok(()) => {
                if self.refresh.state() == LoopState::Stopped {
                    self.connection = ConnectionStatus::Connected;
                }
                show_info("Connection Status", "Successfully connected to the camera.");
            },
            Err(e) => {
                self.connection = ConnectionStatus::Error;
                show_error("Connection Error", &format!("Failed to connect to camera.\n\nDetails: {}", e));
            }
        }
    }

    fn toggle_camera(&mut self) {
        if self.refresh.state() != LoopState::Stopped {
            self.stop_camera();
            return;
        }

        let Some(source) = self.parse_source() else { return };
        if let Some(mut playback) = self.playback.take() {
            playback.close();
        }
        match self.refresh.start_camera(&source, Instant::now()) {
            Ok(config) => {
                info!("Live view started at {}", config);
                self.connection = ConnectionStatus::Streaming;
            },
            Err(e) => show_error("Camera Error", &format!("Failed to start camera feed.\n\nDetails: {}", e))
        }
    }

    fn stop_camera(&mut self) {
        let saved = self.refresh.stop_camera(Instant::now());
        self.connection = ConnectionStatus::Disconnected;
        self.texture = None;
        self.duration_label = self.refresh.duration_text().to_string();
        self.report_saved(saved);
    }

    fn toggle_recording(&mut self) {
        match self.refresh.state() {
            LoopState::Stopped => show_error("Recording Error", &RecordError::NotCapturing.to_string()),
            LoopState::PreviewingAndRecording => {
                let saved = self.refresh.stop_recording(Instant::now());
                self.duration_label = self.refresh.duration_text().to_string();
                self.report_saved(saved);
            },
            LoopState::Previewing => {
                match self.refresh.start_recording(&self.output_dir, &self.video_name, Instant::now()) {
                    Ok(path) => info!("Recording started: {}", path.display()),
                    Err(e) => show_error("Recording Error", &e.to_string())
                }
                self.duration_label = self.refresh.duration_text().to_string();
            }
        }
    }

    fn report_saved(&self, saved: Option<Result<Duration, RecordError>>) {
        match saved {
            Some(Ok(elapsed)) => show_info("Recording Finished", &format!("Video saved successfully! ({})", format_elapsed(elapsed))),
            Some(Err(e)) => show_error("Recording Error", &e.to_string()),
            None => {}
        }
    }

    fn browse_output_directory(&mut self) {
        let mut dialog = FileDialog::new();
        if !self.output_dir.is_empty() {
            dialog = dialog.set_directory(&self.output_dir);
        }
        if let Some(dir) = dialog.pick_folder() {
            self.output_dir = dir.to_string_lossy().to_string();
        }
    }

    fn open_video(&mut self) {
        if self.refresh.state() != LoopState::Stopped {
            show_error("Review Error", "Please stop the camera before reviewing a video.");
            return;
        }

        let mut dialog = FileDialog::new().add_filter("video", &["avi"]);
        if !self.output_dir.is_empty() {
            dialog = dialog.set_directory(&self.output_dir);
        }
        let Some(path) = dialog.pick_file() else { return };

        self.playback = None;
        self.texture = None;
        match PlaybackSession::open(FfmpegMedia, path) {
            Ok(playback) => self.playback = Some(playback),
            Err(e) => show_error("Review Error", &e.to_string())
        }
    }

    fn toggle_playback(&mut self) {
        let Some(playback) = self.playback.as_mut() else {
            show_error("Review Error", "Please open a video first.");
            return;
        };

        if let Err(e) = playback.toggle(Instant::now()) {
            show_error("Review Error", &e.to_string());
        }
    }

    fn delete_video(&mut self) {
        let Some(playback) = self.playback.take() else {
            show_error("Review Error", "Please open a video first.");
            return;
        };

        let confirmed = MessageDialog::new()
            .set_level(MessageLevel::Warning)
            .set_title("Delete Video")
            .set_description(format!("Delete {}?", playback.path().display()))
            .set_buttons(MessageButtons::YesNo)
            .show();
        if confirmed != rfd::MessageDialogResult::Yes {
            self.playback = Some(playback);
            return;
        }

        self.texture = None;
        match playback.delete() {
            Ok(path) => show_info("Video Deleted", &format!("{} was deleted.", path.display())),
            Err(e) => show_error("Review Error", &e.to_string())
        }
    }

    /// Stops capture (recording first) and persists the entry fields.
    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Some(Err(e)) = self.refresh.stop_camera(Instant::now()) {
            warn!("Recording did not close cleanly on exit: {}", e);
        }
        if let Some(mut playback) = self.playback.take() {
            playback.close();
        }

        let settings = self.settings.settings_mut();
        settings.camera_source = self.camera_source.clone();
        settings.output_dir = self.output_dir.clone();
        match self.settings.save() {
            Ok(()) => info!("Settings saved to {}", self.settings.path().display()),
            Err(e) => error!("Saving settings: {}", e)
        }
    }

    fn show_frame(&mut self, ctx: &egui::Context, frame: &Frame) {
        let size = [frame.width() as usize, frame.height() as usize];
        let img = egui::ColorImage::from_rgb(size, frame.as_raw());
        match &mut self.texture {
            Some(texture) => texture.set(img, egui::TextureOptions::LINEAR),
            None => self.texture = Some(ctx.load_texture("viewport", img, egui::TextureOptions::LINEAR))
        }
    }

    fn show_setup(&mut self, ui: &mut egui::Ui) {
        ui.heading("1. Camera and Directory Setup");
        ui.group(|ui| {
            egui::Grid::new("setup_grid").num_columns(2).show(ui, |ui| {
                ui.label("Camera Source:");
                ui.text_edit_singleline(&mut self.camera_source);
                ui.end_row();

                if ui.button("Test Connection").clicked() {
                    self.test_connection();
                }
                ui.colored_label(self.connection.color(), self.connection.label());
                ui.end_row();

                ui.label("Output Directory:");
                ui.end_row();
            });

            ui.horizontal(|ui| {
                ui.text_edit_singleline(&mut self.output_dir);
                if ui.button("Browse...").clicked() {
                    self.browse_output_directory();
                }
            });

            ui.horizontal(|ui| {
                ui.label("Video Name:");
                ui.text_edit_singleline(&mut self.video_name);
            });
        });
    }

    fn show_review(&mut self, ui: &mut egui::Ui) {
        ui.heading("3. Review Video");
        ui.group(|ui| {
            if ui.button("Open Video").clicked() {
                self.open_video();
            }

            ui.horizontal(|ui| {
                if ui.button("Play/Pause").clicked() {
                    self.toggle_playback();
                }
                if ui.button("Delete Video").clicked() {
                    self.delete_video();
                }
            });

            match &self.playback {
                Some(playback) => {
                    ui.label(playback.path().file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());
                    ui.label(playback.time_label());
                },
                None => { ui.label("Time: 00:00:00 / 00:00:00"); }
            }
        });
    }

    fn show_live(&mut self, ui: &mut egui::Ui) {
        ui.heading("2. Live View and Recording");
        StripBuilder::new(ui)
            .size(Size::remainder())
            .size(Size::exact(36.0))
            .vertical(|mut strip| {
                strip.cell(|ui| {
                    let rect = ui.available_rect_before_wrap();
                    let ppp = ui.ctx().pixels_per_point();
                    self.viewport = Viewport::new((rect.width() * ppp) as u32, (rect.height() * ppp) as u32);

                    ui.painter().rect_filled(rect, 0.0, egui::Color32::BLACK);
                    match &self.texture {
                        Some(texture) => {
                            ui.put(rect, egui::Image::new(texture).fit_to_exact_size(rect.size()));
                        },
                        None => {
                            ui.put(rect, egui::Label::new(egui::RichText::new("Live Video Feed").color(egui::Color32::WHITE)));
                        }
                    }
                });

                strip.cell(|ui| {
                    ui.horizontal(|ui| {
                        let camera_text = if self.refresh.state() == LoopState::Stopped { "Start Camera" } else { "Stop Camera" };
                        if ui.button(camera_text).clicked() {
                            self.toggle_camera();
                        }

                        let recording = self.refresh.state() == LoopState::PreviewingAndRecording;
                        if ui.button(if recording { "Stop Recording" } else { "Start Recording" }).clicked() {
                            self.toggle_recording();
                        }

                        if recording {
                            ui.colored_label(egui::Color32::RED, "REC");
                        }
                        ui.label(format!("Duration: {}", self.duration_label));

                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if let Some(path) = self.refresh.recording_path() {
                                ui.small(path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());
                            } else if let Some(config) = self.refresh.capture_config() {
                                ui.small(config.to_string());
                            }
                        });
                    });
                });
            });
    }
}

impl App for FootageApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut EguiFrame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            self.shutdown();
        }

        let now = Instant::now();
        let report = self.refresh.poll(now, self.viewport);
        if let Some(display) = &report.display {
            self.show_frame(ctx, display);
        }
        if let Some(duration) = report.duration {
            self.duration_label = duration;
        }
        if let Some(e) = &report.record_error {
            self.duration_label = self.refresh.duration_text().to_string();
            show_error("Recording Error", &e.to_string());
        }
        if let Some(e) = &report.capture_error {
            self.connection = ConnectionStatus::Error;
            self.texture = None;
            show_error("Camera Error", &format!("The camera feed stopped.\n\nDetails: {}", e));
        }

        if self.refresh.state() == LoopState::Stopped {
            let played = self.playback.as_mut().and_then(|p| p.poll(now));
            if let (Some(frame), Some(viewport)) = (played, self.viewport) {
                let scaled = scale_to_viewport(&frame, viewport);
                self.show_frame(ctx, &scaled);
            }
        }

        egui::SidePanel::left("controls").resizable(false).exact_width(320.0).show(ctx, |ui| {
            self.show_setup(ui);
            ui.add_space(10.0);
            self.show_review(ui);
            ui.with_layout(egui::Layout::bottom_up(egui::Align::Min), |ui| {
                ui.small(format!("Version: {}", env!("CARGO_PKG_VERSION")));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| self.show_live(ui));

        let playback_deadline = self.playback.as_ref().and_then(PlaybackSession::next_deadline);
        let deadline = [self.refresh.next_deadline(), playback_deadline].into_iter().flatten().min();
        if let Some(deadline) = deadline {
            ctx.request_repaint_after(deadline.saturating_duration_since(Instant::now()));
        }
    }
}

impl Drop for FootageApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}
