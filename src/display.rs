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

//! Letterboxing frames into the preview surface.

use crate::camera::Frame;
use image::{RgbImage, imageops};

/// Pixel size of a laid-out display surface. Surfaces of one pixel or less
/// have not been laid out yet and cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    width: u32,
    height: u32
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 1 && height > 1).then_some(Self { width, height })
    }
}

/// Size of `frame` once scaled to fit inside `viewport` without distortion.
pub fn fitted_size(frame_width: u32, frame_height: u32, viewport: Viewport) -> (u32, u32) {
    let scale_w = viewport.width as f64 / frame_width as f64;
    let scale_h = viewport.height as f64 / frame_height as f64;
    let scale = scale_w.min(scale_h);

    let new_w = ((frame_width as f64 * scale) as u32).clamp(1, viewport.width);
    let new_h = ((frame_height as f64 * scale) as u32).clamp(1, viewport.height);
    (new_w, new_h)
}

pub fn scale_to_viewport(frame: &Frame, viewport: Viewport) -> RgbImage {
    let mut canvas = RgbImage::new(viewport.width, viewport.height);
    if frame.width() == 0 || frame.height() == 0 {
        return canvas;
    }

    let (new_w, new_h) = fitted_size(frame.width(), frame.height(), viewport);
    let x_offset = (viewport.width - new_w) / 2;
    let y_offset = (viewport.height - new_h) / 2;

    if (new_w, new_h) == frame.dimensions() {
        imageops::replace(&mut canvas, frame, x_offset as i64, y_offset as i64);
    } else {
        // thumbnail box-averages when shrinking, which is what a preview wants
        let resized = imageops::thumbnail(frame, new_w, new_h);
        imageops::replace(&mut canvas, &resized, x_offset as i64, y_offset as i64);
    }
    canvas
}
