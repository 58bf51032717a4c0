use image::RgbImage;

/// Sent from a device's producer thread to whoever owns the capture handle.
#[derive(Debug)]
pub enum CameraMessage {
    Frame(RgbImage),
    Error(String),
    EndOfStream
}
