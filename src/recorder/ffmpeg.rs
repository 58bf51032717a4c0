use super::{FrameSink, RecordError, SinkFactory, types::FourCc};
use crate::{camera::Frame, media::FFMPEG, messages::video::VideoConfig};
use crossbeam_channel::{Sender, bounded};
use std::{io::{self, Write}, path::Path, process::{Child, ChildStdin, Command, Stdio}, thread::{self, JoinHandle}};
use tracing::{debug, warn};

pub fn build_cmd(config: &VideoConfig, codec: FourCc, filename: &str) -> Vec<String> {
    let mut args: Vec<String> = [
        "-loglevel", "error",
        "-f", "rawvideo",
        "-pixel_format", "rgb24",
        "-video_size"
    ].iter().map(|s| s.to_string()).collect();
    args.push(format!("{}x{}", config.width, config.height));
    args.push(String::from("-framerate"));
    args.push(config.fps.to_string());
    args.push(String::from("-i"));
    args.push(String::from("-"));

    let enc_args = match codec {
        FourCc::XVID => vec!["-c:v", "mpeg4", "-vtag", "XVID", "-q:v", "4"],
        _ => vec!["-c:v", "mpeg4", "-vtag", codec.as_str()]
    };

    for arg in enc_args { args.push(arg.to_string()); }
    args.push(String::from("-y"));
    args.push(filename.to_string());
    args
}

/// Frames the UI may get ahead of the encoder before writes block.
const WRITE_QUEUE: usize = 8;

/// Feeds queued frames to `out` on its own thread until the sender is dropped.
fn spawn_writer<W: Write + Send + 'static>(mut out: W) -> io::Result<(Sender<Vec<u8>>, JoinHandle<io::Result<W>>)> {
    let (tx, rx) = bounded::<Vec<u8>>(WRITE_QUEUE);
    let handle = thread::Builder::new()
        .name(String::from("ffmpeg-writer"))
        .spawn(move || {
            for frame in rx {
                out.write_all(&frame)?;
            }
            out.flush()?;
            Ok(out)
        })?;
    Ok((tx, handle))
}

struct Writer<W = ChildStdin> {
    frames: Sender<Vec<u8>>,
    handle: JoinHandle<io::Result<W>>
}

impl<W> Writer<W> {
    /// Closes the queue and waits for everything already queued to reach ffmpeg.
    fn close(self) -> Result<(), RecordError> {
        drop(self.frames);
        match self.handle.join() {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(RecordError::Io(e)),
            Err(_) => Err(RecordError::SinkUnavailable(String::from("frame writer panicked")))
        }
    }
}

/// Pipes raw RGB frames into an ffmpeg encoder.
pub struct FfmpegSink {
    process: Child,
    writer: Option<Writer>,
    reaped: bool
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordError> {
        let writer = self.writer.as_ref().ok_or(RecordError::Stopped)?;
        if writer.frames.send(frame.as_raw().clone()).is_ok() {
            return Ok(());
        }

        // the writer only hangs up after a failed write
        match self.writer.take().map(Writer::close) {
            Some(Err(e)) => Err(e),
            _ => Err(RecordError::Io(io::Error::from(io::ErrorKind::BrokenPipe)))
        }
    }

    fn finish(mut self: Box<Self>) -> Result<(), RecordError> {
        // closing stdin is ffmpeg's signal to write the trailer
        let written = self.writer.take().map_or(Ok(()), Writer::close);
        let status = self.process.wait()?;
        self.reaped = true;
        written?;
        if status.success() {
            Ok(())
        } else {
            Err(RecordError::SinkUnavailable(format!("ffmpeg exited with {}", status)))
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.close() {
                warn!("Frame writer error: {}", e);
            }
        }
        if !self.reaped {
            if let Err(e) = self.process.wait() {
                warn!("Video process wait error: {}", e);
            }
        }
    }
}

#[derive(Default)]
pub struct FfmpegSinkFactory;

impl SinkFactory for FfmpegSinkFactory {
    fn create(&self, path: &Path, config: &VideoConfig, codec: FourCc) -> Result<Box<dyn FrameSink>, RecordError> {
        let args = build_cmd(config, codec, &path.to_string_lossy());
        debug!("Spawning {} {}", FFMPEG.as_str(), args.join(" "));
        let mut child = Command::new(FFMPEG.as_str())
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| RecordError::SinkUnavailable(format!("Failed to spawn {}: {}", FFMPEG.as_str(), e)))?;

        let stdin = match child.stdin.take() {
            Some(s) => s,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecordError::SinkUnavailable(String::from("ffmpeg stdin unavailable")));
            }
        };

        match spawn_writer(stdin) {
            Ok((frames, handle)) => Ok(Box::new(FfmpegSink { process: child, writer: Some(Writer { frames, handle }), reaped: false })),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(RecordError::SinkUnavailable(format!("Frame writer failed: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xvid_command_reads_rgb_from_stdin() {
        let config = VideoConfig::reported(1280, 720, 30.0);
        let args = build_cmd(&config, FourCc::XVID, "/tmp/out/SampleRun20240101000000.avi");
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pixel_format rgb24 -video_size 1280x720 -framerate 30 -i -"));
        assert!(joined.contains("-c:v mpeg4 -vtag XVID"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out/SampleRun20240101000000.avi"));
    }

    #[test]
    fn fractional_rates_pass_through() {
        let config = VideoConfig::reported(640, 480, 29.97);
        let args = build_cmd(&config, FourCc::XVID, "x.avi");
        let pos = args.iter().position(|a| a == "-framerate").unwrap();
        assert_eq!(args[pos + 1], "29.97");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_delivers_queued_frames_in_order() {
        let (frames, handle) = spawn_writer(Vec::new()).unwrap();
        for i in 0..(WRITE_QUEUE as u8 + 3) {
            frames.send(vec![i; 6]).unwrap();
        }
        drop(frames);

        let written = handle.join().unwrap().unwrap();
        let expected: Vec<u8> = (0..(WRITE_QUEUE as u8 + 3)).flat_map(|i| vec![i; 6]).collect();
        assert_eq!(written, expected);
    }

    #[test]
    fn writer_failure_hangs_up_and_reports() {
        let (frames, handle) = spawn_writer(BrokenPipe).unwrap();
        frames.send(vec![0; 6]).unwrap();
        let err = match (Writer { frames, handle }).close() {
            Err(RecordError::Io(e)) => e,
            other => panic!("expected an io error, got {:?}", other.err())
        };
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
