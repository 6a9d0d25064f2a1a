// Single-frame extraction through ffmpeg
//
// Two outputs: a gray frame decoded through a pipe, or an image file written
// by ffmpeg itself. Seeking past the end of the media is not an error for
// either; ffmpeg simply produces nothing.

use crate::errors::MediaError;
use crate::video::process::{run_blocking, ToolProcess};
use crate::video::{MediaProbe, MediaTools};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;

/// Coarse seek distance before the target for `SeekMode::Best`, in seconds.
pub const SUBSEEK_CUSHION_SECS: f64 = 20.0;

/// Where ffmpeg seeks relative to opening the input.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SeekMode {
    /// Seek before decoding. Fast, may land on a keyframe.
    #[default]
    Fast,
    /// Decode from the start. Frame exact, slow.
    Accurate,
    /// Fast seek to a cushion before the target, then decode the rest.
    Best,
}

impl SeekMode {
    /// Input and seek arguments for reading `input` at `time` seconds.
    pub fn input_args(&self, input: &Path, time: f64) -> Vec<OsString> {
        let ss = |t: f64| [OsString::from("-ss"), OsString::from(format!("{}", t))];
        let i = [OsString::from("-i"), OsString::from(input)];
        match self {
            SeekMode::Fast => ss(time).into_iter().chain(i).collect(),
            SeekMode::Accurate => i.into_iter().chain(ss(time)).collect(),
            SeekMode::Best => {
                let coarse = (time - SUBSEEK_CUSHION_SECS).max(0.0);
                let fine = time - coarse;
                ss(coarse).into_iter().chain(i).chain(ss(fine)).collect()
            }
        }
    }
}

/// A decoded 8-bit gray frame, indexed `[row, column]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub pixels: Array2<u8>,
}

impl Frame {
    pub fn from_raw(raw: Vec<u8>, width: u32, height: u32) -> Result<Self, MediaError> {
        let pixels = Array2::from_shape_vec((height as usize, width as usize), raw)
            .map_err(|e| MediaError::InvalidRequest(format!("frame shape: {}", e)))?;
        Ok(Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.pixels.nrows() as u32
    }

    pub fn mean(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.pixels.iter().map(|&p| p as f64).sum::<f64>() / self.pixels.len() as f64
    }

    pub fn save_png(&self, path: &Path) -> Result<(), MediaError> {
        let raw: Vec<u8> = self.pixels.iter().copied().collect();
        let image = image::GrayImage::from_raw(self.width(), self.height(), raw)
            .ok_or_else(|| MediaError::InvalidRequest("frame buffer size".to_string()))?;
        image.save(path)?;
        Ok(())
    }
}

fn check_time(time: f64) -> Result<(), MediaError> {
    if !time.is_finite() || time < 0.0 {
        return Err(MediaError::InvalidRequest(format!(
            "frame time must be a non-negative number, got {}",
            time
        )));
    }
    Ok(())
}

impl MediaTools {
    /// Decodes one gray frame at `time` seconds.
    ///
    /// Returns `Ok(None)` with a warning when ffmpeg runs out of frames
    /// (for instance past the end of the video). Corrupt input is
    /// `MediaError::InvalidData`. Blocks until ffmpeg delivers the frame or
    /// exits; there is no timeout.
    pub fn get_frame(
        &self,
        path: &Path,
        time: f64,
        seek: SeekMode,
    ) -> Result<Option<Frame>, MediaError> {
        check_time(time)?;
        let (width, height) = self.describe(path)?.frame_size(path)?;

        let mut args = vec![OsString::from("-hide_banner")];
        args.extend(seek.input_args(path, time));
        for arg in [
            "-vframes", "1", "-f", "image2pipe", "-pix_fmt", "gray", "-vcodec", "rawvideo", "-",
        ] {
            args.push(OsString::from(arg));
        }

        let mut process = ToolProcess::spawn(&self.ffmpeg, &args)?;
        let read = process.read_exact_or_short(width as usize * height as usize);
        let output = process.finish()?;

        if output.reports_invalid_data() {
            return Err(MediaError::InvalidData {
                tool: self.ffmpeg.name(),
                path: path.to_path_buf(),
            });
        }

        match read {
            Ok(raw) => Ok(Some(Frame::from_raw(raw, width, height)?)),
            Err(MediaError::OutOfFrames { expected, got }) => {
                tracing::warn!(
                    "Cannot get frame at {:.3}s from {}: expected {} bytes, got {}",
                    time,
                    path.display(),
                    expected,
                    got
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Has ffmpeg write the frame at `time` seconds to `output`, overwriting it.
    ///
    /// Past the end of the video ffmpeg writes nothing and reports success,
    /// so this is a silent no-op. A failing exit status is returned as
    /// `ToolFailed` with the tool's output. Blocks without a timeout.
    pub fn dump_frame(
        &self,
        path: &Path,
        time: f64,
        seek: SeekMode,
        output: &Path,
    ) -> Result<(), MediaError> {
        check_time(time)?;
        let mut args = vec![OsString::from("-hide_banner"), OsString::from("-y")];
        args.extend(seek.input_args(path, time));
        args.push(OsString::from("-vframes"));
        args.push(OsString::from("1"));
        args.push(OsString::from(output));

        let result = run_blocking(&self.ffmpeg, &args)?;
        if result.reports_invalid_data() {
            return Err(MediaError::InvalidData {
                tool: self.ffmpeg.name(),
                path: path.to_path_buf(),
            });
        }
        if !result.status.success() {
            return Err(MediaError::ToolFailed {
                tool: self.ffmpeg.name(),
                status: result.status,
                output: result.text(),
            });
        }
        tracing::trace!("{}", result.text());
        Ok(())
    }
}
