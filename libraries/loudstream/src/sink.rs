//! Output sinks for normalized audio

use crate::error::{LoudnessError, Result};
use crate::source::{FrameBlock, SampleFormat};
use hound::{WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for gain-adjusted blocks
pub trait AudioSink {
    /// Write one block, in channel and frame order
    fn write_block(&mut self, block: &FrameBlock) -> Result<()>;

    /// Flush and close the destination
    fn finish(&mut self) -> Result<()>;
}

/// WAV file sink
///
/// Integer formats are scaled by `2^(bits-1)`, rounded and saturated. 64-bit float
/// streams are written as 32-bit float, the widest float WAV the writer supports.
/// Dropping the sink without calling [`AudioSink::finish`] still finalises the header.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    spec: WavSpec,
    path: PathBuf,
    frames_written: u64,
}

impl WavSink {
    pub fn create(
        path: impl AsRef<Path>,
        channels: usize,
        sample_rate: u32,
        format: SampleFormat,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let channels = u16::try_from(channels)
            .map_err(|_| LoudnessError::Encode(format!("Too many channels: {channels}")))?;
        let spec = wav_spec(channels, sample_rate, format);
        let writer = WavWriter::create(&path, spec)?;
        debug!("Writing {:?} WAV to {:?}", format, path);

        Ok(Self {
            writer: Some(writer),
            spec,
            path,
            frames_written: 0,
        })
    }

    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

fn wav_spec(channels: u16, sample_rate: u32, format: SampleFormat) -> WavSpec {
    let (bits_per_sample, sample_format) = if format.is_float() {
        (32, hound::SampleFormat::Float)
    } else {
        (format.bits(), hound::SampleFormat::Int)
    };
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format,
    }
}

/// Smallest margin kept below a peak ceiling, in dB
pub const MIN_CEILING_HEADROOM_DB: f64 = 0.01;

/// Margin below `ceiling_dbtp` that absorbs rounding when writing `format`
///
/// Integer formats reserve two LSBs at the ceiling amplitude, float formats the
/// fixed minimum. The result is never below [`MIN_CEILING_HEADROOM_DB`].
pub fn requantization_headroom_db(format: SampleFormat, ceiling_dbtp: f64) -> f64 {
    if format.is_float() {
        return MIN_CEILING_HEADROOM_DB;
    }
    let lsb = 1.0 / f64::from(1_u32 << (format.bits() - 1));
    let ceiling = 10.0_f64.powf(ceiling_dbtp / 20.0);
    let headroom = 20.0 * (1.0 + 2.0 * lsb / ceiling).log10();
    if headroom.is_finite() {
        headroom.max(MIN_CEILING_HEADROOM_DB)
    } else {
        MIN_CEILING_HEADROOM_DB
    }
}

/// Scale a [-1.0, 1.0) sample to a signed integer of `bits` width
fn to_int(sample: f64, bits: u16) -> i32 {
    let scale = f64::from(1_u32 << (bits - 1));
    (sample * scale).round().clamp(-scale, scale - 1.0) as i32
}

impl AudioSink for WavSink {
    fn write_block(&mut self, block: &FrameBlock) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LoudnessError::Encode("Sink already finished".to_string()))?;

        match self.spec.sample_format {
            hound::SampleFormat::Float => {
                for &sample in block.samples() {
                    writer.write_sample(sample as f32)?;
                }
            }
            hound::SampleFormat::Int => {
                let bits = self.spec.bits_per_sample;
                for &sample in block.samples() {
                    writer.write_sample(to_int(sample, bits))?;
                }
            }
        }

        self.frames_written += block.frames() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            debug!("Finished {:?} ({} frames)", self.path, self.frames_written);
        }
        Ok(())
    }
}
