//! EBU R128 loudness metering
//!
//! Runs one complete pass over an [`AudioSource`] through a [`LoudnessEngine`] and
//! reports the gated integrated loudness (LUFS) and the maximum true peak (dBTP).

use crate::engine::{Ebur128Engine, EngineMode, LoudnessEngine};
use crate::error::{FeedFailure, LoudnessError, Result};
use crate::source::{AudioSource, FrameBlock, IntoSource, DEFAULT_BLOCK_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Sample precision used when feeding the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// `f32` frames
    Single,
    /// `f64` frames
    #[default]
    Double,
}

/// Result of one measurement pass
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Gated integrated loudness in LUFS, reported as the engine returns it
    /// (`-inf` when everything falls below the absolute gate)
    pub integrated_lufs: f64,

    /// Maximum true peak across channels in dBTP
    pub true_peak_dbtp: f64,

    /// True peak of each channel in dBTP
    pub channel_peaks_dbtp: Vec<f64>,

    /// Frames fed to the engine
    pub frames: u64,

    pub sample_rate: u32,

    pub channels: usize,
}

impl Measurement {
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / f64::from(self.sample_rate)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loudness: {:.1} LUFS, True Peak: {:.1} dBTP ({:.1} s, {} ch @ {} Hz)",
            self.integrated_lufs,
            self.true_peak_dbtp,
            self.duration_seconds(),
            self.channels,
            self.sample_rate
        )
    }
}

/// Convert a linear amplitude to decibels
pub(crate) fn linear_to_db(linear: f64) -> f64 {
    if linear > 0.0 {
        20.0 * linear.log10()
    } else {
        f64::NEG_INFINITY
    }
}

/// Loudness meter
///
/// A meter is only configuration; every measurement creates its own engine
/// handle, so meters can be reused freely.
///
/// # Example
///
/// ```ignore
/// use loudstream::{Meter, Precision};
///
/// let meter = Meter::new().with_precision(Precision::Single);
/// let result = meter.measure("speech.wav")?;
/// println!("{result}");
/// ```
pub struct Meter<E: LoudnessEngine = Ebur128Engine> {
    precision: Precision,
    block_size: usize,
    _engine: PhantomData<fn() -> E>,
}

impl Meter<Ebur128Engine> {
    pub fn new() -> Self {
        Self::with_engine()
    }
}

impl Default for Meter<Ebur128Engine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: LoudnessEngine> Clone for Meter<E> {
    fn clone(&self) -> Self {
        Self {
            precision: self.precision,
            block_size: self.block_size,
            _engine: PhantomData,
        }
    }
}

impl<E: LoudnessEngine> fmt::Debug for Meter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("precision", &self.precision)
            .field("block_size", &self.block_size)
            .finish()
    }
}

impl<E: LoudnessEngine> Meter<E> {
    /// Meter driving a specific engine implementation
    pub fn with_engine() -> Self {
        Self {
            precision: Precision::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            _engine: PhantomData,
        }
    }

    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Block size used for sources the meter builds itself
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Measure any supported input
    pub fn measure<'a>(&self, input: impl IntoSource<'a>) -> Result<Measurement> {
        let mut source = AudioSource::with_block_size(input, self.block_size)?;
        self.measure_source(&mut source)
    }

    /// Measure one complete pass over `source`, starting from frame 0
    pub fn measure_source(&self, source: &mut AudioSource<'_>) -> Result<Measurement> {
        let channels = source.channels();
        let sample_rate = source.sample_rate();
        let engine_channels = u32::try_from(channels).unwrap_or(u32::MAX);

        // Dropped (destroyed) on every return path below.
        let mut engine = E::init(engine_channels, sample_rate, EngineMode::MEASURE).map_err(
            |status| LoudnessError::EngineInit {
                channels: engine_channels,
                sample_rate,
                status,
            },
        )?;

        let mut frames = 0_u64;
        let mut scratch = Vec::new();
        for block in source.read_frames()? {
            let block = block?;
            self.feed(&mut engine, &block, channels, &mut scratch)?;
            frames += block.frames() as u64;
            trace!("Fed {} frames ({} total)", block.frames(), frames);
        }

        let integrated_lufs = engine
            .loudness_global()
            .map_err(LoudnessError::EngineQuery)?;

        let channel_peaks_dbtp = (0..engine_channels)
            .map(|ch| engine.true_peak(ch).map(linear_to_db))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LoudnessError::EngineQuery)?;
        let true_peak_dbtp = channel_peaks_dbtp
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);

        let measurement = Measurement {
            integrated_lufs,
            true_peak_dbtp,
            channel_peaks_dbtp,
            frames,
            sample_rate,
            channels,
        };
        debug!("Measured {measurement}");
        Ok(measurement)
    }

    fn feed(
        &self,
        engine: &mut E,
        block: &FrameBlock,
        channels: usize,
        scratch: &mut Vec<f32>,
    ) -> Result<()> {
        let frame_count = block.frames();
        let expected = frame_count * channels;
        if block.channels() != channels || block.samples().len() != expected {
            return Err(LoudnessError::EngineFeed {
                frames: frame_count,
                failure: FeedFailure::FrameCountMismatch {
                    expected,
                    actual: block.samples().len(),
                },
            });
        }

        let status = match self.precision {
            Precision::Double => engine.add_frames_f64(block.samples(), frame_count),
            Precision::Single => {
                block.copy_to_f32(scratch);
                engine.add_frames_f32(scratch, frame_count)
            }
        };

        status.map_err(|status| LoudnessError::EngineFeed {
            frames: frame_count,
            failure: FeedFailure::Status(status),
        })
    }
}

/// Measure an input with the default engine, returning `(LUFS, dBTP)`
pub fn measure<'a>(
    input: impl IntoSource<'a>,
    precision: Precision,
) -> Result<(f64, f64)> {
    let result = Meter::new().with_precision(precision).measure(input)?;
    Ok((result.integrated_lufs, result.true_peak_dbtp))
}
