//! Two-pass loudness normalization
//!
//! Pass 1 measures the source, the gain is computed from the measurement, and pass 2
//! rewinds the source and writes every block multiplied by that gain. Only one block
//! is held in memory at a time.

use crate::engine::{Ebur128Engine, LoudnessEngine};
use crate::error::Result;
use crate::meter::{Measurement, Meter};
use crate::settings::NormalizeSettings;
use crate::sink::{requantization_headroom_db, AudioSink, WavSink};
use crate::source::{AudioSource, IntoSource};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Gain decision for one input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationPlan {
    /// Measured integrated loudness (LUFS)
    pub measured_lufs: f64,
    /// Measured true peak, maximum over channels (dBTP)
    pub measured_peak_dbtp: f64,
    /// Requested loudness (LUFS)
    pub target_lufs: f64,
    /// Peak ceiling (dBTP)
    pub max_peak_dbtp: f64,
    /// Margin kept below the ceiling for output rounding (dB)
    pub headroom_db: f64,
    /// Gain that will be applied, in dB
    pub gain_db: f64,
    /// Linear multiplier for every sample
    pub gain: f64,
    /// The ceiling reduced the gain below the loudness-matching value
    pub peak_limited: bool,
}

impl NormalizationPlan {
    /// Compute the gain for a measurement
    ///
    /// The loudness-matching gain is used unless it would push the true peak above
    /// `max_peak_dbtp`, in which case the gain is the largest one that keeps the
    /// peak at the ceiling. Non-finite measurements are not special-cased: an
    /// unmeasurable (gated-out) loudness yields an unbounded gain.
    pub fn compute(measurement: &Measurement, target_lufs: f64, max_peak_dbtp: f64) -> Self {
        Self::from_levels(
            measurement.integrated_lufs,
            measurement.true_peak_dbtp,
            target_lufs,
            max_peak_dbtp,
        )
    }

    pub fn from_levels(
        measured_lufs: f64,
        measured_peak_dbtp: f64,
        target_lufs: f64,
        max_peak_dbtp: f64,
    ) -> Self {
        Self::with_headroom(measured_lufs, measured_peak_dbtp, target_lufs, max_peak_dbtp, 0.0)
    }

    /// Like [`from_levels`](Self::from_levels), clamping to `headroom_db` below the ceiling
    ///
    /// A positive headroom keeps the written peak strictly under `max_peak_dbtp`
    /// once the output has been rounded to its sample format.
    pub fn with_headroom(
        measured_lufs: f64,
        measured_peak_dbtp: f64,
        target_lufs: f64,
        max_peak_dbtp: f64,
        headroom_db: f64,
    ) -> Self {
        let ceiling_dbtp = max_peak_dbtp - headroom_db;
        let naive_gain_db = target_lufs - measured_lufs;
        let peak_limited = measured_peak_dbtp + naive_gain_db > ceiling_dbtp;
        let gain_db = if peak_limited {
            ceiling_dbtp - measured_peak_dbtp
        } else {
            naive_gain_db
        };

        Self {
            measured_lufs,
            measured_peak_dbtp,
            target_lufs,
            max_peak_dbtp,
            headroom_db,
            gain_db,
            gain: 10.0_f64.powf(gain_db / 20.0),
            peak_limited,
        }
    }

    /// True peak after the gain is applied
    pub fn predicted_peak_dbtp(&self) -> f64 {
        self.measured_peak_dbtp + self.gain_db
    }

    /// Loudness after the gain is applied
    pub fn predicted_lufs(&self) -> f64 {
        self.measured_lufs + self.gain_db
    }

    /// The source already peaks at or above the ceiling, so the plan attenuates
    pub fn ceiling_unreachable(&self) -> bool {
        self.measured_peak_dbtp >= self.max_peak_dbtp
    }
}

impl fmt::Display for NormalizationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} LUFS / {:.2} dBTP -> {:+.2} dB{}",
            self.measured_lufs,
            self.measured_peak_dbtp,
            self.gain_db,
            if self.peak_limited {
                " (peak limited)"
            } else {
                ""
            }
        )
    }
}

/// Two-pass normalizer
///
/// # Example
///
/// ```ignore
/// use loudstream::Normalizer;
///
/// let normalizer = Normalizer::new(-16.0, -1.0);
/// let plan = normalizer.normalize("episode.flac", "episode.normalized.wav")?;
/// println!("{plan}");
/// ```
pub struct Normalizer<E: LoudnessEngine = Ebur128Engine> {
    meter: Meter<E>,
    target_lufs: f64,
    max_peak_dbtp: f64,
}

impl Normalizer<Ebur128Engine> {
    pub fn new(target_lufs: f64, max_peak_dbtp: f64) -> Self {
        Self::with_meter(Meter::new(), target_lufs, max_peak_dbtp)
    }

    pub fn from_settings(settings: &NormalizeSettings) -> Self {
        let meter = Meter::new()
            .with_precision(settings.precision)
            .with_block_size(settings.block_size);
        Self::with_meter(meter, settings.target_lufs, settings.max_peak_dbtp)
    }
}

impl<E: LoudnessEngine> Normalizer<E> {
    pub fn with_meter(meter: Meter<E>, target_lufs: f64, max_peak_dbtp: f64) -> Self {
        Self {
            meter,
            target_lufs,
            max_peak_dbtp,
        }
    }

    pub fn target_lufs(&self) -> f64 {
        self.target_lufs
    }

    pub fn max_peak_dbtp(&self) -> f64 {
        self.max_peak_dbtp
    }

    /// Pass 1 only: measure `source` and decide the gain
    ///
    /// The ceiling keeps rounding headroom for the source's sample format, which
    /// is also the format the output is written in.
    pub fn plan(&self, source: &mut AudioSource<'_>) -> Result<NormalizationPlan> {
        let measurement = self.meter.measure_source(source)?;
        let headroom_db = requantization_headroom_db(source.sample_format(), self.max_peak_dbtp);
        let plan = NormalizationPlan::with_headroom(
            measurement.integrated_lufs,
            measurement.true_peak_dbtp,
            self.target_lufs,
            self.max_peak_dbtp,
            headroom_db,
        );

        if !measurement.integrated_lufs.is_finite() {
            warn!(
                "Loudness is below the gating floor ({}); applying {:+} dB as computed",
                measurement.integrated_lufs, plan.gain_db
            );
        } else if plan.ceiling_unreachable() {
            warn!(
                "Source peaks at {:.2} dBTP, at or above the {:.2} dBTP ceiling; attenuating by {:.2} dB",
                plan.measured_peak_dbtp, plan.max_peak_dbtp, -plan.gain_db
            );
        }
        debug!("Normalization plan: {plan}");
        Ok(plan)
    }

    /// Measure `source`, rewind it, and write the gain-adjusted stream to `sink`
    ///
    /// The sink is finished on success; on failure it is left to its `Drop`.
    pub fn normalize_source<S: AudioSink>(
        &self,
        source: &mut AudioSource<'_>,
        sink: &mut S,
    ) -> Result<NormalizationPlan> {
        let plan = self.plan(source)?;

        source.rewind()?;
        for block in source.read_frames()? {
            let mut block = block?;
            block.apply_gain(plan.gain);
            sink.write_block(&block)?;
        }
        sink.finish()?;

        Ok(plan)
    }

    /// Normalize any supported input into a WAV file at `output_path`
    ///
    /// The output keeps the input's channel count, sample rate and sample format.
    pub fn normalize<'a>(
        &self,
        input: impl IntoSource<'a>,
        output_path: impl AsRef<Path>,
    ) -> Result<NormalizationPlan> {
        let mut source = AudioSource::with_block_size(input, self.meter.block_size())?;
        let mut sink = WavSink::create(
            output_path,
            source.channels(),
            source.sample_rate(),
            source.sample_format(),
        )?;
        self.normalize_source(&mut source, &mut sink)
    }
}

/// Normalize `input` to `target_lufs` without exceeding `max_peak_dbtp`, writing a WAV
pub fn normalize<'a>(
    input: impl IntoSource<'a>,
    output_path: impl AsRef<Path>,
    target_lufs: f64,
    max_peak_dbtp: f64,
) -> Result<NormalizationPlan> {
    Normalizer::new(target_lufs, max_peak_dbtp).normalize(input, output_path)
}
