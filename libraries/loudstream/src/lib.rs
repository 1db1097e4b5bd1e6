//! Streaming loudness measurement and normalization
//!
//! This crate provides:
//! - EBU R128 / ITU-R BS.1770 integrated loudness and true peak measurement
//! - Two-pass normalization to a target loudness under a true-peak ceiling
//! - A restartable block source over paths, open files and open decoders
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ AudioSource │ ──► │    Meter     │ ──► │ NormalizationPlan│
//! └─────────────┘     └──────────────┘     └──────────────────┘
//!        │ rewind                                   │ gain
//!        ▼                                          ▼
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ AudioSource │ ──► │  Gain Apply  │ ──► │     WavSink      │
//! └─────────────┘     └──────────────┘     └──────────────────┘
//! ```
//!
//! Memory use is bounded by one block per pass regardless of input length.
//!
//! # Example
//!
//! ```ignore
//! use loudstream::{measure, normalize, Precision};
//!
//! let (lufs, peak) = measure("input.wav", Precision::Double)?;
//! println!("Integrated loudness: {lufs:.1} LUFS, true peak: {peak:.1} dBTP");
//!
//! let plan = normalize("input.wav", "output.wav", -18.0, -1.0)?;
//! println!("Applied {:+.2} dB", plan.gain_db);
//! ```

mod engine;
mod error;
mod meter;
mod normalizer;
mod settings;
mod sink;
mod source;

pub use engine::{binding, Ebur128Engine, EngineBinding, EngineMode, EngineStatus, LoudnessEngine};
pub use error::{FeedFailure, LoudnessError, Result};
pub use meter::{measure, Measurement, Meter, Precision};
pub use normalizer::{normalize, NormalizationPlan, Normalizer};
pub use settings::NormalizeSettings;
pub use sink::{AudioSink, WavSink};
pub use source::{
    AudioSource, Blocks, DecoderRef, FrameBlock, FrameReader, HandleRef, IntoSource, SampleFormat,
    SourceInput, SymphoniaReader, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE,
};

/// EBU R128 broadcast reference level (-23 LUFS)
pub const EBU_R128_BROADCAST_LUFS: f64 = -23.0;

/// ReplayGain 2.0 reference loudness level (-18 LUFS)
pub const REPLAYGAIN_REFERENCE_LUFS: f64 = -18.0;

/// EBU R128 streaming reference level (-14 LUFS, common for streaming platforms)
pub const EBU_R128_STREAMING_LUFS: f64 = -14.0;
