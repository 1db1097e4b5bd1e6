//! Error types for loudness measurement and normalization

use crate::engine::EngineStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for loudness operations
pub type Result<T> = std::result::Result<T, LoudnessError>;

/// Why the engine refused a block of frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFailure {
    /// The engine returned a non-zero status code
    Status(EngineStatus),
    /// The block did not carry the frame layout the engine was initialised for
    FrameCountMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for FeedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(status) => write!(f, "{status}"),
            Self::FrameCountMismatch { expected, actual } => {
                write!(f, "expected {expected} samples, block holds {actual}")
            }
        }
    }
}

/// Errors that can occur while reading, measuring or normalizing audio
#[derive(Error, Debug)]
pub enum LoudnessError {
    /// The value handed to source construction is not a path, handle or decoder
    #[error("Unsupported audio source type: {type_name}")]
    UnsupportedSourceType { type_name: String },

    /// A supplied handle cannot be read as a binary stream
    #[error("Invalid open mode: {0}")]
    InvalidOpenMode(String),

    /// The engine rejected the channel count / sample rate combination
    #[error("Failed to initialise loudness engine for {channels} channels at {sample_rate} Hz: {status}")]
    EngineInit {
        channels: u32,
        sample_rate: u32,
        status: EngineStatus,
    },

    /// A frame-feed call failed
    #[error("Loudness engine rejected a block of {frames} frames: {failure}")]
    EngineFeed { frames: usize, failure: FeedFailure },

    /// A result query (loudness or true peak) failed
    #[error("Loudness engine query failed: {0}")]
    EngineQuery(EngineStatus),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The container holds no decodable audio track
    #[error("No audio track found")]
    NoAudioTrack,

    /// Decoding error
    #[error("Decode error: {0}")]
    Decode(String),

    /// Encoding error on the output sink
    #[error("Encode error: {0}")]
    Encode(String),

    /// Block size outside 1..=MAX_BLOCK_SIZE frames
    #[error("Invalid block size: {0} (must be between 1 and {max} frames)", max = crate::source::MAX_BLOCK_SIZE)]
    InvalidBlockSize(usize),

    /// Settings could not be loaded or are out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<symphonia::core::errors::Error> for LoudnessError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        match err {
            symphonia::core::errors::Error::IoError(e) => Self::Io(e),
            other => Self::Decode(other.to_string()),
        }
    }
}

impl From<hound::Error> for LoudnessError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => Self::Io(e),
            other => Self::Encode(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for LoudnessError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
