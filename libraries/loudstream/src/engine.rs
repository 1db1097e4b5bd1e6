//! Loudness engine binding
//!
//! The BS.1770 filtering, gating and integration live in an external engine. This
//! module fixes the contract the meter relies on ([`LoudnessEngine`]) and provides
//! the default implementation backed by the `ebur128` crate.
//!
//! Engine handles are plain owned values: creating one is `init`, and dropping it is
//! `destroy`. Ownership guarantees the handle is released exactly once, including on
//! early returns through `?`.

use ebur128::{EbuR128, Mode};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Status code reported by the engine
///
/// Codes follow libebur128's numbering and are surfaced without reinterpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineStatus(i32);

impl EngineStatus {
    pub const NO_MEM: Self = Self(1);
    pub const INVALID_MODE: Self = Self(2);
    pub const INVALID_CHANNEL_INDEX: Self = Self(3);

    pub fn from_code(code: i32) -> Self {
        Self(code)
    }

    pub fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::NO_MEM => "out of memory",
            Self::INVALID_MODE => "invalid mode",
            Self::INVALID_CHANNEL_INDEX => "invalid channel index",
            _ => "unknown status",
        };
        write!(f, "{name} (code {})", self.0)
    }
}

impl From<ebur128::Error> for EngineStatus {
    fn from(err: ebur128::Error) -> Self {
        match err {
            ebur128::Error::NoMem => Self::NO_MEM,
            ebur128::Error::InvalidMode => Self::INVALID_MODE,
            ebur128::Error::InvalidChannelIndex => Self::INVALID_CHANNEL_INDEX,
        }
    }
}

/// Measurements an engine handle is initialised for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineMode {
    /// Gated integrated ("global") loudness
    pub integrated: bool,
    /// Oversampled inter-sample peak per channel
    pub true_peak: bool,
}

impl EngineMode {
    /// Integrated loudness plus true peak, the only mode the meter uses
    pub const MEASURE: Self = Self {
        integrated: true,
        true_peak: true,
    };
}

impl From<EngineMode> for Mode {
    fn from(mode: EngineMode) -> Self {
        let mut flags = Mode::empty();
        if mode.integrated {
            flags |= Mode::I;
        }
        if mode.true_peak {
            flags |= Mode::TRUE_PEAK;
        }
        flags
    }
}

/// Contract between the meter and a loudness-computation engine
///
/// Blocks are interleaved; `frame_count` is the number of multichannel frames in
/// the block, not the number of samples.
pub trait LoudnessEngine: Sized {
    /// Create a handle for the given stream layout
    fn init(channels: u32, sample_rate: u32, mode: EngineMode) -> Result<Self, EngineStatus>;

    /// Feed single-precision frames
    fn add_frames_f32(&mut self, block: &[f32], frame_count: usize) -> Result<(), EngineStatus>;

    /// Feed double-precision frames
    fn add_frames_f64(&mut self, block: &[f64], frame_count: usize) -> Result<(), EngineStatus>;

    /// Linear true peak of one channel
    fn true_peak(&self, channel: u32) -> Result<f64, EngineStatus>;

    /// Integrated loudness in LUFS over everything fed so far
    fn loudness_global(&self) -> Result<f64, EngineStatus>;
}

/// Process-wide description of the loaded engine
#[derive(Debug)]
pub struct EngineBinding {
    pub name: &'static str,
    pub channels: RangeInclusive<u32>,
    pub sample_rates: RangeInclusive<u32>,
}

impl EngineBinding {
    /// Whether the engine can be initialised for this layout
    pub fn supports(&self, channels: u32, sample_rate: u32) -> bool {
        self.channels.contains(&channels) && self.sample_rates.contains(&sample_rate)
    }
}

static BINDING: OnceLock<EngineBinding> = OnceLock::new();

/// The engine binding, initialised on first use
pub fn binding() -> &'static EngineBinding {
    BINDING.get_or_init(|| {
        let binding = EngineBinding {
            name: "ebur128",
            channels: 1..=8,
            sample_rates: 8000..=384_000,
        };
        debug!(
            "Loudness engine {} bound ({:?} channels, {:?} Hz)",
            binding.name, binding.channels, binding.sample_rates
        );
        binding
    })
}

/// Default engine backed by the `ebur128` crate
pub struct Ebur128Engine {
    state: EbuR128,
    channels: u32,
}

impl Ebur128Engine {
    fn check_layout(&self, samples: usize, frame_count: usize) -> Result<(), EngineStatus> {
        if samples == frame_count * self.channels as usize {
            Ok(())
        } else {
            Err(EngineStatus::INVALID_MODE)
        }
    }
}

impl LoudnessEngine for Ebur128Engine {
    fn init(channels: u32, sample_rate: u32, mode: EngineMode) -> Result<Self, EngineStatus> {
        if !binding().supports(channels, sample_rate) {
            return Err(EngineStatus::INVALID_MODE);
        }
        let state = EbuR128::new(channels, sample_rate, mode.into())?;
        trace!("Engine handle created ({channels} ch @ {sample_rate} Hz)");
        Ok(Self { state, channels })
    }

    fn add_frames_f32(&mut self, block: &[f32], frame_count: usize) -> Result<(), EngineStatus> {
        self.check_layout(block.len(), frame_count)?;
        self.state.add_frames_f32(block)?;
        Ok(())
    }

    fn add_frames_f64(&mut self, block: &[f64], frame_count: usize) -> Result<(), EngineStatus> {
        self.check_layout(block.len(), frame_count)?;
        self.state.add_frames_f64(block)?;
        Ok(())
    }

    fn true_peak(&self, channel: u32) -> Result<f64, EngineStatus> {
        Ok(self.state.true_peak(channel)?)
    }

    fn loudness_global(&self) -> Result<f64, EngineStatus> {
        Ok(self.state.loudness_global()?)
    }
}

impl Drop for Ebur128Engine {
    fn drop(&mut self) {
        trace!("Engine handle released");
    }
}
