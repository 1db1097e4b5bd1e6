//! Normalization settings
use crate::error::{LoudnessError, Result};
use crate::meter::Precision;
use crate::source::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use crate::EBU_R128_BROADCAST_LUFS;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NormalizeSettings {
    #[serde(default = "default_target_lufs")]
    pub target_lufs: f64,

    #[serde(default = "default_max_peak_dbtp")]
    pub max_peak_dbtp: f64,

    #[serde(default = "default_block_size")]
    pub block_size: usize,

    #[serde(default)]
    pub precision: Precision,
}

fn default_target_lufs() -> f64 {
    EBU_R128_BROADCAST_LUFS
}

fn default_max_peak_dbtp() -> f64 {
    -1.0
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            target_lufs: default_target_lufs(),
            max_peak_dbtp: default_max_peak_dbtp(),
            block_size: default_block_size(),
            precision: Precision::default(),
        }
    }
}

impl NormalizeSettings {
    /// Load settings from a TOML, JSON or YAML file (format from the extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoudnessError::FileNotFound(path.to_path_buf()));
        }

        let settings: Self = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if !self.target_lufs.is_finite() {
            return Err(LoudnessError::Config(format!(
                "target_lufs must be finite, got {}",
                self.target_lufs
            )));
        }
        if !self.max_peak_dbtp.is_finite() {
            return Err(LoudnessError::Config(format!(
                "max_peak_dbtp must be finite, got {}",
                self.max_peak_dbtp
            )));
        }
        if !(1..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(LoudnessError::InvalidBlockSize(self.block_size));
        }
        if self.max_peak_dbtp > 0.0 {
            tracing::warn!(
                "Peak ceiling {:.1} dBTP is above full scale; integer outputs will clip",
                self.max_peak_dbtp
            );
        }
        Ok(())
    }
}
