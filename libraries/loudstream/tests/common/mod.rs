//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Amplitude of a stereo 1 kHz sine that measures `lufs`
///
/// A full-scale 1 kHz sine on two channels reads 0 LUFS.
pub fn amplitude_for_lufs(lufs: f64) -> f64 {
    10.0_f64.powf(lufs / 20.0)
}

/// Interleaved 1 kHz sine, identical on every channel
pub fn sine(sample_rate: u32, channels: u16, amplitude: f64, frames: usize) -> Vec<f64> {
    tone(sample_rate, channels, 1000.0, 0.0, amplitude, frames)
}

/// Interleaved sine of any frequency and starting phase, identical on every channel
pub fn tone(
    sample_rate: u32,
    channels: u16,
    frequency: f64,
    phase: f64,
    amplitude: f64,
    frames: usize,
) -> Vec<f64> {
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f64 / f64::from(sample_rate);
        let s = amplitude * (2.0 * std::f64::consts::PI * frequency * t + phase).sin();
        for _ in 0..channels {
            samples.push(s);
        }
    }
    samples
}

/// Write `samples` to `path` as a WAV with the given integer width or 32-bit float
pub fn write_wav(path: &Path, samples: &[f64], channels: u16, sample_rate: u32, bits: u16, float: bool) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bits,
        sample_format: if float {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        if float {
            writer.write_sample(s as f32).unwrap();
        } else {
            let scale = f64::from(1_u32 << (bits - 1));
            let v = (s * scale).round().clamp(-scale, scale - 1.0) as i32;
            writer.write_sample(v).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// A temporary stereo 48 kHz float WAV containing a 1 kHz sine at `lufs`
pub fn reference_wav(lufs: f64, seconds: f64) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reference.wav");
    let frames = (48000.0 * seconds) as usize;
    let samples = sine(48000, 2, amplitude_for_lufs(lufs), frames);
    write_wav(&path, &samples, 2, 48000, 32, true);
    (dir, path)
}

/// Largest absolute sample value in dBFS
pub fn sample_peak_db(samples: &[f64]) -> f64 {
    let peak = samples.iter().fold(0.0_f64, |acc, s| acc.max(s.abs()));
    20.0 * peak.log10()
}
