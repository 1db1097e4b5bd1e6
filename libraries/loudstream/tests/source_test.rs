//! Audio source integration tests
//!
//! Every kind of input must yield the same block shapes, and a borrowed handle or
//! decoder must stay usable after the source is gone.

mod common;

use loudstream::{AudioSource, FrameReader, LoudnessError, SampleFormat, SourceInput, SymphoniaReader};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};

fn first_block_shape(source: &mut AudioSource<'_>) -> (usize, usize) {
    source.read_frames().unwrap().next().unwrap().unwrap().shape()
}

fn collect(source: &mut AudioSource<'_>) -> Vec<f64> {
    let mut all = Vec::new();
    for block in source.read_frames().unwrap() {
        all.extend_from_slice(block.unwrap().samples());
    }
    all
}

// ========== Input kinds ==========

#[test]
fn test_first_block_from_path_str() {
    let (_dir, path) = common::reference_wav(-23.0, 1.0);
    let mut source = AudioSource::new(path.to_str().unwrap()).unwrap();
    assert_eq!(first_block_shape(&mut source), (1024, 2));
    assert_eq!(source.sample_rate(), 48000);
    assert_eq!(source.sample_format(), SampleFormat::F32);
    assert!(source.owns_handle());
}

#[test]
fn test_first_block_from_path_buf() {
    let (_dir, path) = common::reference_wav(-23.0, 1.0);
    let mut source = AudioSource::new(path).unwrap();
    assert_eq!(first_block_shape(&mut source), (1024, 2));
}

#[test]
fn test_first_block_from_borrowed_handle() {
    let (_dir, path) = common::reference_wav(-23.0, 1.0);
    let file = File::open(&path).unwrap();
    {
        let mut source = AudioSource::new(&file).unwrap();
        assert!(!source.owns_handle());
        assert_eq!(first_block_shape(&mut source), (1024, 2));
    }

    // Still open and readable after the source is dropped
    let mut handle = &file;
    handle.seek(SeekFrom::Start(0)).unwrap();
    let mut magic = [0_u8; 4];
    handle.read_exact(&mut magic).unwrap();
    assert_eq!(&magic, b"RIFF");
}

#[test]
fn test_first_block_from_owned_handle() {
    let (_dir, path) = common::reference_wav(-23.0, 1.0);
    let mut source = AudioSource::new(File::open(&path).unwrap()).unwrap();
    assert!(source.owns_handle());
    assert_eq!(first_block_shape(&mut source), (1024, 2));
}

#[test]
fn test_first_block_from_lent_decoder() {
    let (_dir, path) = common::reference_wav(-23.0, 1.0);
    let mut reader = hound::WavReader::open(&path).unwrap();
    {
        let mut source = AudioSource::new(&mut reader).unwrap();
        assert!(!source.owns_handle());
        assert_eq!(first_block_shape(&mut source), (1024, 2));
    }
    // The caller can keep using its decoder
    let mut out = Vec::new();
    assert!(reader.read_frames(&mut out, 16).unwrap() > 0);
}

#[test]
fn test_first_block_from_boxed_decoder() {
    let (_dir, path) = common::reference_wav(-23.0, 1.0);
    let reader: Box<dyn FrameReader> = Box::new(SymphoniaReader::open(&path).unwrap());
    let mut source = AudioSource::new(reader).unwrap();
    assert_eq!(first_block_shape(&mut source), (1024, 2));
}

#[test]
fn test_partly_consumed_decoder_starts_at_frame_zero() {
    let (_dir, path) = common::reference_wav(-23.0, 1.0);
    let mut fresh = AudioSource::new(&path).unwrap();
    let expected = collect(&mut fresh);

    let mut reader = SymphoniaReader::open(&path).unwrap();
    let mut skipped = Vec::new();
    reader.read_frames(&mut skipped, 3000).unwrap();

    let mut source = AudioSource::new(&mut reader).unwrap();
    assert_eq!(collect(&mut source), expected);
}

// ========== Rejected inputs ==========

#[test]
fn test_missing_path_is_file_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let result = AudioSource::new(dir.path().join("missing.wav"));
    assert!(matches!(result, Err(LoudnessError::FileNotFound(_))));
}

#[test]
fn test_write_only_handle_is_invalid_open_mode() {
    let (_dir, path) = common::reference_wav(-23.0, 0.5);
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    let result = AudioSource::new(&file);
    assert!(matches!(result, Err(LoudnessError::InvalidOpenMode(_))));
}

#[test]
fn test_classify_rejects_unsupported_values() {
    for result in [
        SourceInput::classify(7_u8).map(|_| ()),
        SourceInput::classify(1.5_f32).map(|_| ()),
        SourceInput::classify(vec![0.0_f64; 4]).map(|_| ()),
        SourceInput::classify("definitely/not/a/file.wav").map(|_| ()),
    ] {
        assert!(matches!(
            result,
            Err(LoudnessError::UnsupportedSourceType { .. })
        ));
    }
}

#[test]
fn test_classify_accepts_existing_path_string() {
    let (_dir, path) = common::reference_wav(-23.0, 0.5);
    let input = SourceInput::classify(path.to_string_lossy().into_owned()).unwrap();
    let mut source = AudioSource::new(input).unwrap();
    assert_eq!(first_block_shape(&mut source), (1024, 2));
}

// ========== Restartability ==========

#[test]
fn test_two_passes_are_identical() {
    let (_dir, path) = common::reference_wav(-23.0, 1.3);
    let mut source = AudioSource::new(&path).unwrap();
    let first = collect(&mut source);
    let second = collect(&mut source);
    assert_eq!(first.len(), (48000.0 * 1.3) as usize * 2);
    assert_eq!(first, second);
}

#[test]
fn test_integer_file_decodes_to_unit_range() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s24.wav");
    let samples = common::sine(44100, 1, 0.5, 4410);
    common::write_wav(&path, &samples, 1, 44100, 24, false);

    let mut source = AudioSource::new(&path).unwrap();
    assert_eq!(source.sample_format(), SampleFormat::S24);
    let decoded = collect(&mut source);
    assert_eq!(decoded.len(), samples.len());
    for (a, b) in decoded.iter().zip(&samples) {
        assert!((a - b).abs() < 1e-6);
    }
}
