//! Audio sources
//!
//! An [`AudioSource`] turns a path, an open file handle, or an already-open decoder
//! into a restartable stream of fixed-size [`FrameBlock`]s. Every pass over the
//! source starts at frame 0 and yields the same sample values, which is what lets
//! the normalizer measure first and write second.
//!
//! ```text
//! SourceInput ──► AudioSource ──► Blocks ──► FrameBlock (≤ block_size frames)
//!   Path            │
//!   Handle          └── FrameReader (SymphoniaReader | hound::WavReader | custom)
//!   Decoder
//! ```

use crate::error::{LoudnessError, Result};
use std::any::{type_name, Any};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace, warn};

/// Frames per block when none is requested
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Largest accepted block size in frames
pub const MAX_BLOCK_SIZE: usize = 1 << 20;

/// Sample encoding of the underlying stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    S16,
    S24,
    S32,
    F32,
    F64,
}

impl SampleFormat {
    /// Bits per sample as stored in the container
    pub fn bits(self) -> u16 {
        match self {
            Self::U8 => 8,
            Self::S16 => 16,
            Self::S24 => 24,
            Self::S32 | Self::F32 => 32,
            Self::F64 => 64,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    fn from_symphonia(format: symphonia::core::sample::SampleFormat) -> Self {
        use symphonia::core::sample::SampleFormat as Sf;
        match format {
            Sf::U8 | Sf::S8 => Self::U8,
            Sf::U16 | Sf::S16 => Self::S16,
            Sf::U24 | Sf::S24 => Self::S24,
            Sf::U32 | Sf::S32 => Self::S32,
            Sf::F32 => Self::F32,
            Sf::F64 => Self::F64,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::U8),
            16 => Some(Self::S16),
            24 => Some(Self::S24),
            32 => Some(Self::S32),
            _ => None,
        }
    }

    fn from_wav_spec(spec: hound::WavSpec) -> Self {
        match spec.sample_format {
            hound::SampleFormat::Float => Self::F32,
            hound::SampleFormat::Int => {
                Self::from_bits(u32::from(spec.bits_per_sample)).unwrap_or(Self::S32)
            }
        }
    }
}

/// A block of interleaved frames
///
/// Samples are `f64` in [-1.0, 1.0) regardless of the stream's stored format.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBlock {
    samples: Vec<f64>,
    channels: usize,
}

impl FrameBlock {
    pub fn new(samples: Vec<f64>, channels: usize) -> Self {
        Self { samples, channels }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `(frames, channels)`
    pub fn shape(&self) -> (usize, usize) {
        (self.frames(), self.channels)
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Replace the contents of `out` with the samples narrowed to `f32`
    pub fn copy_to_f32(&self, out: &mut Vec<f32>) {
        out.clear();
        out.extend(self.samples.iter().map(|&s| s as f32));
    }

    /// Multiply every sample by a linear gain
    pub fn apply_gain(&mut self, gain: f64) {
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }
}

/// An already-open decoder that produces interleaved frames
///
/// Implementations must fill `out` with exactly `max_frames` frames unless the
/// stream ends first, and `rewind` must restore frame 0 exactly.
pub trait FrameReader {
    fn channels(&self) -> usize;

    fn sample_rate(&self) -> u32;

    fn sample_format(&self) -> SampleFormat;

    /// Append up to `max_frames` frames to `out`, returning how many were appended
    fn read_frames(&mut self, out: &mut Vec<f64>, max_frames: usize) -> Result<usize>;

    fn rewind(&mut self) -> Result<()>;
}

impl<R: Read + Seek> FrameReader for hound::WavReader<R> {
    fn channels(&self) -> usize {
        usize::from(self.spec().channels)
    }

    fn sample_rate(&self) -> u32 {
        self.spec().sample_rate
    }

    fn sample_format(&self) -> SampleFormat {
        SampleFormat::from_wav_spec(self.spec())
    }

    fn read_frames(&mut self, out: &mut Vec<f64>, max_frames: usize) -> Result<usize> {
        let spec = self.spec();
        let channels = usize::from(spec.channels);
        let wanted = max_frames * channels;
        let start = out.len();

        match spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in self.samples::<f32>().take(wanted) {
                    let sample = sample.map_err(|e| LoudnessError::Decode(e.to_string()))?;
                    out.push(f64::from(sample));
                }
            }
            hound::SampleFormat::Int => {
                let scale = f64::from(1_u32 << (spec.bits_per_sample - 1));
                for sample in self.samples::<i32>().take(wanted) {
                    let sample = sample.map_err(|e| LoudnessError::Decode(e.to_string()))?;
                    out.push(f64::from(sample) / scale);
                }
            }
        }

        let read = out.len() - start;
        if read % channels != 0 {
            return Err(LoudnessError::Decode(format!(
                "Stream ended mid-frame ({read} samples for {channels} channels)"
            )));
        }
        Ok(read / channels)
    }

    fn rewind(&mut self) -> Result<()> {
        self.seek(0)?;
        Ok(())
    }
}

/// Where a [`SymphoniaReader`] gets its bytes from
enum Origin {
    /// Reopened for every pass
    Path(PathBuf),
    /// Seeked back to byte 0 for every pass
    Handle(File),
}

impl Origin {
    fn open(&self) -> Result<(MediaSourceStream, Hint)> {
        let mut hint = Hint::new();
        let file = match self {
            Self::Path(path) => {
                if !path.exists() {
                    return Err(LoudnessError::FileNotFound(path.clone()));
                }
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    hint.with_extension(ext);
                }
                File::open(path)?
            }
            Self::Handle(file) => {
                let mut file = file.try_clone()?;
                file.seek(SeekFrom::Start(0))?;
                file
            }
        };
        Ok((MediaSourceStream::new(Box::new(file), Default::default()), hint))
    }
}

/// Container reader and codec for one pass over an [`Origin`]
struct Stream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
    sample_format: SampleFormat,
}

impl Stream {
    fn open(origin: &Origin) -> Result<Self> {
        let (mss, hint) = origin.open()?;

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoudnessError::NoAudioTrack)?;

        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| LoudnessError::Decode("Missing sample rate".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| LoudnessError::Decode("Missing channel layout".to_string()))?;
        // Lossy codecs report neither and decode to float.
        let sample_format = params
            .sample_format
            .map(SampleFormat::from_symphonia)
            .or_else(|| params.bits_per_sample.and_then(SampleFormat::from_bits))
            .unwrap_or(SampleFormat::F32);
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs().make(params, &DecoderOptions::default())?;

        Ok(Self {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
            sample_format,
        })
    }
}

/// Streaming decoder for any container and codec Symphonia supports
pub struct SymphoniaReader {
    origin: Origin,
    stream: Stream,
    /// Decoded samples not yet handed out
    pending: Vec<f64>,
    pending_pos: usize,
    sample_buf: Option<SampleBuffer<f64>>,
    finished: bool,
}

impl SymphoniaReader {
    /// Open a file by path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_origin(Origin::Path(path.as_ref().to_path_buf()))
    }

    /// Decode from an open file; the reader keeps its own descriptor
    pub fn from_file(file: &File) -> Result<Self> {
        Self::from_origin(Origin::Handle(file.try_clone()?))
    }

    fn from_origin(origin: Origin) -> Result<Self> {
        let stream = Stream::open(&origin)?;
        debug!(
            "Opened {} ch @ {} Hz stream ({:?})",
            stream.channels, stream.sample_rate, stream.sample_format
        );
        Ok(Self {
            origin,
            stream,
            pending: Vec::new(),
            pending_pos: 0,
            sample_buf: None,
            finished: false,
        })
    }

    /// Decode the next packet of our track into `pending`
    ///
    /// Returns `false` once the stream is exhausted.
    fn decode_next(&mut self) -> Result<bool> {
        let stream = &mut self.stream;
        loop {
            let packet = match stream.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    stream.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != stream.track_id {
                continue;
            }

            let decoded = match stream.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            if spec.channels.count() != stream.channels {
                return Err(LoudnessError::Decode(format!(
                    "Channel count changed mid-stream ({} -> {})",
                    stream.channels,
                    spec.channels.count()
                )));
            }
            if decoded.frames() == 0 {
                continue;
            }

            let capacity = decoded.capacity() as u64;
            let needed = decoded.capacity() * stream.channels;
            if self
                .sample_buf
                .as_ref()
                .is_some_and(|buf| buf.capacity() < needed)
            {
                self.sample_buf = None;
            }
            let buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::new(capacity, spec));
            buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending.extend_from_slice(buf.samples());
            self.pending_pos = 0;
            return Ok(true);
        }
    }
}

impl FrameReader for SymphoniaReader {
    fn channels(&self) -> usize {
        self.stream.channels
    }

    fn sample_rate(&self) -> u32 {
        self.stream.sample_rate
    }

    fn sample_format(&self) -> SampleFormat {
        self.stream.sample_format
    }

    fn read_frames(&mut self, out: &mut Vec<f64>, max_frames: usize) -> Result<usize> {
        let channels = self.stream.channels;
        let wanted = max_frames * channels;
        let start = out.len();

        while out.len() - start < wanted {
            if self.pending_pos == self.pending.len()
                && (self.finished || !self.decode_next()?)
            {
                self.finished = true;
                break;
            }
            let take = (wanted - (out.len() - start)).min(self.pending.len() - self.pending_pos);
            out.extend_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
            self.pending_pos += take;
        }

        Ok((out.len() - start) / channels)
    }

    fn rewind(&mut self) -> Result<()> {
        self.stream = Stream::open(&self.origin)?;
        self.pending.clear();
        self.pending_pos = 0;
        self.finished = false;
        trace!("Stream reopened at frame 0");
        Ok(())
    }
}

/// An open handle, either lent by the caller or handed over
pub enum HandleRef<'a> {
    /// The caller keeps ownership and the handle stays open after the source is dropped
    Borrowed(&'a File),
    /// Closed together with the source
    Owned(File),
}

impl HandleRef<'_> {
    fn file(&self) -> &File {
        match self {
            Self::Borrowed(file) => *file,
            Self::Owned(file) => file,
        }
    }
}

/// An already-open decoder, either lent by the caller or handed over
pub enum DecoderRef<'a> {
    Borrowed(&'a mut dyn FrameReader),
    Owned(Box<dyn FrameReader>),
}

/// Anything an [`AudioSource`] can be built from
pub enum SourceInput<'a> {
    Path(PathBuf),
    Handle(HandleRef<'a>),
    Decoder(DecoderRef<'a>),
}

impl SourceInput<'static> {
    /// Classify a dynamically typed value
    ///
    /// Accepts `String`, `&'static str`, `PathBuf`, `File` and `Box<dyn FrameReader>`.
    /// Strings must name an existing file. Everything else is rejected with
    /// [`LoudnessError::UnsupportedSourceType`].
    pub fn classify<T: Any>(value: T) -> Result<Self> {
        let unsupported = || LoudnessError::UnsupportedSourceType {
            type_name: type_name::<T>().to_string(),
        };

        let value: Box<dyn Any> = Box::new(value);
        let value = match value.downcast::<PathBuf>() {
            Ok(path) => return Ok(Self::Path(*path)),
            Err(value) => value,
        };
        let value = match value.downcast::<File>() {
            Ok(file) => return Ok(Self::Handle(HandleRef::Owned(*file))),
            Err(value) => value,
        };
        let value = match value.downcast::<Box<dyn FrameReader>>() {
            Ok(reader) => return Ok(Self::Decoder(DecoderRef::Owned(*reader))),
            Err(value) => value,
        };

        let text = if let Some(s) = value.downcast_ref::<String>() {
            s.as_str()
        } else if let Some(s) = value.downcast_ref::<&'static str>() {
            s
        } else {
            return Err(unsupported());
        };

        path_from_text(text, type_name::<T>()).map(Self::Path)
    }
}

impl fmt::Debug for SourceInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Handle(HandleRef::Borrowed(_)) => f.write_str("Handle(borrowed)"),
            Self::Handle(HandleRef::Owned(_)) => f.write_str("Handle(owned)"),
            Self::Decoder(DecoderRef::Borrowed(_)) => f.write_str("Decoder(borrowed)"),
            Self::Decoder(DecoderRef::Owned(_)) => f.write_str("Decoder(owned)"),
        }
    }
}

/// Conversion into a [`SourceInput`], checked at construction time
///
/// Strings are only accepted when they name an existing file; any other text is
/// not a path-like source and fails with [`LoudnessError::UnsupportedSourceType`].
/// Typed paths are passed through and reported as [`LoudnessError::FileNotFound`]
/// when opened.
pub trait IntoSource<'a> {
    fn into_source(self) -> Result<SourceInput<'a>>;
}

/// Path named by `text`, if it is an existing file
fn path_from_text(text: &str, type_name: &str) -> Result<PathBuf> {
    let path = Path::new(text);
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(LoudnessError::UnsupportedSourceType {
            type_name: type_name.to_string(),
        })
    }
}

impl<'a> IntoSource<'a> for SourceInput<'a> {
    fn into_source(self) -> Result<SourceInput<'a>> {
        Ok(self)
    }
}

impl<'a> IntoSource<'a> for &str {
    fn into_source(self) -> Result<SourceInput<'a>> {
        path_from_text(self, type_name::<Self>()).map(SourceInput::Path)
    }
}

impl<'a> IntoSource<'a> for String {
    fn into_source(self) -> Result<SourceInput<'a>> {
        path_from_text(&self, type_name::<Self>()).map(SourceInput::Path)
    }
}

impl<'a> IntoSource<'a> for &Path {
    fn into_source(self) -> Result<SourceInput<'a>> {
        Ok(SourceInput::Path(self.to_path_buf()))
    }
}

impl<'a> IntoSource<'a> for &PathBuf {
    fn into_source(self) -> Result<SourceInput<'a>> {
        Ok(SourceInput::Path(self.clone()))
    }
}

impl<'a> IntoSource<'a> for PathBuf {
    fn into_source(self) -> Result<SourceInput<'a>> {
        Ok(SourceInput::Path(self))
    }
}

impl<'a> IntoSource<'a> for &'a File {
    fn into_source(self) -> Result<SourceInput<'a>> {
        Ok(SourceInput::Handle(HandleRef::Borrowed(self)))
    }
}

impl<'a> IntoSource<'a> for File {
    fn into_source(self) -> Result<SourceInput<'a>> {
        Ok(SourceInput::Handle(HandleRef::Owned(self)))
    }
}

impl<'a, R: FrameReader + 'a> IntoSource<'a> for &'a mut R {
    fn into_source(self) -> Result<SourceInput<'a>> {
        Ok(SourceInput::Decoder(DecoderRef::Borrowed(self)))
    }
}

impl<'a> IntoSource<'a> for Box<dyn FrameReader> {
    fn into_source(self) -> Result<SourceInput<'a>> {
        Ok(SourceInput::Decoder(DecoderRef::Owned(self)))
    }
}

/// Check that a handle can be read, leaving its position untouched
fn validate_handle(file: &File) -> Result<()> {
    let mut probe = file;
    let position = probe.stream_position()?;
    let mut byte = [0_u8; 1];
    if let Err(e) = probe.read(&mut byte) {
        return Err(LoudnessError::InvalidOpenMode(format!(
            "handle is not readable as a binary stream: {e}"
        )));
    }
    probe.seek(SeekFrom::Start(position))?;
    Ok(())
}

enum Backend<'a> {
    Owned(Box<dyn FrameReader>),
    Borrowed(&'a mut dyn FrameReader),
}

impl Backend<'_> {
    fn reader(&mut self) -> &mut dyn FrameReader {
        match self {
            Self::Owned(reader) => reader.as_mut(),
            Self::Borrowed(reader) => &mut **reader,
        }
    }

    fn reader_ref(&self) -> &dyn FrameReader {
        match self {
            Self::Owned(reader) => reader.as_ref(),
            Self::Borrowed(reader) => &**reader,
        }
    }
}

/// A restartable stream of fixed-size frame blocks
pub struct AudioSource<'a> {
    backend: Backend<'a>,
    block_size: usize,
    channels: usize,
    sample_rate: u32,
    sample_format: SampleFormat,
    owns_handle: bool,
    /// Frames handed out since the last rewind
    cursor: u64,
    /// Keeps an owned handle alive (and closes it) with the source
    _handle: Option<File>,
}

impl<'a> AudioSource<'a> {
    /// Build a source with the default block size
    pub fn new(input: impl IntoSource<'a>) -> Result<Self> {
        Self::with_block_size(input, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(input: impl IntoSource<'a>, block_size: usize) -> Result<Self> {
        if !(1..=MAX_BLOCK_SIZE).contains(&block_size) {
            return Err(LoudnessError::InvalidBlockSize(block_size));
        }

        let input = input.into_source()?;
        trace!("Building audio source from {input:?}");

        // A lent decoder may already be part-way through its stream.
        let lent_decoder = matches!(input, SourceInput::Decoder(DecoderRef::Borrowed(_)));

        let (backend, owns_handle, handle) = match input {
            SourceInput::Path(path) => (
                Backend::Owned(Box::new(SymphoniaReader::open(&path)?)),
                true,
                None,
            ),
            SourceInput::Handle(handle) => {
                validate_handle(handle.file())?;
                let reader = SymphoniaReader::from_file(handle.file())?;
                match handle {
                    HandleRef::Borrowed(_) => (Backend::Owned(Box::new(reader)), false, None),
                    HandleRef::Owned(file) => (Backend::Owned(Box::new(reader)), true, Some(file)),
                }
            }
            SourceInput::Decoder(DecoderRef::Borrowed(reader)) => {
                (Backend::Borrowed(reader), false, None)
            }
            SourceInput::Decoder(DecoderRef::Owned(reader)) => {
                (Backend::Owned(reader), true, None)
            }
        };

        let reader = backend.reader_ref();
        let channels = reader.channels();
        let sample_rate = reader.sample_rate();
        let sample_format = reader.sample_format();
        if channels == 0 {
            return Err(LoudnessError::Decode("Stream has no channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(LoudnessError::Decode("Stream has no sample rate".to_string()));
        }

        let mut source = Self {
            backend,
            block_size,
            channels,
            sample_rate,
            sample_format,
            owns_handle,
            cursor: 0,
            _handle: handle,
        };

        if lent_decoder {
            source.rewind()?;
        }

        Ok(source)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Frames handed out since the last rewind
    pub fn frames_read(&self) -> u64 {
        self.cursor
    }

    /// Whether the underlying handle is closed with this source
    pub fn owns_handle(&self) -> bool {
        self.owns_handle
    }

    /// Seek back to frame 0
    pub fn rewind(&mut self) -> Result<()> {
        self.backend.reader().rewind()?;
        self.cursor = 0;
        Ok(())
    }

    /// Stream blocks from frame 0
    ///
    /// Rewinds first if anything has been read, so every call yields the same
    /// sequence of samples.
    pub fn read_frames(&mut self) -> Result<Blocks<'_, 'a>> {
        if self.cursor > 0 {
            self.rewind()?;
        }
        Ok(Blocks {
            source: self,
            done: false,
        })
    }
}

impl fmt::Debug for AudioSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("sample_format", &self.sample_format)
            .field("block_size", &self.block_size)
            .field("owns_handle", &self.owns_handle)
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Iterator over the blocks of one pass
pub struct Blocks<'s, 'a> {
    source: &'s mut AudioSource<'a>,
    done: bool,
}

impl Iterator for Blocks<'_, '_> {
    type Item = Result<FrameBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let source = &mut *self.source;
        let block_size = source.block_size;
        let channels = source.channels;
        let mut samples = Vec::with_capacity(block_size * channels);

        match source.backend.reader().read_frames(&mut samples, block_size) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(frames) => {
                source.cursor += frames as u64;
                if frames < block_size {
                    self.done = true;
                }
                Some(Ok(FrameBlock::new(samples, channels)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(channels: u16, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                for ch in 0..channels {
                    writer
                        .write_sample(((i * 7 + usize::from(ch)) % 1000) as i16)
                        .unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_block_shapes() {
        let mut reader = hound::WavReader::new(Cursor::new(wav_bytes(2, 2500))).unwrap();
        let mut source = AudioSource::new(&mut reader).unwrap();

        let shapes: Vec<_> = source
            .read_frames()
            .unwrap()
            .map(|b| b.unwrap().shape())
            .collect();
        assert_eq!(shapes, vec![(1024, 2), (1024, 2), (452, 2)]);
        assert_eq!(source.frames_read(), 2500);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let mut reader = hound::WavReader::new(Cursor::new(wav_bytes(1, 64))).unwrap();
        let mut source = AudioSource::with_block_size(&mut reader, 16).unwrap();
        let blocks: Vec<_> = source.read_frames().unwrap().collect();
        assert_eq!(blocks.len(), 4);
        assert!(blocks.iter().all(|b| b.as_ref().unwrap().frames() == 16));
    }

    #[test]
    fn test_passes_are_identical() {
        let mut reader = hound::WavReader::new(Cursor::new(wav_bytes(2, 3000))).unwrap();
        let mut source = AudioSource::with_block_size(&mut reader, 500).unwrap();

        let first: Vec<FrameBlock> = source.read_frames().unwrap().map(|b| b.unwrap()).collect();
        // Abandon a pass half-way; the next pass must still start at frame 0.
        let _ = source.read_frames().unwrap().next();
        let second: Vec<FrameBlock> = source.read_frames().unwrap().map(|b| b.unwrap()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_borrowed_decoder_is_rewound_on_construction() {
        let mut reader = hound::WavReader::new(Cursor::new(wav_bytes(1, 100))).unwrap();
        let mut scratch = Vec::new();
        reader.read_frames(&mut scratch, 40).unwrap();

        let mut source = AudioSource::new(&mut reader).unwrap();
        assert!(!source.owns_handle());
        let total: usize = source.read_frames().unwrap().map(|b| b.unwrap().frames()).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_zero_block_size_is_rejected() {
        let mut reader = hound::WavReader::new(Cursor::new(wav_bytes(1, 10))).unwrap();
        assert!(matches!(
            AudioSource::with_block_size(&mut reader, 0),
            Err(LoudnessError::InvalidBlockSize(0))
        ));
    }

    #[test]
    fn test_classify_rejects_other_types() {
        for err in [
            SourceInput::classify(42_i32).unwrap_err(),
            SourceInput::classify(1900.0_f64).unwrap_err(),
            SourceInput::classify(vec![9, 8, 7]).unwrap_err(),
            SourceInput::classify(String::from("hello")).unwrap_err(),
            SourceInput::classify("hello").unwrap_err(),
        ] {
            assert!(
                matches!(err, LoudnessError::UnsupportedSourceType { .. }),
                "unexpected error: {err}"
            );
        }
    }

    #[test]
    fn test_block_size_is_capped() {
        let mut reader = hound::WavReader::new(Cursor::new(wav_bytes(2, 10))).unwrap();
        assert!(AudioSource::with_block_size(&mut reader, MAX_BLOCK_SIZE).is_ok());
        assert!(matches!(
            AudioSource::with_block_size(&mut reader, MAX_BLOCK_SIZE + 1),
            Err(LoudnessError::InvalidBlockSize(_))
        ));
        assert!(matches!(
            AudioSource::with_block_size(&mut reader, usize::MAX),
            Err(LoudnessError::InvalidBlockSize(_))
        ));
    }

    #[test]
    fn test_bare_string_is_unsupported_source() {
        for err in [
            AudioSource::new("hello").unwrap_err(),
            AudioSource::new(String::from("hello")).unwrap_err(),
        ] {
            assert!(
                matches!(err, LoudnessError::UnsupportedSourceType { .. }),
                "unexpected error: {err}"
            );
        }
    }

    #[test]
    fn test_missing_typed_path_is_file_not_found() {
        let err = AudioSource::new(PathBuf::from("/nonexistent/input.wav")).unwrap_err();
        assert!(matches!(err, LoudnessError::FileNotFound(_)));
    }

    #[test]
    fn test_symphonia_decodes_pcm_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcm.wav");
        std::fs::write(&path, wav_bytes(2, 300)).unwrap();

        let mut reader = SymphoniaReader::open(&path).unwrap();
        assert_eq!(reader.channels(), 2);
        assert_eq!(reader.sample_rate(), 8000);
        assert_eq!(reader.sample_format(), SampleFormat::S16);

        let mut decoded = Vec::new();
        assert_eq!(reader.read_frames(&mut decoded, 1000).unwrap(), 300);
        // Frame 1, channel 1 holds (1 * 7 + 1) as a 16-bit sample
        assert!((decoded[3] - 8.0 / 32768.0).abs() < 1e-12);

        let mut hound_reader = hound::WavReader::new(Cursor::new(wav_bytes(2, 300))).unwrap();
        let mut expected = Vec::new();
        hound_reader.read_frames(&mut expected, 1000).unwrap();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_classify_reports_type_name() {
        let err = SourceInput::classify(42_u8).unwrap_err();
        assert!(err.to_string().contains("u8"));
    }

    #[test]
    fn test_classify_accepts_path_buf() {
        let input = SourceInput::classify(PathBuf::from("/does/not/matter.wav")).unwrap();
        assert!(matches!(input, SourceInput::Path(_)));
    }

    #[test]
    fn test_frame_block_helpers() {
        let mut block = FrameBlock::new(vec![0.5, -0.25, 0.1, 0.0], 2);
        assert_eq!(block.shape(), (2, 2));
        block.apply_gain(2.0);
        assert_eq!(block.samples(), &[1.0, -0.5, 0.2, 0.0]);

        let mut narrow = vec![9.0_f32; 7];
        block.copy_to_f32(&mut narrow);
        assert_eq!(narrow, vec![1.0_f32, -0.5, 0.2, 0.0]);
    }

    #[test]
    fn test_sample_format_bits() {
        assert_eq!(SampleFormat::S24.bits(), 24);
        assert!(SampleFormat::F32.is_float());
        assert!(!SampleFormat::S16.is_float());
        assert_eq!(SampleFormat::from_bits(12), None);
    }
}
