//! Linear-PCM WAV serialization for assembled clips.
//!
//! Wide native samples are narrowed by an arithmetic right shift followed by
//! a saturating clamp, then streamed to disk in bounded chunks behind the
//! canonical 44-byte RIFF header.

use crate::audio::Sample;
use crate::error::EngineError;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Size of the canonical RIFF/WAVE header.
pub const HEADER_LEN: usize = 44;

const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;

/// Samples narrowed per write call.
const WRITE_CHUNK_SAMPLES: usize = 1024;

/// Output layout of a clip file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Right shift applied to native samples before clamping.
    pub pcm_shift: u32,
}

impl WavFormat {
    pub fn mono16(sample_rate: u32, pcm_shift: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
            pcm_shift,
        }
    }

    fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if !matches!(self.bits_per_sample, 16 | 24 | 32) {
            return Err(EngineError::InvalidArgument(format!(
                "unsupported output bit depth {}",
                self.bits_per_sample
            )));
        }
        if self.channels == 0 {
            return Err(EngineError::InvalidArgument(
                "channel count must be non-zero".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidArgument(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if self.pcm_shift > 31 {
            return Err(EngineError::InvalidArgument(format!(
                "pcm shift {} exceeds sample width",
                self.pcm_shift
            )));
        }
        self.byte_rate()?;
        Ok(())
    }

    fn block_align(&self) -> Result<u16, EngineError> {
        self.channels
            .checked_mul(self.bits_per_sample / 8)
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!(
                    "{} channels of {}-bit audio overflow the block align field",
                    self.channels, self.bits_per_sample
                ))
            })
    }

    fn byte_rate(&self) -> Result<u32, EngineError> {
        let block_align = self.block_align()?;
        self.sample_rate
            .checked_mul(u32::from(block_align))
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!(
                    "sample rate {} overflows the byte rate field",
                    self.sample_rate
                ))
            })
    }
}

/// Fields of a canonical PCM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WavHeader {
    pub riff_len: u32,
    pub format_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavHeader {
    pub fn for_payload(format: &WavFormat, data_len: u32) -> Result<Self, EngineError> {
        let riff_len = data_len.checked_add(36).ok_or_else(|| {
            EngineError::InvalidArgument(format!(
                "{data_len} payload bytes exceed the WAV size limit"
            ))
        })?;
        Ok(Self {
            riff_len,
            format_code: FORMAT_PCM,
            channels: format.channels,
            sample_rate: format.sample_rate,
            byte_rate: format.byte_rate()?,
            block_align: format.block_align()?,
            bits_per_sample: format.bits_per_sample,
            data_len,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&self.riff_len.to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out[20..22].copy_from_slice(&self.format_code.to_le_bytes());
        out[22..24].copy_from_slice(&self.channels.to_le_bytes());
        out[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.byte_rate.to_le_bytes());
        out[32..34].copy_from_slice(&self.block_align.to_le_bytes());
        out[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.data_len.to_le_bytes());
        out
    }

    /// Parse a canonical header. Files with extra chunks before `data` are
    /// rejected rather than searched.
    pub fn parse(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.len() < HEADER_LEN {
            return Err(EngineError::InvalidArgument(format!(
                "header needs {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let tag = |at: usize, expected: &[u8; 4]| -> Result<(), EngineError> {
            if &bytes[at..at + 4] == expected {
                Ok(())
            } else {
                Err(EngineError::InvalidArgument(format!(
                    "missing '{}' tag at offset {at}",
                    String::from_utf8_lossy(expected)
                )))
            }
        };
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at =
            |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        tag(0, b"RIFF")?;
        tag(8, b"WAVE")?;
        tag(12, b"fmt ")?;
        if u32_at(16) != FMT_CHUNK_LEN {
            return Err(EngineError::InvalidArgument(format!(
                "unexpected fmt chunk size {}",
                u32_at(16)
            )));
        }
        tag(36, b"data")?;
        Ok(Self {
            riff_len: u32_at(4),
            format_code: u16_at(20),
            channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            data_len: u32_at(40),
        })
    }

    /// Number of samples (per channel) the payload declares.
    pub fn sample_count(&self) -> u32 {
        if self.block_align == 0 {
            0
        } else {
            self.data_len / u32::from(self.block_align)
        }
    }
}

/// Shift a native sample down and clamp it to a signed `bits`-wide range.
pub fn narrow(sample: Sample, pcm_shift: u32, bits: u16) -> i32 {
    let bits = bits.clamp(1, 32);
    let max = (1i64 << (bits - 1)) - 1;
    let min = -(1i64 << (bits - 1));
    i64::from(sample >> pcm_shift.min(31)).clamp(min, max) as i32
}

/// Write `samples` to a new file at `path`.
///
/// The file is created exclusively; an existing file is an I/O failure. A
/// failed write leaves whatever was already written in place. Returns the
/// total number of bytes written, header included.
pub fn write_clip(path: &Path, samples: &[Sample], format: &WavFormat) -> Result<u64, EngineError> {
    format.validate()?;
    let bytes_per_sample = format.bytes_per_sample();
    let data_len = samples
        .len()
        .checked_mul(bytes_per_sample)
        .and_then(|len| u32::try_from(len).ok())
        .ok_or_else(|| {
            EngineError::InvalidArgument(format!(
                "{} samples exceed the WAV size limit",
                samples.len()
            ))
        })?;
    let header = WavHeader::for_payload(format, data_len)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| EngineError::io(path, err))?;

    file.write_all(&header.to_bytes())
        .map_err(|err| EngineError::io(path, err))?;
    write_payload(&mut file, samples, format).map_err(|err| EngineError::io(path, err))?;
    file.sync_all().map_err(|err| EngineError::io(path, err))?;
    drop(file);

    Ok(HEADER_LEN as u64 + u64::from(data_len))
}

fn write_payload(file: &mut File, samples: &[Sample], format: &WavFormat) -> std::io::Result<()> {
    let bytes_per_sample = format.bytes_per_sample();
    let mut chunk = Vec::with_capacity(WRITE_CHUNK_SAMPLES * bytes_per_sample);
    for block in samples.chunks(WRITE_CHUNK_SAMPLES) {
        chunk.clear();
        for &sample in block {
            let narrowed = narrow(sample, format.pcm_shift, format.bits_per_sample);
            chunk.extend_from_slice(&narrowed.to_le_bytes()[..bytes_per_sample]);
        }
        file.write_all(&chunk)?;
    }
    Ok(())
}
