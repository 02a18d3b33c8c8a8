//! Continuous audio monitoring pipeline.
//!
//! Samples arrive from a [`SampleSource`] in fixed chunks, are retained in a
//! rolling [`RingBuffer`] of pre-trigger audio, and are scanned by an
//! [`EventDetector`]. When an event fires, the [`ClipAssembler`] splices the
//! retained audio together with freshly captured post-trigger audio.

/// One native-width PCM sample as delivered by the I2S slot (MSB aligned).
pub type Sample = i32;

/// Default sample rate of the field microphone.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Field recordings are always mono.
pub const CHANNELS: u16 = 1;

mod clip;
mod detector;
mod dispatch;
mod recorder;
mod ring;
mod source;

pub use clip::{CaptureEnd, Clip, ClipAssembler, ClipConfig};
pub use detector::{AmplitudeDetector, EventDetector};
pub use recorder::{CpalHardware, CpalSource};
pub use ring::RingBuffer;
pub use source::{AudioHardware, ReplayHardware, ReplaySource, SampleSource, SourceError};
