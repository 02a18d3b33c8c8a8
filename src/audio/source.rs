//! Boundary to the PCM sample producer and the hardware that owns it.

use super::Sample;
use crate::clock::{Clock, VirtualClock};
use crate::error::EngineError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a bounded read produced no data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source gave up waiting; distinct from an empty `Ok(0)` read.
    #[error("read timed out")]
    Timeout,
    #[error("device error: {0}")]
    Device(String),
}

impl From<SourceError> for EngineError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Timeout => EngineError::ReadTimeout,
            SourceError::Device(details) => EngineError::Read(details),
        }
    }
}

/// Supplies signed PCM samples with a bounded wait.
///
/// `Ok(0)` is a valid outcome and must not be treated as a failure.
pub trait SampleSource {
    fn read(&mut self, buf: &mut [Sample], timeout: Duration) -> Result<usize, SourceError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read(&mut self, buf: &mut [Sample], timeout: Duration) -> Result<usize, SourceError> {
        (**self).read(buf, timeout)
    }
}

/// The audio resource enabled for the length of one monitoring window.
///
/// `acquire` brings the hardware up and hands back its source. Dropping the
/// source releases the hardware.
pub trait AudioHardware {
    type Source: SampleSource;

    fn acquire(&mut self) -> Result<Self::Source, EngineError>;

    fn describe(&self) -> String {
        "audio hardware".to_string()
    }
}

/// Plays back a fixed recording as if it were a live microphone.
///
/// With a virtual clock attached, reads advance the clock by the duration of
/// the audio handed out, and audio that "played" while the caller slept is
/// skipped, the way an unread capture buffer overruns.
pub struct ReplaySource {
    samples: Arc<[Sample]>,
    position: usize,
    sample_rate: u32,
    clock: Option<VirtualClock>,
    origin_ms: u64,
}

impl ReplaySource {
    pub fn new(samples: Arc<[Sample]>, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate: sample_rate.max(1),
            clock: None,
            origin_ms: 0,
        }
    }

    pub fn with_clock(mut self, clock: VirtualClock) -> Self {
        self.origin_ms = clock.now_ms();
        self.clock = Some(clock);
        self
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }

    /// Samples skipped because nobody was reading when they played.
    fn catch_up(&mut self, now_ms: u64) {
        let elapsed_ms = now_ms.saturating_sub(self.origin_ms);
        let live = elapsed_ms.saturating_mul(u64::from(self.sample_rate)) / 1000;
        let live = usize::try_from(live).unwrap_or(usize::MAX).min(self.samples.len());
        if live > self.position {
            self.position = live;
        }
    }

    fn position_ms(&self) -> u64 {
        self.origin_ms + self.position as u64 * 1000 / u64::from(self.sample_rate)
    }
}

impl SampleSource for ReplaySource {
    fn read(&mut self, buf: &mut [Sample], timeout: Duration) -> Result<usize, SourceError> {
        if let Some(clock) = &self.clock {
            let now = clock.now_ms();
            self.catch_up(now);
        }
        let take = buf.len().min(self.remaining());
        if take == 0 {
            // An exhausted recording behaves like a silent microphone.
            if let Some(clock) = &self.clock {
                clock.sleep(timeout);
            }
            return Ok(0);
        }
        buf[..take].copy_from_slice(&self.samples[self.position..self.position + take]);
        self.position += take;
        if let Some(clock) = &self.clock {
            let end_ms = self.position_ms();
            if end_ms > clock.now_ms() {
                clock.set(end_ms);
            }
        }
        Ok(take)
    }
}

/// Hardware stand-in that replays the same recording on every acquisition.
pub struct ReplayHardware {
    samples: Arc<[Sample]>,
    sample_rate: u32,
    clock: VirtualClock,
    label: String,
}

impl ReplayHardware {
    pub fn new(
        samples: impl Into<Arc<[Sample]>>,
        sample_rate: u32,
        clock: VirtualClock,
        label: impl Into<String>,
    ) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            clock,
            label: label.into(),
        }
    }

    /// Load a PCM WAV file and widen it to MSB-aligned native samples.
    pub fn from_wav(
        path: &std::path::Path,
        clock: VirtualClock,
    ) -> anyhow::Result<(Self, hound::WavSpec)> {
        use anyhow::{bail, Context};

        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open recording '{}'", path.display()))?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int {
            bail!("'{}' is not integer PCM", path.display());
        }
        if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
            bail!(
                "'{}' has unsupported bit depth {}",
                path.display(),
                spec.bits_per_sample
            );
        }
        let widen = 32 - u32::from(spec.bits_per_sample);
        let channels = usize::from(spec.channels.max(1));
        let mut samples = Vec::with_capacity(reader.len() as usize / channels);
        for (index, sample) in reader.samples::<i32>().enumerate() {
            let sample = sample
                .with_context(|| format!("corrupt sample data in '{}'", path.display()))?;
            // Keep the first channel only.
            if index % channels == 0 {
                samples.push(sample << widen);
            }
        }
        let label = format!("replay:{}", path.display());
        Ok((Self::new(samples, spec.sample_rate, clock, label), spec))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the recording in virtual milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate.max(1))
    }
}

impl AudioHardware for ReplayHardware {
    type Source = ReplaySource;

    fn acquire(&mut self) -> Result<ReplaySource, EngineError> {
        if self.samples.is_empty() {
            return Err(EngineError::HardwareAcquisition(format!(
                "{} holds no samples",
                self.label
            )));
        }
        Ok(ReplaySource::new(self.samples.clone(), self.sample_rate).with_clock(self.clock.clone()))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
