//! Splices pre-trigger and post-trigger audio into one clip.
//!
//! On detection the ring buffer's retained audio is copied out oldest first,
//! then the source is polled until the post-trigger quota is met or the
//! source stalls. Everything read while capturing is also written back into
//! the ring buffer so monitoring state carries on undisturbed.

use super::ring::RingBuffer;
use super::source::SampleSource;
use super::Sample;
use crate::error::EngineError;
use std::time::Duration;

/// Tuning for post-trigger capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipConfig {
    pub post_trigger_samples: usize,
    pub chunk_samples: usize,
    pub read_timeout: Duration,
    pub empty_read_budget: u32,
}

/// Why post-trigger capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    Complete,
    /// The consecutive empty-read budget ran out before the quota was met.
    SourceStalled { empty_reads: u32 },
}

/// One assembled event, borrowed from the assembler's arena until the next
/// assembly.
#[derive(Debug)]
pub struct Clip<'a> {
    samples: &'a [Sample],
    pre_trigger: usize,
    end: CaptureEnd,
}

impl<'a> Clip<'a> {
    pub fn samples(&self) -> &'a [Sample] {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn pre_trigger_len(&self) -> usize {
        self.pre_trigger
    }

    pub fn post_trigger_len(&self) -> usize {
        self.samples.len() - self.pre_trigger
    }

    pub fn end(&self) -> CaptureEnd {
        self.end
    }
}

/// Owns the clip arena and the read scratch buffer, both reserved up front so
/// event handling never allocates.
pub struct ClipAssembler {
    config: ClipConfig,
    arena: Vec<Sample>,
    scratch: Box<[Sample]>,
}

impl ClipAssembler {
    /// Reserve room for a full pre-trigger window plus the post-trigger quota.
    pub fn new(config: ClipConfig, pre_trigger_capacity: usize) -> Result<Self, EngineError> {
        if config.chunk_samples == 0 {
            return Err(EngineError::InvalidArgument(
                "clip chunk size must be non-zero".to_string(),
            ));
        }
        let total = pre_trigger_capacity
            .checked_add(config.post_trigger_samples)
            .ok_or(EngineError::AllocationFailure {
                what: "clip arena",
                samples: usize::MAX,
            })?;
        let mut arena = Vec::new();
        arena
            .try_reserve_exact(total)
            .map_err(|_| EngineError::AllocationFailure {
                what: "clip arena",
                samples: total,
            })?;
        let scratch = vec![0; config.chunk_samples].into_boxed_slice();
        Ok(Self {
            config,
            arena,
            scratch,
        })
    }

    /// Build the clip for an event that was just detected.
    ///
    /// A `Timeout` or device error from the source aborts the clip; nothing
    /// should be written for it.
    pub fn assemble<S>(
        &mut self,
        ring: &mut RingBuffer,
        source: &mut S,
    ) -> Result<Clip<'_>, EngineError>
    where
        S: SampleSource + ?Sized,
    {
        self.arena.clear();
        let pre_trigger = ring.read_chronological_into(&mut self.arena, ring.capacity());

        let quota = self.config.post_trigger_samples;
        let mut captured = 0usize;
        let mut empty_reads = 0u32;
        let mut end = CaptureEnd::Complete;

        while captured < quota {
            let want = (quota - captured).min(self.scratch.len());
            let read = source.read(&mut self.scratch[..want], self.config.read_timeout)?;
            if read == 0 {
                empty_reads += 1;
                if empty_reads >= self.config.empty_read_budget {
                    end = CaptureEnd::SourceStalled { empty_reads };
                    break;
                }
                continue;
            }
            empty_reads = 0;
            let chunk = &self.scratch[..read.min(want)];
            ring.write(chunk);
            self.arena.extend_from_slice(chunk);
            captured += chunk.len();
        }

        if let CaptureEnd::SourceStalled { empty_reads } = end {
            tracing::debug!(
                captured,
                quota,
                empty_reads,
                "post-trigger capture ended early"
            );
        }

        Ok(Clip {
            samples: &self.arena,
            pre_trigger,
            end,
        })
    }
}
