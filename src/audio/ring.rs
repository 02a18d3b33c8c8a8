//! Fixed-capacity rolling window of the most recent samples.

use super::Sample;
use crate::error::EngineError;

/// Circular store of pre-trigger audio.
///
/// Storage is reserved once and never reallocated. Writes overwrite the
/// oldest data once the buffer has wrapped; reads never mutate state and
/// always come back oldest first.
pub struct RingBuffer {
    samples: Box<[Sample]>,
    cursor: usize,
    wrapped: bool,
}

impl RingBuffer {
    /// Reserve and zero-fill storage for `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self, EngineError> {
        if capacity == 0 {
            return Err(EngineError::InvalidArgument(
                "ring buffer capacity must be non-zero".to_string(),
            ));
        }
        let mut storage: Vec<Sample> = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| EngineError::AllocationFailure {
                what: "ring buffer",
                samples: capacity,
            })?;
        storage.resize(capacity, 0);
        Ok(Self {
            samples: storage.into_boxed_slice(),
            cursor: 0,
            wrapped: false,
        })
    }

    /// Sized for `seconds` of audio at `sample_rate`.
    pub fn for_duration(sample_rate: u32, seconds: u32) -> Result<Self, EngineError> {
        let capacity = (sample_rate as usize)
            .checked_mul(seconds as usize)
            .ok_or(EngineError::AllocationFailure {
                what: "ring buffer",
                samples: usize::MAX,
            })?;
        Self::new(capacity)
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Number of samples a chronological read can return.
    pub fn len(&self) -> usize {
        if self.wrapped {
            self.samples.len()
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Logically empty the buffer. Contents are left in place.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.wrapped = false;
    }

    pub fn write(&mut self, samples: &[Sample]) {
        let capacity = self.samples.len();
        let mut input = samples;
        // Only the tail can survive a write longer than the buffer.
        if input.len() > capacity {
            let skipped = input.len() - capacity;
            self.cursor = (self.cursor + skipped) % capacity;
            self.wrapped = true;
            input = &input[skipped..];
        }
        while !input.is_empty() {
            let room = capacity - self.cursor;
            let take = room.min(input.len());
            self.samples[self.cursor..self.cursor + take].copy_from_slice(&input[..take]);
            self.cursor += take;
            input = &input[take..];
            if self.cursor == capacity {
                self.cursor = 0;
                self.wrapped = true;
            }
        }
    }

    /// Append up to `max_samples` of the oldest retained samples to `out`.
    ///
    /// Returns how many samples were appended.
    pub fn read_chronological_into(&self, out: &mut Vec<Sample>, max_samples: usize) -> usize {
        let count = max_samples.min(self.len());
        let start = if self.wrapped { self.cursor } else { 0 };
        let first = (self.samples.len() - start).min(count);
        out.extend_from_slice(&self.samples[start..start + first]);
        out.extend_from_slice(&self.samples[..count - first]);
        count
    }

    /// Oldest-first copy of up to `max_samples` retained samples.
    pub fn read_chronological(&self, max_samples: usize) -> Vec<Sample> {
        let mut out = Vec::with_capacity(max_samples.min(self.len()));
        self.read_chronological_into(&mut out, max_samples);
        out
    }
}
