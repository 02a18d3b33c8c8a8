//! Acoustic event detection over one scan chunk.

use super::Sample;

/// Classifies a chunk of samples as "event" or "no event".
///
/// Implementations must not carry state between chunks; the engine may call
/// them from any point of the monitoring window.
pub trait EventDetector {
    fn detect(&self, samples: &[Sample]) -> bool;
    fn name(&self) -> &'static str {
        "unknown_detector"
    }
}

/// Counts samples whose normalized magnitude reaches a threshold.
///
/// A single loud sample is not an event: `min_hits` samples within one chunk
/// must reach the threshold, which suppresses pops and glitches.
#[derive(Debug, Clone)]
pub struct AmplitudeDetector {
    pcm_shift: u32,
    threshold: u32,
    min_hits: usize,
}

impl AmplitudeDetector {
    pub fn new(pcm_shift: u32, threshold: u32, min_hits: usize) -> Self {
        Self {
            pcm_shift: pcm_shift.min(31),
            threshold,
            min_hits: min_hits.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn min_hits(&self) -> usize {
        self.min_hits
    }
}

impl EventDetector for AmplitudeDetector {
    fn detect(&self, samples: &[Sample]) -> bool {
        let mut hits = 0usize;
        for &sample in samples {
            let magnitude = (sample >> self.pcm_shift).unsigned_abs();
            if magnitude >= self.threshold {
                hits += 1;
                if hits >= self.min_hits {
                    return true;
                }
            }
        }
        false
    }

    fn name(&self) -> &'static str {
        "amplitude_detector"
    }
}
