use super::Sample;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Downmix interleaved input to mono while widening each value to a native
/// MSB-aligned sample, so the field pipeline sees one channel regardless of
/// the microphone layout.
pub(super) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<Sample>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> Sample,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    // Average in i64 so loud stereo frames cannot overflow.
    let mut acc = 0i64;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += i64::from(convert(sample));
        count += 1;
        if count == channels {
            buf.push((acc / channels as i64) as Sample);
            acc = 0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push((acc / count as i64) as Sample);
    }
}

pub(super) fn widen_i16(sample: i16) -> Sample {
    Sample::from(sample) << 16
}

pub(super) fn widen_u16(sample: u16) -> Sample {
    (Sample::from(sample) - 32_768) << 16
}

pub(super) fn widen_f32(sample: f32) -> Sample {
    // Float-to-int casts saturate.
    (f64::from(sample.clamp(-1.0, 1.0)) * f64::from(Sample::MAX)) as Sample
}

/// Re-chunks callback buffers into fixed-size frames for the worker.
///
/// Runs on the audio callback thread: frames that do not fit in the channel
/// are dropped and counted rather than blocking the callback.
pub(super) struct FrameDispatcher {
    frame_samples: usize,
    pending: Vec<Sample>,
    scratch: Vec<Sample>,
    sender: Sender<Vec<Sample>>,
    dropped: Arc<AtomicUsize>,
}

impl FrameDispatcher {
    pub(super) fn new(
        frame_samples: usize,
        sender: Sender<Vec<Sample>>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples),
            scratch: Vec::new(),
            sender,
            dropped,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> Sample,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.frame_samples {
            let frame: Vec<Sample> = self.pending.drain(..self.frame_samples).collect();
            if let Err(err) = self.sender.try_send(frame) {
                match err {
                    TrySendError::Full(_) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    TrySendError::Disconnected(_) => break,
                }
            }
        }
    }
}
