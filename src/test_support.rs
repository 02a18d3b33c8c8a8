//! Scripted sources, counting hardware and scratch directories for tests.

use crate::audio::{AudioHardware, Sample, SampleSource, SourceError};
use crate::clock::{Clock, VirtualClock};
use crate::error::EngineError;
use std::collections::VecDeque;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Value that clears the default detector (threshold 3000 after >> 14).
pub(crate) const LOUD: Sample = 3_000 << 14;
pub(crate) const QUIET: Sample = 100 << 14;

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Data(Vec<Sample>),
    Empty,
    Timeout,
    Fail,
    /// Raise the flag, then report an empty read.
    RaiseStop(Arc<AtomicBool>),
}

/// What a scripted source does once its script runs out.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fallback {
    Constant(Sample),
    Empty,
}

/// Replays a fixed script of read outcomes, then falls back.
pub(crate) struct ScriptedSource {
    steps: VecDeque<Step>,
    fallback: Fallback,
    clock: Option<(VirtualClock, u32)>,
    samples_out: u64,
    released: Option<Arc<AtomicUsize>>,
    pub(crate) reads: usize,
}

impl ScriptedSource {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>, fallback: Fallback) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            fallback,
            clock: None,
            samples_out: 0,
            released: None,
            reads: 0,
        }
    }

    /// A source that never runs dry.
    pub(crate) fn constant(value: Sample) -> Self {
        Self::new(Vec::<Step>::new(), Fallback::Constant(value))
    }

    /// Advance `clock` by the duration of every sample handed out.
    pub(crate) fn timed(mut self, clock: VirtualClock, sample_rate: u32) -> Self {
        self.clock = Some((clock, sample_rate.max(1)));
        self
    }

    fn hand_out(&mut self, count: usize) {
        if let Some((clock, rate)) = &self.clock {
            let before = self.samples_out * 1000 / u64::from(*rate);
            self.samples_out += count as u64;
            let after = self.samples_out * 1000 / u64::from(*rate);
            clock.advance(after - before);
        }
    }
}

impl SampleSource for ScriptedSource {
    fn read(&mut self, buf: &mut [Sample], timeout: Duration) -> Result<usize, SourceError> {
        self.reads += 1;
        match self.steps.pop_front() {
            Some(Step::Data(mut data)) => {
                let take = data.len().min(buf.len());
                buf[..take].copy_from_slice(&data[..take]);
                if take < data.len() {
                    let rest = data.split_off(take);
                    self.steps.push_front(Step::Data(rest));
                }
                self.hand_out(take);
                Ok(take)
            }
            Some(Step::Empty) => Ok(0),
            Some(Step::Timeout) => {
                if let Some((clock, _)) = &self.clock {
                    clock.sleep(timeout);
                }
                Err(SourceError::Timeout)
            }
            Some(Step::Fail) => Err(SourceError::Device("scripted failure".to_string())),
            Some(Step::RaiseStop(flag)) => {
                flag.store(true, Ordering::SeqCst);
                Ok(0)
            }
            None => match self.fallback {
                Fallback::Constant(value) => {
                    buf.fill(value);
                    self.hand_out(buf.len());
                    Ok(buf.len())
                }
                Fallback::Empty => {
                    if let Some((clock, _)) = &self.clock {
                        clock.sleep(timeout);
                    }
                    Ok(0)
                }
            },
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        if let Some(released) = &self.released {
            released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Hands out one scripted source per acquisition and counts releases.
pub(crate) struct CountingHardware {
    scripts: VecDeque<Vec<Step>>,
    fallback: Fallback,
    clock: VirtualClock,
    sample_rate: u32,
    pub(crate) fail_acquire: bool,
    pub(crate) acquired: Arc<AtomicUsize>,
    pub(crate) released: Arc<AtomicUsize>,
}

impl CountingHardware {
    pub(crate) fn new(clock: VirtualClock, sample_rate: u32, fallback: Fallback) -> Self {
        Self {
            scripts: VecDeque::new(),
            fallback,
            clock,
            sample_rate,
            fail_acquire: false,
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script for the next window; later windows use the fallback only.
    pub(crate) fn with_script(mut self, steps: Vec<Step>) -> Self {
        self.scripts.push_back(steps);
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail_acquire = true;
        self
    }
}

impl AudioHardware for CountingHardware {
    type Source = ScriptedSource;

    fn acquire(&mut self) -> Result<ScriptedSource, EngineError> {
        if self.fail_acquire {
            return Err(EngineError::HardwareAcquisition(
                "scripted acquisition failure".to_string(),
            ));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let steps = self.scripts.pop_front().unwrap_or_default();
        let mut source = ScriptedSource::new(steps, self.fallback)
            .timed(self.clock.clone(), self.sample_rate);
        source.released = Some(Arc::clone(&self.released));
        Ok(source)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// A fresh directory under the system temp dir.
pub(crate) fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = env::temp_dir().join(format!(
        "fieldmic_{name}_{}_{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Files directly inside `dir`; empty when the directory does not exist.
pub(crate) fn files_in(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

