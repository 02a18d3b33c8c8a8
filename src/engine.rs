//! The monitoring engine: one owner for the ring buffer, detector, clip
//! assembler and duty-cycle scheduler.
//!
//! Everything here runs on a single worker. The only places it waits are
//! bounded source reads and bounded clock sleeps, and the stop flag is only
//! looked at between reads, so no read or file write is ever cut short.

use crate::audio::{
    AmplitudeDetector, AudioHardware, CaptureEnd, ClipAssembler, EventDetector, RingBuffer,
    Sample, SampleSource,
};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::scheduler::DutyCycleScheduler;
use crate::storage::Storage;
use crate::wav::{self, WavFormat};
use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const CLIP_EXTENSION: &str = "wav";
/// Longest single sleep while idle, so a stop request is noticed promptly.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Progress notices published to the host while the engine runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    WindowStarted {
        at_ms: u64,
        device: String,
    },
    WindowSkipped {
        at_ms: u64,
        reason: &'static str,
        details: String,
    },
    EventDetected {
        at_ms: u64,
    },
    ClipSaved {
        path: PathBuf,
        bytes: u64,
        samples: usize,
        pre_trigger_samples: usize,
        truncated: bool,
    },
    ClipFailed {
        reason: &'static str,
        details: String,
    },
    WindowEnded {
        at_ms: u64,
        duration_ms: u64,
        clips_saved: u32,
    },
}

/// Counters accumulated over the engine's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub windows_started: u32,
    pub windows_skipped: u32,
    pub windows_completed: u32,
    pub events_detected: u32,
    pub clips_saved: u32,
    pub clips_failed: u32,
    pub bytes_written: u64,
    pub read_errors: u64,
    pub events_dropped: u64,
}

impl EngineStats {
    /// Windows that were attempted, whether they ran or were skipped.
    pub fn cycles(&self) -> u32 {
        self.windows_completed + self.windows_skipped
    }
}

struct SavedClip {
    path: PathBuf,
    bytes: u64,
    samples: usize,
    pre_trigger_samples: usize,
    truncated: bool,
}

pub struct MonitorEngine<H, S, C> {
    config: EngineConfig,
    hardware: H,
    storage: S,
    clock: C,
    ring: RingBuffer,
    detector: AmplitudeDetector,
    assembler: ClipAssembler,
    scheduler: DutyCycleScheduler,
    format: WavFormat,
    scan: Box<[Sample]>,
    events: Option<Sender<MonitorEvent>>,
    stats: EngineStats,
}

impl<H, S, C> MonitorEngine<H, S, C>
where
    H: AudioHardware,
    S: Storage,
    C: Clock,
{
    /// Reserve every buffer the engine will use. An `AllocationFailure` here
    /// means the engine must not start.
    pub fn new(
        config: EngineConfig,
        hardware: H,
        storage: S,
        clock: C,
    ) -> Result<Self, EngineError> {
        let ring = RingBuffer::for_duration(config.sample_rate, config.pre_trigger_secs)?;
        let assembler = ClipAssembler::new(config.clip_config(), ring.capacity())?;
        let mut scan = Vec::new();
        scan.try_reserve_exact(config.chunk_samples)
            .map_err(|_| EngineError::AllocationFailure {
                what: "scan buffer",
                samples: config.chunk_samples,
            })?;
        scan.resize(config.chunk_samples, 0);
        let scheduler = DutyCycleScheduler::new(
            config.interval_ms,
            config.window_ms,
            clock.now_ms(),
            config.arm_on_start,
        );
        Ok(Self {
            detector: config.detector(),
            format: config.wav_format(),
            config,
            hardware,
            storage,
            clock,
            ring,
            assembler,
            scheduler,
            scan: scan.into_boxed_slice(),
            events: None,
            stats: EngineStats::default(),
        })
    }

    /// Publish [`MonitorEvent`]s on `sender`. A full channel drops the
    /// event rather than stalling the worker.
    pub fn with_events(mut self, sender: Sender<MonitorEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn scheduler(&self) -> &DutyCycleScheduler {
        &self.scheduler
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    /// Drive the duty cycle until `stop` is raised or `max_cycles` windows
    /// have been attempted (0 = no limit).
    pub fn run(&mut self, stop: &AtomicBool, max_cycles: u32) -> EngineStats {
        tracing::info!(
            interval_ms = self.scheduler.interval_ms(),
            window_ms = self.scheduler.window_ms(),
            threshold = self.detector.threshold(),
            min_hits = self.detector.min_hits(),
            device = %self.hardware.describe(),
            "monitor engine started"
        );
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if max_cycles > 0 && self.stats.cycles() >= max_cycles {
                break;
            }
            let now = self.clock.now_ms();
            if self.scheduler.is_due(now) {
                self.run_window(stop);
            } else {
                let wait = self.scheduler.until_due(now).min(IDLE_POLL);
                self.clock.sleep(wait.max(Duration::from_millis(1)));
            }
        }
        tracing::info!(
            windows = self.stats.windows_completed,
            clips_saved = self.stats.clips_saved,
            clips_failed = self.stats.clips_failed,
            "monitor engine stopped"
        );
        self.stats.clone()
    }

    /// Run one monitoring window if one is due. Returns whether the window
    /// actually ran.
    pub fn run_window(&mut self, stop: &AtomicBool) -> bool {
        let now = self.clock.now_ms();
        if !self.scheduler.try_arm(now) {
            return false;
        }

        if !self.storage.is_ready() {
            self.skip_window(now, EngineError::StorageNotReady);
            return false;
        }
        let mut source = match self.hardware.acquire() {
            Ok(source) => source,
            Err(err) => {
                self.skip_window(now, err);
                return false;
            }
        };

        let started_at = self.clock.now_ms();
        self.scheduler.mark_window_start(started_at);
        self.ring.reset();
        self.stats.windows_started += 1;
        let device = self.hardware.describe();
        tracing::info!(
            window_start = started_at,
            window_ms = self.config.window_ms,
            device = %device,
            "monitoring window started"
        );
        self.emit(MonitorEvent::WindowStarted {
            at_ms: started_at,
            device,
        });

        let saved_before = self.stats.clips_saved;
        while !stop.load(Ordering::Relaxed) && !self.scheduler.window_elapsed(self.clock.now_ms())
        {
            self.scan_once(&mut source);
        }

        // Release the hardware before reporting the window as over.
        drop(source);
        let ended_at = self.clock.now_ms();
        let duration_ms = self.scheduler.disarm(ended_at).unwrap_or_default();
        self.stats.windows_completed += 1;
        let clips_saved = self.stats.clips_saved - saved_before;
        tracing::info!(
            window_end = ended_at,
            duration_ms,
            clips_saved,
            "monitoring window ended"
        );
        self.emit(MonitorEvent::WindowEnded {
            at_ms: ended_at,
            duration_ms,
            clips_saved,
        });
        true
    }

    fn skip_window(&mut self, at_ms: u64, err: EngineError) {
        self.scheduler.stand_down();
        self.stats.windows_skipped += 1;
        match &err {
            EngineError::StorageNotReady => {
                tracing::warn!(storage_not_ready = true, "storage not ready; skipping window");
            }
            _ => {
                tracing::warn!(
                    hardware_acquisition_failed = true,
                    error = %err,
                    "audio hardware unavailable; skipping window"
                );
            }
        }
        self.emit(MonitorEvent::WindowSkipped {
            at_ms,
            reason: err.label(),
            details: err.to_string(),
        });
    }

    fn scan_once(&mut self, source: &mut H::Source) {
        let timeout = self.config.read_timeout();
        match source.read(&mut self.scan, timeout) {
            Ok(0) => self.clock.sleep(self.config.idle_pause()),
            Ok(read) => {
                let chunk = &self.scan[..read.min(self.scan.len())];
                self.ring.write(chunk);
                if self.detector.detect(chunk) {
                    self.handle_event(source);
                }
            }
            Err(err) => {
                self.stats.read_errors += 1;
                tracing::debug!(
                    error = %err,
                    read_errors = self.stats.read_errors,
                    "scan read failed"
                );
                self.clock.sleep(self.config.idle_pause());
            }
        }
    }

    fn handle_event(&mut self, source: &mut H::Source) {
        let at_ms = self.clock.now_ms();
        self.stats.events_detected += 1;
        tracing::info!(
            event_detected = at_ms,
            detector = self.detector.name(),
            "acoustic event detected"
        );
        self.emit(MonitorEvent::EventDetected { at_ms });

        match self.save_clip(source) {
            Ok(saved) => {
                self.stats.clips_saved += 1;
                self.stats.bytes_written += saved.bytes;
                tracing::info!(
                    clip_saved = %saved.path.display(),
                    bytes = saved.bytes,
                    samples = saved.samples,
                    truncated = saved.truncated,
                    "clip saved"
                );
                self.emit(MonitorEvent::ClipSaved {
                    path: saved.path,
                    bytes: saved.bytes,
                    samples: saved.samples,
                    pre_trigger_samples: saved.pre_trigger_samples,
                    truncated: saved.truncated,
                });
                if self.config.clear_after_clip {
                    self.ring.reset();
                }
                self.clock.sleep(self.config.cooldown());
            }
            Err(err) => {
                self.stats.clips_failed += 1;
                tracing::warn!(clip_failed = err.label(), error = %err, "clip not saved");
                self.emit(MonitorEvent::ClipFailed {
                    reason: err.label(),
                    details: err.to_string(),
                });
            }
        }
    }

    fn save_clip(&mut self, source: &mut H::Source) -> Result<SavedClip, EngineError> {
        let clip = self.assembler.assemble(&mut self.ring, source)?;
        let path = self.storage.make_unique_path(
            &self.config.clip_subdir,
            &self.config.clip_prefix,
            CLIP_EXTENSION,
        )?;
        let bytes = wav::write_clip(&path, clip.samples(), &self.format)?;
        Ok(SavedClip {
            path,
            bytes,
            samples: clip.len(),
            pre_trigger_samples: clip.pre_trigger_len(),
            truncated: clip.end() != CaptureEnd::Complete,
        })
    }

    fn emit(&mut self, event: MonitorEvent) {
        let Some(sender) = &self.events else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.stats.events_dropped += 1,
            Err(TrySendError::Disconnected(_)) => self.events = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::scheduler::SchedulerPhase;
    use crate::storage::DirStorage;
    use crate::test_support::{
        files_in, temp_dir, CountingHardware, Fallback, Step, LOUD, QUIET,
    };
    use crossbeam_channel::{bounded, Receiver};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    const RATE: u32 = 8_000;

    fn test_config() -> EngineConfig {
        EngineConfig {
            sample_rate: RATE,
            pre_trigger_secs: 1,
            post_trigger_secs: 1,
            interval_ms: 10_000,
            window_ms: 2_000,
            cooldown_ms: 500,
            arm_on_start: true,
            ..EngineConfig::default()
        }
    }

    fn loud_chunk() -> Step {
        Step::Data(vec![LOUD; 256])
    }

    fn engine_with(
        config: EngineConfig,
        hardware: CountingHardware,
        root: &Path,
        clock: &VirtualClock,
    ) -> (
        MonitorEngine<CountingHardware, DirStorage, VirtualClock>,
        Receiver<MonitorEvent>,
    ) {
        let (tx, rx) = bounded(64);
        let engine = MonitorEngine::new(config, hardware, DirStorage::new(root), clock.clone())
            .unwrap()
            .with_events(tx);
        (engine, rx)
    }

    fn saved_clips(rx: &Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
        rx.try_iter()
            .filter(|event| matches!(event, MonitorEvent::ClipSaved { .. }))
            .collect()
    }

    #[test]
    fn detected_event_is_saved_and_window_runs_to_its_end() {
        let root = temp_dir("engine_saved");
        let clock = VirtualClock::new();
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET))
            .with_script(vec![loud_chunk()]);
        let acquired = hardware.acquired.clone();
        let released = hardware.released.clone();
        let (mut engine, rx) = engine_with(test_config(), hardware, &root, &clock);

        assert!(engine.run_window(&AtomicBool::new(false)));

        let events: Vec<MonitorEvent> = rx.try_iter().collect();
        assert!(matches!(events[0], MonitorEvent::WindowStarted { at_ms: 0, .. }));
        assert!(matches!(events[1], MonitorEvent::EventDetected { .. }));
        let MonitorEvent::ClipSaved {
            path,
            bytes,
            samples,
            pre_trigger_samples,
            truncated,
        } = &events[2]
        else {
            panic!("expected a saved clip, got {:?}", events[2]);
        };
        assert_eq!(*samples, 256 + 8_000);
        assert_eq!(*pre_trigger_samples, 256);
        assert_eq!(*bytes, 44 + 2 * (256 + 8_000));
        assert!(!truncated);
        assert!(path.starts_with(root.join("audio")));
        assert!(matches!(
            events.last(),
            Some(MonitorEvent::WindowEnded { clips_saved: 1, .. })
        ));

        let reader = hound::WavReader::open(path).unwrap();
        assert_eq!(reader.spec().sample_rate, RATE);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 8_256);

        let stats = engine.stats();
        assert_eq!(stats.events_detected, 1);
        assert_eq!(stats.clips_saved, 1);
        assert_eq!(stats.bytes_written, *bytes);
        assert_eq!(stats.windows_completed, 1);
        assert_eq!(engine.scheduler().phase(), SchedulerPhase::Idle);
        assert!(clock.now_ms() >= 2_000);
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn timeout_during_post_trigger_writes_nothing_and_window_continues() {
        let root = temp_dir("engine_timeout");
        let clock = VirtualClock::new();
        let mut script = vec![loud_chunk()];
        script.extend(std::iter::repeat(Step::Empty).take(5));
        script.push(Step::Timeout);
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET))
            .with_script(script);
        let released = hardware.released.clone();
        let (mut engine, rx) = engine_with(test_config(), hardware, &root, &clock);

        assert!(engine.run_window(&AtomicBool::new(false)));

        assert!(files_in(&root.join("audio")).is_empty());
        let events: Vec<MonitorEvent> = rx.try_iter().collect();
        assert!(events.contains(&MonitorEvent::ClipFailed {
            reason: "read_timeout",
            details: EngineError::ReadTimeout.to_string(),
        }));
        assert!(matches!(
            events.last(),
            Some(MonitorEvent::WindowEnded { clips_saved: 0, .. })
        ));
        assert_eq!(engine.stats().clips_failed, 1);
        assert_eq!(engine.stats().clips_saved, 0);
        assert!(clock.now_ms() >= 2_000);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn acquisition_failure_skips_the_cycle_and_stays_idle() {
        let root = temp_dir("engine_acquire");
        let clock = VirtualClock::new();
        let hardware =
            CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET)).failing();
        let (mut engine, rx) = engine_with(test_config(), hardware, &root, &clock);

        assert!(!engine.run_window(&AtomicBool::new(false)));
        assert_eq!(engine.scheduler().phase(), SchedulerPhase::Idle);
        assert_eq!(engine.stats().windows_skipped, 1);
        assert_eq!(engine.stats().windows_started, 0);
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorEvent::WindowSkipped {
                reason: "hardware_acquisition_failure",
                ..
            })
        ));
        // The retry waits for the next interval.
        assert!(!engine.scheduler().is_due(clock.now_ms()));
        assert!(engine.scheduler().is_due(clock.now_ms() + 10_000));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn storage_not_ready_skips_without_touching_hardware() {
        let clock = VirtualClock::new();
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET));
        let acquired = hardware.acquired.clone();
        let missing = std::env::temp_dir().join("fieldmic_engine_missing_storage_root");
        let (mut engine, rx) = engine_with(test_config(), hardware, &missing, &clock);

        assert!(!engine.run_window(&AtomicBool::new(false)));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorEvent::WindowSkipped {
                reason: "storage_not_ready",
                ..
            })
        ));
    }

    #[test]
    fn duty_cycle_runs_one_window_per_interval() {
        let root = temp_dir("engine_cycle");
        let clock = VirtualClock::new();
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET));
        let acquired = hardware.acquired.clone();
        let released = hardware.released.clone();
        let config = EngineConfig {
            arm_on_start: false,
            ..test_config()
        };
        let (mut engine, _rx) = engine_with(config, hardware, &root, &clock);

        let stats = engine.run(&AtomicBool::new(false), 2);

        assert_eq!(stats.windows_completed, 2);
        assert_eq!(stats.windows_skipped, 0);
        assert_eq!(acquired.load(Ordering::SeqCst), 2);
        assert_eq!(released.load(Ordering::SeqCst), 2);
        // First window at one interval, second at two.
        assert!(clock.now_ms() >= 22_000);
        assert!(clock.now_ms() < 30_000);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn raised_stop_flag_ends_run_before_any_window() {
        let root = temp_dir("engine_stop");
        let clock = VirtualClock::new();
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET));
        let (mut engine, _rx) = engine_with(test_config(), hardware, &root, &clock);

        let stats = engine.run(&AtomicBool::new(true), 0);
        assert_eq!(stats, EngineStats::default());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn stop_raised_mid_window_closes_it_early() {
        let root = temp_dir("engine_stop_mid_window");
        let clock = VirtualClock::new();
        let stop = Arc::new(AtomicBool::new(false));
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET))
            .with_script(vec![
                Step::Data(vec![QUIET; 256]),
                Step::Data(vec![QUIET; 256]),
                Step::RaiseStop(Arc::clone(&stop)),
            ]);
        let released = hardware.released.clone();
        let (mut engine, rx) = engine_with(test_config(), hardware, &root, &clock);
        assert_eq!(engine.hardware().describe(), "scripted");
        assert_eq!(engine.storage().root(), root.as_path());
        assert_eq!(engine.scheduler().window_ms(), 2_000);

        assert!(engine.run_window(&stop));

        let ended = rx
            .try_iter()
            .find(|event| matches!(event, MonitorEvent::WindowEnded { .. }));
        let Some(MonitorEvent::WindowEnded { duration_ms, .. }) = ended else {
            panic!("window did not report its end");
        };
        assert!(duration_ms < 2_000, "window ran {duration_ms} ms");
        assert!(clock.now_ms() < 2_000);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(engine.scheduler().phase(), SchedulerPhase::Idle);
        assert_eq!(engine.stats().windows_completed, 1);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn scan_read_errors_are_counted_and_scanning_continues() {
        let root = temp_dir("engine_scan_errors");
        let clock = VirtualClock::new();
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET))
            .with_script(vec![Step::Fail, Step::Timeout, Step::Empty, loud_chunk()]);
        let (mut engine, _rx) = engine_with(test_config(), hardware, &root, &clock);

        assert!(engine.run_window(&AtomicBool::new(false)));
        assert_eq!(engine.stats().read_errors, 2);
        assert_eq!(engine.stats().clips_saved, 1);
        let _ = fs::remove_dir_all(&root);
    }

    fn second_clip_pre_trigger(clear_after_clip: bool) -> usize {
        let root = temp_dir("engine_clear");
        let clock = VirtualClock::new();
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET))
            .with_script(vec![
                loud_chunk(),
                Step::Data(vec![QUIET; 8_000]),
                loud_chunk(),
            ]);
        let config = EngineConfig {
            clear_after_clip,
            window_ms: 5_000,
            ..test_config()
        };
        let (mut engine, rx) = engine_with(config, hardware, &root, &clock);
        engine.run_window(&AtomicBool::new(false));
        let clips = saved_clips(&rx);
        let _ = fs::remove_dir_all(&root);
        assert_eq!(clips.len(), 2);
        match &clips[1] {
            MonitorEvent::ClipSaved {
                pre_trigger_samples,
                ..
            } => *pre_trigger_samples,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn post_trigger_audio_carries_into_next_pre_trigger() {
        assert_eq!(second_clip_pre_trigger(false), 8_000);
    }

    #[test]
    fn clear_after_clip_starts_the_next_pre_trigger_empty() {
        assert_eq!(second_clip_pre_trigger(true), 256);
    }

    #[test]
    fn full_event_channel_drops_instead_of_blocking() {
        let root = temp_dir("engine_drop");
        let clock = VirtualClock::new();
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Constant(QUIET))
            .with_script(vec![loud_chunk()]);
        let (tx, rx) = bounded(1);
        let mut engine =
            MonitorEngine::new(test_config(), hardware, DirStorage::new(&root), clock.clone())
                .unwrap()
                .with_events(tx);

        assert!(engine.run_window(&AtomicBool::new(false)));
        // Started fits; detected, saved and ended do not.
        assert_eq!(engine.stats().events_dropped, 3);
        assert_eq!(rx.len(), 1);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn unreservable_ring_prevents_start() {
        let clock = VirtualClock::new();
        let hardware = CountingHardware::new(clock.clone(), RATE, Fallback::Empty);
        let config = EngineConfig {
            sample_rate: u32::MAX,
            pre_trigger_secs: u32::MAX,
            ..EngineConfig::default()
        };
        let err = MonitorEngine::new(config, hardware, DirStorage::new("/nonexistent"), clock)
            .err()
            .unwrap();
        assert!(err.is_fatal());
        assert!(matches!(err, EngineError::AllocationFailure { .. }));
    }

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let json = serde_json::to_value(MonitorEvent::ClipFailed {
            reason: "io_failure",
            details: "disk full".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "clip_failed");
        assert_eq!(json["reason"], "io_failure");
    }
}
