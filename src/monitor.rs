//! Dedicated worker thread that owns the monitoring engine.
//! The host only sees the event channel, the stop flag, and the final stats.

use crate::audio::AudioHardware;
use crate::clock::Clock;
use crate::engine::{EngineStats, MonitorEngine, MonitorEvent};
use crate::storage::Storage;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Handle the host uses to follow and stop the worker.
pub struct MonitorJob {
    pub events: Receiver<MonitorEvent>,
    pub handle: Option<thread::JoinHandle<EngineStats>>,
    /// Checked between source reads and at every interval check.
    pub stop_flag: Arc<AtomicBool>,
}

impl MonitorJob {
    /// Ask the worker to stop once the current read or clip write finishes.
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    /// Wait for the worker and collect its counters.
    pub fn join(&mut self) -> Result<EngineStats> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("monitor worker already joined"))?;
        handle
            .join()
            .map_err(|_| anyhow!("monitor worker panicked"))
    }
}

/// Move the engine onto its own thread and start the duty cycle.
///
/// `max_cycles` bounds how many windows are attempted (0 = until stopped).
pub fn start_monitor<H, S, C>(
    engine: MonitorEngine<H, S, C>,
    max_cycles: u32,
) -> Result<MonitorJob>
where
    H: AudioHardware + Send + 'static,
    S: Storage + Send + 'static,
    C: Clock + Send + 'static,
{
    let stop_flag = Arc::new(AtomicBool::new(false));
    let (tx, rx) = bounded(engine.config().event_channel_capacity.max(1));
    let mut engine = engine.with_events(tx);
    let stop_flag_clone = Arc::clone(&stop_flag);

    let handle = thread::Builder::new()
        .name("fieldmic-monitor".to_string())
        .spawn(move || engine.run(&stop_flag_clone, max_cycles))
        .context("failed to spawn monitor worker")?;

    Ok(MonitorJob {
        events: rx,
        handle: Some(handle),
        stop_flag,
    })
}
