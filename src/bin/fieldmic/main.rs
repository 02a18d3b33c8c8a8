//! Field node entry point: runs the duty-cycled monitor against the
//! microphone, or replays a recording through the same engine.

mod cli_utils;
mod signals;

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use fieldmic::audio::{AudioHardware, CpalHardware, ReplayHardware};
use fieldmic::config::AppConfig;
use fieldmic::telemetry::init_tracing;
use fieldmic::{
    start_monitor, Clock, DirStorage, EngineStats, MonitorEngine, MonitorJob, SystemClock,
    VirtualClock,
};
use std::time::Duration;

use crate::cli_utils::{inspect_clip, list_input_devices, print_json_line};

const EVENT_POLL: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_tracing(&config);

    if config.list_input_devices {
        list_input_devices();
        return Ok(());
    }
    if let Some(path) = &config.inspect {
        return inspect_clip(path);
    }
    if config.print_config {
        let engine_config = config.engine_config();
        println!("{}", serde_json::to_string_pretty(&engine_config)?);
        return Ok(());
    }
    if config.replay.is_some() {
        return run_replay(&config);
    }
    run_live(&config)
}

fn run_live(config: &AppConfig) -> Result<()> {
    signals::install_stop_handlers()?;
    let engine_config = config.engine_config();
    let hardware = CpalHardware::new(
        config.input_device.clone(),
        engine_config.sample_rate,
        engine_config.chunk_samples,
    );
    let storage = DirStorage::new(&config.storage_root);
    let engine = MonitorEngine::new(engine_config, hardware, storage, SystemClock::new())
        .context("monitor engine failed to start")?;
    let job = start_monitor(engine, config.max_windows)?;
    follow(job, config.quiet)
}

/// One window over a recording on virtual time. The window starts at once
/// and lasts as long as the recording.
fn run_replay(config: &AppConfig) -> Result<()> {
    let Some(path) = &config.replay else {
        return Ok(());
    };
    let clock = VirtualClock::new();
    let (hardware, spec) = ReplayHardware::from_wav(path, clock.clone())?;
    let mut engine_config = config.engine_config();
    engine_config.sample_rate = spec.sample_rate;
    engine_config.arm_on_start = true;
    engine_config.window_ms = hardware.duration_ms().max(1);
    engine_config
        .validate()
        .with_context(|| format!("recording '{}' cannot be replayed", path.display()))?;
    tracing::info!(
        recording = %path.display(),
        device = %hardware.describe(),
        samples = hardware.len(),
        sample_rate = spec.sample_rate,
        bits_per_sample = spec.bits_per_sample,
        "replaying recording"
    );

    let storage = DirStorage::new(&config.storage_root);
    let engine = MonitorEngine::new(engine_config, hardware, storage, clock.clone())
        .context("monitor engine failed to start")?;
    let job = start_monitor(engine, 1)?;
    let result = follow(job, config.quiet);
    tracing::debug!(virtual_ms = clock.now_ms(), "replay finished");
    result
}

/// Print events until the worker exits, forwarding stop signals to it.
fn follow(mut job: MonitorJob, quiet: bool) -> Result<()> {
    loop {
        if signals::stop_requested() {
            job.request_stop();
        }
        match job.events.recv_timeout(EVENT_POLL) {
            Ok(event) => {
                if !quiet {
                    print_json_line(&event)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if job.is_finished() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let stats: EngineStats = job.join()?;
    for event in job.events.try_iter() {
        if !quiet {
            print_json_line(&event)?;
        }
    }
    if !quiet {
        print_json_line(&serde_json::json!({ "event": "summary", "stats": stats }))?;
    }
    Ok(())
}
