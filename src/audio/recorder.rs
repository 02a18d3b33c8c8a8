//! Desktop microphone backend via CPAL.
//!
//! Stands in for the node's I2S microphone: the stream is opened when a
//! monitoring window acquires the hardware and torn down when the window's
//! source is dropped. Every supported sample format is widened to MSB-aligned
//! 32-bit mono so the PCM shift behaves the same as on the field node.

use super::dispatch::{widen_f32, widen_i16, widen_u16, FrameDispatcher};
use super::source::{AudioHardware, SampleSource, SourceError};
use super::Sample;
use crate::error::EngineError;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Frames buffered between the callback thread and the worker.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// How long a started stream may deliver nothing before reads report
/// `Timeout` instead of an empty read.
const DEFAULT_STALL_LIMIT: Duration = Duration::from_secs(1);

/// Input device selection for monitoring windows.
pub struct CpalHardware {
    preferred_device: Option<String>,
    sample_rate: u32,
    frame_samples: usize,
    stall_limit: Duration,
}

impl CpalHardware {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    pub fn new(preferred_device: Option<String>, sample_rate: u32, frame_samples: usize) -> Self {
        Self {
            preferred_device,
            sample_rate,
            frame_samples: frame_samples.max(1),
            stall_limit: DEFAULT_STALL_LIMIT,
        }
    }

    fn open_device(&self) -> Result<cpal::Device, EngineError> {
        let host = cpal::default_host();
        match self.preferred_device.as_deref() {
            Some(name) => {
                let mut devices = host
                    .input_devices()
                    .map_err(|err| EngineError::HardwareAcquisition(err.to_string()))?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| {
                        EngineError::HardwareAcquisition(format!("input device '{name}' not found"))
                    })
            }
            None => host.default_input_device().ok_or_else(|| {
                EngineError::HardwareAcquisition("no default input device available".to_string())
            }),
        }
    }

    /// Pick a supported configuration that runs at the engine's sample rate,
    /// preferring mono.
    fn pick_config(
        &self,
        device: &cpal::Device,
    ) -> Result<(StreamConfig, SampleFormat), EngineError> {
        let rate = SampleRate(self.sample_rate);
        let ranges = device
            .supported_input_configs()
            .map_err(|err| EngineError::HardwareAcquisition(err.to_string()))?;
        let mut best: Option<cpal::SupportedStreamConfigRange> = None;
        for range in ranges {
            if range.min_sample_rate() > rate || range.max_sample_rate() < rate {
                continue;
            }
            if !matches!(
                range.sample_format(),
                SampleFormat::I16 | SampleFormat::U16 | SampleFormat::I32 | SampleFormat::F32
            ) {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => range.channels() < current.channels(),
            };
            if better {
                best = Some(range);
            }
        }
        let range = best.ok_or_else(|| {
            EngineError::HardwareAcquisition(format!(
                "device does not support {} Hz capture",
                self.sample_rate
            ))
        })?;
        let supported = range.with_sample_rate(rate);
        let format = supported.sample_format();
        Ok((supported.into(), format))
    }
}

impl AudioHardware for CpalHardware {
    type Source = CpalSource;

    fn acquire(&mut self) -> Result<CpalSource, EngineError> {
        let device = self.open_device()?;
        let (config, format) = self.pick_config(&device)?;
        let channels = usize::from(config.channels.max(1));
        let (sender, receiver) = bounded::<Vec<Sample>>(FRAME_CHANNEL_CAPACITY);
        let dropped = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicBool::new(false));
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            self.frame_samples,
            sender,
            dropped.clone(),
        )));

        let err_flag = failed.clone();
        let err_fn = move |err| {
            tracing::warn!(error = %err, "audio stream error");
            err_flag.store(true, Ordering::Relaxed);
        };

        let build_err = |err: cpal::BuildStreamError| {
            EngineError::HardwareAcquisition(format!("failed to open input stream: {err}"))
        };
        let stream = match format {
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                device
                    .build_input_stream(
                        &config,
                        move |data: &[i16], _| {
                            if let Ok(mut pump) = dispatcher.try_lock() {
                                pump.push(data, channels, widen_i16);
                            } else {
                                dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(build_err)?
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                device
                    .build_input_stream(
                        &config,
                        move |data: &[u16], _| {
                            if let Ok(mut pump) = dispatcher.try_lock() {
                                pump.push(data, channels, widen_u16);
                            } else {
                                dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(build_err)?
            }
            SampleFormat::I32 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                device
                    .build_input_stream(
                        &config,
                        move |data: &[i32], _| {
                            if let Ok(mut pump) = dispatcher.try_lock() {
                                pump.push(data, channels, |sample| sample);
                            } else {
                                dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(build_err)?
            }
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                device
                    .build_input_stream(
                        &config,
                        move |data: &[f32], _| {
                            if let Ok(mut pump) = dispatcher.try_lock() {
                                pump.push(data, channels, widen_f32);
                            } else {
                                dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(build_err)?
            }
            other => {
                return Err(EngineError::HardwareAcquisition(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        };

        stream.play().map_err(|err| {
            EngineError::HardwareAcquisition(format!("failed to start input stream: {err}"))
        })?;

        tracing::debug!(
            format = ?format,
            sample_rate = config.sample_rate.0,
            channels,
            "input stream started"
        );

        Ok(CpalSource {
            stream,
            receiver,
            pending: Vec::new(),
            pending_pos: 0,
            dropped,
            failed,
            last_data: Instant::now(),
            stall_limit: self.stall_limit,
        })
    }

    fn describe(&self) -> String {
        match &self.preferred_device {
            Some(name) => format!("cpal:{name}"),
            None => "cpal:default".to_string(),
        }
    }
}

/// A running input stream. Dropping it stops capture.
pub struct CpalSource {
    stream: cpal::Stream,
    receiver: Receiver<Vec<Sample>>,
    pending: Vec<Sample>,
    pending_pos: usize,
    dropped: Arc<AtomicUsize>,
    failed: Arc<AtomicBool>,
    last_data: Instant,
    stall_limit: Duration,
}

impl CpalSource {
    /// Frames lost because the worker fell behind the callback.
    pub fn frames_dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn drain_pending(&mut self, buf: &mut [Sample]) -> usize {
        let available = &self.pending[self.pending_pos..];
        let take = available.len().min(buf.len());
        buf[..take].copy_from_slice(&available[..take]);
        self.pending_pos += take;
        take
    }
}

impl SampleSource for CpalSource {
    fn read(&mut self, buf: &mut [Sample], timeout: Duration) -> Result<usize, SourceError> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(SourceError::Device("input stream reported an error".to_string()));
        }
        if self.pending_pos < self.pending.len() {
            return Ok(self.drain_pending(buf));
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => {
                self.pending = frame;
                self.pending_pos = 0;
                self.last_data = Instant::now();
                Ok(self.drain_pending(buf))
            }
            Err(RecvTimeoutError::Timeout) => {
                if self.last_data.elapsed() >= self.stall_limit {
                    Err(SourceError::Timeout)
                } else {
                    Ok(0)
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(SourceError::Device("audio stream disconnected".to_string()))
            }
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        if let Err(err) = self.stream.pause() {
            tracing::debug!(error = %err, "failed to pause audio stream");
        }
        let dropped = self.frames_dropped();
        if dropped > 0 {
            tracing::debug!(dropped, "input frames dropped during window");
        }
    }
}
