//! Command-line parsing, deployment profiles, and validation.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use crate::audio::{AmplitudeDetector, ClipConfig, CHANNELS};
use crate::wav::WavFormat;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    DEFAULT_AMPLITUDE_THRESHOLD, DEFAULT_BITS_PER_SAMPLE, DEFAULT_CHUNK_SAMPLES,
    DEFAULT_CLIP_PREFIX, DEFAULT_CLIP_SUBDIR, DEFAULT_COOLDOWN_MS, DEFAULT_EMPTY_READ_BUDGET,
    DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_IDLE_PAUSE_MS, DEFAULT_INTERVAL_MS, DEFAULT_MIN_HITS,
    DEFAULT_PCM_SHIFT, DEFAULT_POST_TRIGGER_SECS, DEFAULT_PRE_TRIGGER_SECS,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_SAMPLE_RATE, DEFAULT_STORAGE_ROOT, DEFAULT_WINDOW_MS,
};

/// CLI options for the field audio node. Validated values keep the engine
/// from starting with a configuration it cannot honor.
#[derive(Debug, Parser, Clone)]
#[command(about = "FieldMic triggered audio capture", author, version)]
pub struct AppConfig {
    /// Mounted storage root; clips land in <root>/<clip-subdir>
    #[arg(long, env = "FIELDMIC_STORAGE_ROOT", default_value = DEFAULT_STORAGE_ROOT)]
    pub storage_root: PathBuf,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Print the header of a clip file as JSON and exit
    #[arg(long, value_name = "WAV")]
    pub inspect: Option<PathBuf>,

    /// Run one monitoring window over a recording instead of the microphone
    #[arg(long, value_name = "WAV")]
    pub replay: Option<PathBuf>,

    /// YAML deployment profile; replaces the tuning flags below
    #[arg(long, env = "FIELDMIC_PROFILE", value_name = "YAML")]
    pub profile: Option<PathBuf>,

    /// Print the effective engine configuration as JSON and exit
    #[arg(long = "print-config", default_value_t = false)]
    pub print_config: bool,

    /// Stop after this many monitoring cycles, windows run or skipped (0 = run forever)
    #[arg(long = "max-windows", default_value_t = 0)]
    pub max_windows: u32,

    /// Do not print monitor events on stdout
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Append JSON trace logs to this file instead of stderr
    #[arg(long = "log-file", env = "FIELDMIC_TRACE_LOG")]
    pub log_file: Option<PathBuf>,

    /// Maximum log level
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Disable all logging (overrides --log-file and --log-level)
    #[arg(long = "no-logs", env = "FIELDMIC_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Source sample rate (Hz)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Audio retained ahead of a detected event (seconds)
    #[arg(long = "pre-trigger-secs", default_value_t = DEFAULT_PRE_TRIGGER_SECS)]
    pub pre_trigger_secs: u32,

    /// Audio captured after a detected event (seconds)
    #[arg(long = "post-trigger-secs", default_value_t = DEFAULT_POST_TRIGGER_SECS)]
    pub post_trigger_secs: u32,

    /// Right shift that normalizes native samples to 16-bit range
    #[arg(long = "pcm-shift", default_value_t = DEFAULT_PCM_SHIFT)]
    pub pcm_shift: u32,

    /// Normalized magnitude a sample must reach to count as a hit
    #[arg(long = "threshold", default_value_t = DEFAULT_AMPLITUDE_THRESHOLD)]
    pub amplitude_threshold: u32,

    /// Hits within one chunk needed to declare an event
    #[arg(long = "min-hits", default_value_t = DEFAULT_MIN_HITS)]
    pub min_hits: usize,

    /// Samples per source read and per detector scan
    #[arg(long = "chunk-samples", default_value_t = DEFAULT_CHUNK_SAMPLES)]
    pub chunk_samples: usize,

    /// Per-read wait budget (milliseconds)
    #[arg(long = "read-timeout-ms", default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    pub read_timeout_ms: u64,

    /// Consecutive empty reads tolerated during post-trigger capture
    #[arg(long = "empty-read-budget", default_value_t = DEFAULT_EMPTY_READ_BUDGET)]
    pub empty_read_budget: u32,

    /// Pause after a saved clip before scanning resumes (milliseconds)
    #[arg(long = "cooldown-ms", default_value_t = DEFAULT_COOLDOWN_MS)]
    pub cooldown_ms: u64,

    /// Pause after an empty or failed scan read (milliseconds)
    #[arg(long = "idle-pause-ms", default_value_t = DEFAULT_IDLE_PAUSE_MS)]
    pub idle_pause_ms: u64,

    /// Time between monitoring window starts (milliseconds)
    #[arg(long = "interval-ms", default_value_t = DEFAULT_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Length of one monitoring window (milliseconds)
    #[arg(long = "window-ms", default_value_t = DEFAULT_WINDOW_MS)]
    pub window_ms: u64,

    /// Output bit depth of clip files (16, 24 or 32)
    #[arg(long = "bits-per-sample", default_value_t = DEFAULT_BITS_PER_SAMPLE)]
    pub bits_per_sample: u16,

    /// Subdirectory of the storage root for clip files
    #[arg(long = "clip-subdir", default_value = DEFAULT_CLIP_SUBDIR)]
    pub clip_subdir: String,

    /// File name prefix for clip files
    #[arg(long = "clip-prefix", default_value = DEFAULT_CLIP_PREFIX)]
    pub clip_prefix: String,

    /// Start the first window immediately instead of after one interval
    #[arg(long = "arm-on-start", default_value_t = false)]
    pub arm_on_start: bool,

    /// Forget retained audio after every saved clip
    #[arg(long = "clear-after-clip", default_value_t = false)]
    pub clear_after_clip: bool,

    /// Monitor events buffered for the host before new ones are dropped
    #[arg(
        long = "event-channel-capacity",
        default_value_t = DEFAULT_EVENT_CHANNEL_CAPACITY
    )]
    pub event_channel_capacity: usize,

    /// Engine configuration loaded from --profile during validation.
    #[arg(skip)]
    pub(crate) profile_config: Option<EngineConfig>,
}

/// Log verbosity accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Tunable parameters of the monitoring engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub pre_trigger_secs: u32,
    pub post_trigger_secs: u32,
    pub pcm_shift: u32,
    pub amplitude_threshold: u32,
    pub min_hits: usize,
    pub chunk_samples: usize,
    pub read_timeout_ms: u64,
    pub empty_read_budget: u32,
    pub cooldown_ms: u64,
    pub idle_pause_ms: u64,
    pub interval_ms: u64,
    pub window_ms: u64,
    pub bits_per_sample: u16,
    pub clip_subdir: String,
    pub clip_prefix: String,
    pub arm_on_start: bool,
    pub clear_after_clip: bool,
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            pre_trigger_secs: DEFAULT_PRE_TRIGGER_SECS,
            post_trigger_secs: DEFAULT_POST_TRIGGER_SECS,
            pcm_shift: DEFAULT_PCM_SHIFT,
            amplitude_threshold: DEFAULT_AMPLITUDE_THRESHOLD,
            min_hits: DEFAULT_MIN_HITS,
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            empty_read_budget: DEFAULT_EMPTY_READ_BUDGET,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            idle_pause_ms: DEFAULT_IDLE_PAUSE_MS,
            interval_ms: DEFAULT_INTERVAL_MS,
            window_ms: DEFAULT_WINDOW_MS,
            bits_per_sample: DEFAULT_BITS_PER_SAMPLE,
            clip_subdir: DEFAULT_CLIP_SUBDIR.to_string(),
            clip_prefix: DEFAULT_CLIP_PREFIX.to_string(),
            arm_on_start: false,
            clear_after_clip: false,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn pre_trigger_samples(&self) -> usize {
        self.sample_rate as usize * self.pre_trigger_secs as usize
    }

    pub fn post_trigger_samples(&self) -> usize {
        self.sample_rate as usize * self.post_trigger_secs as usize
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn idle_pause(&self) -> Duration {
        Duration::from_millis(self.idle_pause_ms)
    }

    pub fn detector(&self) -> AmplitudeDetector {
        AmplitudeDetector::new(self.pcm_shift, self.amplitude_threshold, self.min_hits)
    }

    pub fn clip_config(&self) -> ClipConfig {
        ClipConfig {
            post_trigger_samples: self.post_trigger_samples(),
            chunk_samples: self.chunk_samples,
            read_timeout: self.read_timeout(),
            empty_read_budget: self.empty_read_budget,
        }
    }

    pub fn wav_format(&self) -> WavFormat {
        WavFormat {
            sample_rate: self.sample_rate,
            channels: CHANNELS,
            bits_per_sample: self.bits_per_sample,
            pcm_shift: self.pcm_shift,
        }
    }
}
