//! Field defaults. Timing values match the node firmware's audio task.

pub const DEFAULT_STORAGE_ROOT: &str = "/sdcard";
pub const DEFAULT_SAMPLE_RATE: u32 = crate::audio::DEFAULT_SAMPLE_RATE;
pub const DEFAULT_PRE_TRIGGER_SECS: u32 = 5;
pub const DEFAULT_POST_TRIGGER_SECS: u32 = 3;
/// The SPH0645 delivers 18 significant bits MSB-aligned in a 32-bit slot.
pub const DEFAULT_PCM_SHIFT: u32 = 14;
pub const DEFAULT_AMPLITUDE_THRESHOLD: u32 = 3_000;
pub const DEFAULT_MIN_HITS: usize = 8;
pub const DEFAULT_CHUNK_SAMPLES: usize = 256;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 20;
pub const DEFAULT_EMPTY_READ_BUDGET: u32 = 20;
pub const DEFAULT_COOLDOWN_MS: u64 = 2_000;
pub const DEFAULT_IDLE_PAUSE_MS: u64 = 10;
pub const DEFAULT_INTERVAL_MS: u64 = 2 * 60 * 60 * 1000;
pub const DEFAULT_WINDOW_MS: u64 = 60 * 60 * 1000;
pub const DEFAULT_BITS_PER_SAMPLE: u16 = 16;
pub const DEFAULT_CLIP_SUBDIR: &str = "audio";
pub const DEFAULT_CLIP_PREFIX: &str = "audio";
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

pub(super) const MIN_SAMPLE_RATE: u32 = 8_000;
pub(super) const MAX_SAMPLE_RATE: u32 = 96_000;
pub(super) const MAX_TRIGGER_SECS: u32 = 60;
pub(super) const MAX_PCM_SHIFT: u32 = 24;
pub(super) const MAX_AMPLITUDE_THRESHOLD: u32 = 32_767;
pub(super) const MIN_CHUNK_SAMPLES: usize = 16;
pub(super) const MAX_CHUNK_SAMPLES: usize = 8_192;
pub(super) const MAX_READ_TIMEOUT_MS: u64 = 1_000;
pub(super) const MAX_EMPTY_READ_BUDGET: u32 = 1_000;
pub(super) const MAX_COOLDOWN_MS: u64 = 10 * 60 * 1000;
pub(super) const MAX_IDLE_PAUSE_MS: u64 = 1_000;
pub(super) const MIN_EVENT_CHANNEL_CAPACITY: usize = 1;
pub(super) const MAX_EVENT_CHANNEL_CAPACITY: usize = 4_096;
