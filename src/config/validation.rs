use super::defaults::{
    MAX_AMPLITUDE_THRESHOLD, MAX_CHUNK_SAMPLES, MAX_COOLDOWN_MS, MAX_EMPTY_READ_BUDGET,
    MAX_EVENT_CHANNEL_CAPACITY, MAX_IDLE_PAUSE_MS, MAX_PCM_SHIFT, MAX_READ_TIMEOUT_MS,
    MAX_SAMPLE_RATE, MAX_TRIGGER_SECS, MIN_CHUNK_SAMPLES, MIN_EVENT_CHANNEL_CAPACITY,
    MIN_SAMPLE_RATE,
};
use super::{AppConfig, EngineConfig};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::{fs, path::Path};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Load the deployment profile, if any, and check the effective values.
    pub fn validate(&mut self) -> Result<()> {
        self.profile_config = match &self.profile {
            Some(path) => Some(load_profile(path)?),
            None => None,
        };
        self.engine_config().validate()?;

        if self.replay.is_some() && self.inspect.is_some() {
            bail!("--replay and --inspect cannot be combined");
        }
        if let Some(device) = &self.input_device {
            if device.trim().is_empty() || device.chars().any(char::is_control) {
                bail!("--input-device must be a non-empty name without control characters");
            }
        }
        if self.storage_root.as_os_str().is_empty() {
            bail!("--storage-root cannot be empty");
        }
        Ok(())
    }

    /// Snapshot the engine settings: the profile when one was loaded,
    /// otherwise the CLI tuning flags.
    pub fn engine_config(&self) -> EngineConfig {
        if let Some(profile) = &self.profile_config {
            return profile.clone();
        }
        EngineConfig {
            sample_rate: self.sample_rate,
            pre_trigger_secs: self.pre_trigger_secs,
            post_trigger_secs: self.post_trigger_secs,
            pcm_shift: self.pcm_shift,
            amplitude_threshold: self.amplitude_threshold,
            min_hits: self.min_hits,
            chunk_samples: self.chunk_samples,
            read_timeout_ms: self.read_timeout_ms,
            empty_read_budget: self.empty_read_budget,
            cooldown_ms: self.cooldown_ms,
            idle_pause_ms: self.idle_pause_ms,
            interval_ms: self.interval_ms,
            window_ms: self.window_ms,
            bits_per_sample: self.bits_per_sample,
            clip_subdir: self.clip_subdir.clone(),
            clip_prefix: self.clip_prefix.clone(),
            arm_on_start: self.arm_on_start,
            clear_after_clip: self.clear_after_clip,
            event_channel_capacity: self.event_channel_capacity,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            bail!(
                "sample rate must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE} Hz, got {}",
                self.sample_rate
            );
        }
        if !(1..=MAX_TRIGGER_SECS).contains(&self.pre_trigger_secs) {
            bail!(
                "pre-trigger must be between 1 and {MAX_TRIGGER_SECS} seconds, got {}",
                self.pre_trigger_secs
            );
        }
        if !(1..=MAX_TRIGGER_SECS).contains(&self.post_trigger_secs) {
            bail!(
                "post-trigger must be between 1 and {MAX_TRIGGER_SECS} seconds, got {}",
                self.post_trigger_secs
            );
        }
        if self.pcm_shift > MAX_PCM_SHIFT {
            bail!(
                "pcm shift must be at most {MAX_PCM_SHIFT}, got {}",
                self.pcm_shift
            );
        }
        if !(1..=MAX_AMPLITUDE_THRESHOLD).contains(&self.amplitude_threshold) {
            bail!(
                "amplitude threshold must be between 1 and {MAX_AMPLITUDE_THRESHOLD}, got {}",
                self.amplitude_threshold
            );
        }
        if !(MIN_CHUNK_SAMPLES..=MAX_CHUNK_SAMPLES).contains(&self.chunk_samples) {
            bail!(
                "chunk size must be between {MIN_CHUNK_SAMPLES} and {MAX_CHUNK_SAMPLES} samples, got {}",
                self.chunk_samples
            );
        }
        if self.min_hits == 0 || self.min_hits > self.chunk_samples {
            bail!(
                "min hits must be between 1 and the chunk size ({}), got {}",
                self.chunk_samples,
                self.min_hits
            );
        }
        if !(1..=MAX_READ_TIMEOUT_MS).contains(&self.read_timeout_ms) {
            bail!(
                "read timeout must be between 1 and {MAX_READ_TIMEOUT_MS} ms, got {}",
                self.read_timeout_ms
            );
        }
        if !(1..=MAX_EMPTY_READ_BUDGET).contains(&self.empty_read_budget) {
            bail!(
                "empty-read budget must be between 1 and {MAX_EMPTY_READ_BUDGET}, got {}",
                self.empty_read_budget
            );
        }
        if self.cooldown_ms > MAX_COOLDOWN_MS {
            bail!(
                "cooldown must be at most {MAX_COOLDOWN_MS} ms, got {}",
                self.cooldown_ms
            );
        }
        if self.idle_pause_ms > MAX_IDLE_PAUSE_MS {
            bail!(
                "idle pause must be at most {MAX_IDLE_PAUSE_MS} ms, got {}",
                self.idle_pause_ms
            );
        }
        if self.interval_ms == 0 {
            bail!("monitoring interval must be non-zero");
        }
        if self.window_ms == 0 {
            bail!("monitoring window must be non-zero");
        }
        if !matches!(self.bits_per_sample, 16 | 24 | 32) {
            bail!(
                "output bit depth must be 16, 24 or 32, got {}",
                self.bits_per_sample
            );
        }
        check_name_component(&self.clip_subdir, "clip subdirectory")?;
        check_name_component(&self.clip_prefix, "clip prefix")?;
        if !(MIN_EVENT_CHANNEL_CAPACITY..=MAX_EVENT_CHANNEL_CAPACITY)
            .contains(&self.event_channel_capacity)
        {
            bail!(
                "event channel capacity must be between {MIN_EVENT_CHANNEL_CAPACITY} and {MAX_EVENT_CHANNEL_CAPACITY}, got {}",
                self.event_channel_capacity
            );
        }
        Ok(())
    }
}

/// Read a YAML deployment profile. Missing keys fall back to defaults.
pub(super) fn load_profile(path: &Path) -> Result<EngineConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read profile '{}'", path.display()))?;
    let config: EngineConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse profile '{}'", path.display()))?;
    Ok(config)
}

fn check_name_component(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{label} cannot be empty");
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        bail!("{label} '{value}' must be a single path component");
    }
    if value.chars().any(char::is_control) {
        bail!("{label} must not contain control characters");
    }
    Ok(())
}
