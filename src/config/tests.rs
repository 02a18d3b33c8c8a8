use super::defaults::{MAX_CHUNK_SAMPLES, MIN_CHUNK_SAMPLES};
use super::{AppConfig, EngineConfig, LogLevel};
use clap::{CommandFactory, Parser};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_profile(name: &str, body: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = env::temp_dir().join(format!(
        "fieldmic_profile_{name}_{}_{nanos}.yaml",
        std::process::id()
    ));
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn accepts_valid_defaults() {
    let mut cfg = AppConfig::parse_from(["test-app"]);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.engine_config(), EngineConfig::default());
    assert_eq!(cfg.log_level, LogLevel::Info);
}

#[test]
fn default_window_geometry_matches_field_node() {
    let engine = EngineConfig::default();
    assert_eq!(engine.pre_trigger_samples(), 80_000);
    assert_eq!(engine.post_trigger_samples(), 48_000);
    assert_eq!(engine.interval_ms, 2 * 60 * 60 * 1000);
    assert_eq!(engine.window_ms, 60 * 60 * 1000);
    let clip = engine.clip_config();
    assert_eq!(clip.post_trigger_samples, 48_000);
    assert_eq!(clip.chunk_samples, 256);
    let format = engine.wav_format();
    assert_eq!(format.bits_per_sample, 16);
    assert_eq!(format.channels, 1);
}

#[test]
fn rejects_sample_rate_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--sample-rate", "7999"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--sample-rate", "96001"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_sample_rate_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--sample-rate", "8000"]);
    assert!(cfg.validate().is_ok());

    let mut cfg = AppConfig::parse_from(["test-app", "--sample-rate", "96000"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_trigger_seconds_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--pre-trigger-secs", "0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--post-trigger-secs", "61"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_chunk_size_out_of_bounds() {
    let below = (MIN_CHUNK_SAMPLES - 1).to_string();
    let mut cfg = AppConfig::parse_from(["test-app", "--chunk-samples", below.as_str()]);
    assert!(cfg.validate().is_err());

    let above = (MAX_CHUNK_SAMPLES + 1).to_string();
    let mut cfg = AppConfig::parse_from(["test-app", "--chunk-samples", above.as_str()]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_min_hits_larger_than_chunk() {
    let mut cfg = AppConfig::parse_from(["test-app", "--chunk-samples", "64", "--min-hits", "65"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--chunk-samples", "64", "--min-hits", "64"]);
    assert!(cfg.validate().is_ok());

    let mut cfg = AppConfig::parse_from(["test-app", "--min-hits", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_threshold_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--threshold", "0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--threshold", "32768"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_pcm_shift_above_limit() {
    let mut cfg = AppConfig::parse_from(["test-app", "--pcm-shift", "25"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_zero_timing_values() {
    let mut cfg = AppConfig::parse_from(["test-app", "--read-timeout-ms", "0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--empty-read-budget", "0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--interval-ms", "0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--window-ms", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_window_longer_than_interval() {
    let mut cfg = AppConfig::parse_from(["test-app", "--interval-ms", "1000", "--window-ms", "5000"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_unsupported_bit_depth() {
    let mut cfg = AppConfig::parse_from(["test-app", "--bits-per-sample", "8"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--bits-per-sample", "24"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_clip_names_with_separators() {
    let mut cfg = AppConfig::parse_from(["test-app", "--clip-subdir", "../escape"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--clip-prefix", ""]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--clip-subdir", ".."]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_replay_combined_with_inspect() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--replay",
        "in.wav",
        "--inspect",
        "clip.wav",
    ]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_blank_input_device() {
    let mut cfg = AppConfig::parse_from(["test-app", "--input-device", "  "]);
    assert!(cfg.validate().is_err());
}

#[test]
fn profile_overrides_tuning_flags() {
    let path = temp_profile(
        "override",
        "sample_rate: 48000\nthreshold_unused: 1\n",
    );
    let mut cfg = AppConfig::parse_from(["test-app", "--profile", path.to_str().unwrap()]);
    // Unknown keys are rejected.
    assert!(cfg.validate().is_err());
    let _ = fs::remove_file(&path);

    let path = temp_profile(
        "partial",
        "sample_rate: 48000\namplitude_threshold: 1200\nclip_prefix: bird\n",
    );
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--sample-rate",
        "22050",
        "--profile",
        path.to_str().unwrap(),
    ]);
    assert!(cfg.validate().is_ok());
    let engine = cfg.engine_config();
    assert_eq!(engine.sample_rate, 48_000);
    assert_eq!(engine.amplitude_threshold, 1_200);
    assert_eq!(engine.clip_prefix, "bird");
    assert_eq!(engine.min_hits, EngineConfig::default().min_hits);
    let _ = fs::remove_file(&path);
}

#[test]
fn profile_values_are_validated() {
    let path = temp_profile("invalid", "bits_per_sample: 12\n");
    let mut cfg = AppConfig::parse_from(["test-app", "--profile", path.to_str().unwrap()]);
    assert!(cfg.validate().is_err());
    let _ = fs::remove_file(&path);
}

#[test]
fn missing_profile_is_an_error() {
    let path = env::temp_dir().join("fieldmic_profile_that_does_not_exist.yaml");
    let mut cfg = AppConfig::parse_from(["test-app", "--profile", path.to_str().unwrap()]);
    let err = cfg.validate().unwrap_err();
    assert!(format!("{err:#}").contains("failed to read profile"));
}

#[test]
fn engine_config_serializes_for_print_config() {
    let json = serde_json::to_value(EngineConfig::default()).unwrap();
    assert_eq!(json["sample_rate"], 16_000);
    assert_eq!(json["clip_subdir"], "audio");
    assert_eq!(json["clear_after_clip"], false);
}

#[test]
fn max_windows_help_counts_skipped_cycles() {
    let help = AppConfig::command().render_long_help().to_string();
    assert!(help.contains("monitoring cycles, windows run or skipped"));
}
