use anyhow::{Context, Result};
use fieldmic::audio::CpalHardware;
use fieldmic::wav::{WavHeader, HEADER_LEN};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

pub(crate) fn list_input_devices() {
    // FIELDMIC_TEST_DEVICES stands in for the host's devices in tests.
    let devices = if let Ok(raw) = std::env::var("FIELDMIC_TEST_DEVICES") {
        parse_device_list(&raw)
    } else {
        CpalHardware::list_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
}

fn parse_device_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[derive(Serialize)]
struct ClipReport<'a> {
    path: String,
    file_bytes: u64,
    sample_count: u32,
    duration_ms: u64,
    #[serde(flatten)]
    header: &'a WavHeader,
}

pub(crate) fn inspect_clip(path: &Path) -> Result<()> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
    let file_bytes = file
        .metadata()
        .with_context(|| format!("failed to stat '{}'", path.display()))?
        .len();
    let mut raw = [0u8; HEADER_LEN];
    file.read_exact(&mut raw)
        .with_context(|| format!("'{}' is shorter than a clip header", path.display()))?;
    let header = WavHeader::parse(&raw)
        .with_context(|| format!("'{}' is not a canonical PCM clip", path.display()))?;
    let sample_count = header.sample_count();
    let duration_ms = if header.sample_rate == 0 {
        0
    } else {
        u64::from(sample_count) * 1000 / u64::from(header.sample_rate)
    };
    let report = ClipReport {
        path: path.display().to_string(),
        file_bytes,
        sample_count,
        duration_ms,
        header: &header,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub(crate) fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}
