//! Output device discovery and stream configuration.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Rate preferred when the device supports a range.
pub const PREFERRED_RATE: u32 = 48_000;

/// Default output device, or the first whose name contains `needle` (case-insensitive).
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle.map(str::trim).filter(|n| !n.is_empty()) else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"));
    };
    host.output_devices()
        .context("enumerate output devices")?
        .find(|d| device_name(d).is_some_and(|name| name_matches(&name, needle)))
        .ok_or_else(|| anyhow!("no output device matched {needle:?}"))
}

/// Best output config for speech clips: a rate as close to `preferred` as the device
/// allows, then the most precise sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    preferred: u32,
) -> Result<cpal::SupportedStreamConfig> {
    device
        .supported_output_configs()
        .context("query output configs")?
        .map(|range| {
            let rate = preferred.clamp(range.min_sample_rate(), range.max_sample_rate());
            let rank = (rate.abs_diff(preferred), format_rank(range.sample_format()));
            (rank, range.with_sample_rate(rate))
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, config)| config)
        .ok_or_else(|| anyhow!("device reports no output configs"))
}

/// Device names for `--list-devices`.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>> {
    let devices = host.output_devices().context("enumerate output devices")?;
    Ok(devices.filter_map(|d| device_name(&d)).collect())
}

pub fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

fn format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => u8::MAX,
    }
}

fn name_matches(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(&needle.to_lowercase())
}
