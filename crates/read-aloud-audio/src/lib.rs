//! Local output device backend for read-aloud playback.
//!
//! Clips are fetched from disk or HTTP, decoded with Symphonia, resampled with Rubato and
//! played through CPAL.

pub mod decode;
pub mod device;
pub mod fetch;
pub mod output;
pub mod provider;
pub mod resample;

pub use provider::{DeviceAudioProvider, DeviceConfig};
