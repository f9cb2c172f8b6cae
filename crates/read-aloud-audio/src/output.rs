//! CPAL output stream over an in-memory clip.
//!
//! The stream runs from creation. A shared [`Transport`] gates it: while not playing the
//! callback writes silence and keeps its position, so pause means pause. Reaching the end
//! clears the playing flag and signals the owner once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;
use crossbeam_channel::Sender;

use crate::decode::Clip;

/// Playback position and run flag shared with the audio callback.
#[derive(Debug, Default)]
pub struct Transport {
    playing: AtomicBool,
    /// Next source frame to play.
    frame: AtomicUsize,
}

impl Transport {
    pub fn play(&self) {
        self.playing.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.playing.store(false, Ordering::Release);
    }

    pub fn rewind(&self) {
        self.frame.store(0, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn frame(&self) -> usize {
        self.frame.load(Ordering::Acquire)
    }
}

/// Build an output stream that renders `clip` under `transport`.
///
/// `clip` must already be at the stream's sample rate. `ended` receives one message each
/// time playback runs off the end of the clip.
pub fn build_clip_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    clip: Arc<Clip>,
    transport: Arc<Transport>,
    ended: Sender<()>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build::<f32>(device, config, clip, transport, ended),
        cpal::SampleFormat::I16 => build::<i16>(device, config, clip, transport, ended),
        cpal::SampleFormat::I32 => build::<i32>(device, config, clip, transport, ended),
        cpal::SampleFormat::U16 => build::<u16>(device, config, clip, transport, ended),
        other => Err(anyhow!("unsupported sample format: {other:?}")),
    }
}

fn build<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    clip: Arc<Clip>,
    transport: Arc<Transport>,
    ended: Sender<()>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let out_channels = usize::from(config.channels);
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if !transport.is_playing() {
                data.fill(silence);
                return;
            }
            let start = transport.frame();
            let (written, next) = render(&clip, start, out_channels, data.len() / out_channels, |i, v| {
                data[i] = <T as cpal::Sample>::from_sample::<f32>(v);
            });
            data[written * out_channels..].fill(silence);
            // A concurrent rewind wins over the callback's advance.
            let _ = transport.frame.compare_exchange(
                start,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            if next >= clip.frames() {
                transport.pause();
                let _ = ended.try_send(());
            }
        },
        |err| tracing::warn!("stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

/// Write up to `max_frames` output frames starting at source frame `start`.
///
/// Returns the frames written and the next source frame.
fn render(
    clip: &Clip,
    start: usize,
    out_channels: usize,
    max_frames: usize,
    mut write: impl FnMut(usize, f32),
) -> (usize, usize) {
    let total = clip.frames();
    let count = total.saturating_sub(start).min(max_frames);
    for n in 0..count {
        let base = (start + n) * clip.channels;
        let frame = &clip.samples[base..base + clip.channels];
        for ch in 0..out_channels {
            write(n * out_channels + ch, map_channel(frame, out_channels, ch));
        }
    }
    (count, start + count)
}

/// Mono is duplicated, stereo folds to mono by averaging, other layouts clamp to the
/// last available source channel.
fn map_channel(frame: &[f32], out_channels: usize, ch: usize) -> f32 {
    match (frame.len(), out_channels) {
        (0, _) => 0.0,
        (2, 1) => 0.5 * (frame[0] + frame[1]),
        (n, _) => frame[ch.min(n - 1)],
    }
}
