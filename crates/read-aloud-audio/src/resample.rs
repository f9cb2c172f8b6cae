//! Offline sample-rate conversion of decoded clips with Rubato.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::decode::Clip;

/// Input frames handed to the resampler per call.
const CHUNK_FRAMES: usize = 1024;

/// Convert `clip` to `dst_rate`. Returns the clip unchanged when the rates already match.
pub fn resample_clip(clip: Clip, dst_rate: u32) -> Result<Clip> {
    if clip.rate == dst_rate || clip.frames() == 0 {
        return Ok(clip);
    }
    if clip.rate == 0 || dst_rate == 0 {
        return Err(anyhow!("cannot resample {} Hz to {} Hz", clip.rate, dst_rate));
    }
    let channels = clip.channels;
    let frames = clip.frames();
    let ratio = f64::from(dst_rate) / f64::from(clip.rate);

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let mut resampler = Async::<f32>::new_sinc(
        ratio,
        1.1,
        &params,
        CHUNK_FRAMES,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init: {e}"))?;

    let wanted = target_frames(frames, ratio);
    let delay = resampler.output_delay();
    let capacity = wanted + delay + 2 * resampler.output_frames_max();
    let mut out = vec![0.0f32; capacity * channels];

    let input = InterleavedSlice::new(&clip.samples[..frames * channels], channels, frames)
        .map_err(|e| anyhow!("resampler input: {e}"))?;
    let mut output = InterleavedSlice::new_mut(&mut out, channels, capacity)
        .map_err(|e| anyhow!("resampler output: {e}"))?;

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };
    let mut consumed = 0usize;
    let mut produced = 0usize;
    while produced < wanted + delay {
        let remaining = frames - consumed;
        indexing.input_offset = consumed;
        indexing.output_offset = produced;
        indexing.partial_len = (remaining < CHUNK_FRAMES).then_some(remaining);
        let (nbr_in, nbr_out) = resampler
            .process_into_buffer(&input, &mut output, Some(&indexing))
            .map_err(|e| anyhow!("resample: {e}"))?;
        consumed = (consumed + nbr_in).min(frames);
        produced += nbr_out;
    }

    let start = delay * channels;
    let end = (delay + wanted) * channels;
    let samples = out[start..end].to_vec();
    tracing::debug!(
        from_hz = clip.rate,
        to_hz = dst_rate,
        frames_in = frames,
        frames_out = wanted,
        "resampled clip"
    );
    Ok(Clip {
        rate: dst_rate,
        channels,
        samples,
    })
}

fn target_frames(frames: usize, ratio: f64) -> usize {
    (frames as f64 * ratio).round() as usize
}
