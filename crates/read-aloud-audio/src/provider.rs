//! [`AudioProvider`] backed by a local output device.
//!
//! Every resource owns a worker thread. The worker fetches and decodes the clip, builds a
//! gated CPAL stream and then serves transport commands until the resource is dropped.
//! CPAL streams are not `Send`, so the stream never leaves its worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use read_aloud::{AudioProvider, AudioResource, MediaError, MediaEvent, MediaEventSink};

use crate::decode::decode_clip;
use crate::device::{PREFERRED_RATE, device_name, pick_device, pick_output_config};
use crate::fetch::ClipSource;
use crate::output::{Transport, build_clip_stream};
use crate::resample::resample_clip;

/// Upper bound on waiting for a loaded worker to acknowledge `Start`.
const START_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings for [`DeviceAudioProvider`].
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// Substring of the output device name; default device when `None`.
    pub device: Option<String>,
    /// Directory relative audio URLs are resolved against.
    pub media_root: PathBuf,
    /// Output rate requested from the device.
    pub preferred_rate: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device: None,
            media_root: PathBuf::from("."),
            preferred_rate: PREFERRED_RATE,
        }
    }
}

pub struct DeviceAudioProvider {
    config: Arc<DeviceConfig>,
}

impl DeviceAudioProvider {
    /// Check that the configured device exists and can output audio.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = pick_device(&host, config.device.as_deref())?;
        let output = pick_output_config(&device, config.preferred_rate)?;
        tracing::info!(
            device = device_name(&device).as_deref().unwrap_or("unknown"),
            rate_hz = output.sample_rate(),
            channels = output.channels(),
            format = ?output.sample_format(),
            media_root = %config.media_root.display(),
            "audio output ready"
        );
        Ok(Self {
            config: Arc::new(config),
        })
    }
}

impl AudioProvider for DeviceAudioProvider {
    fn open(&self, url: &str, events: MediaEventSink) -> Result<Box<dyn AudioResource>, MediaError> {
        let source = ClipSource::resolve(url, &self.config.media_root)?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = self.config.clone();
        let settled = Arc::new(AtomicBool::new(false));
        let worker_settled = settled.clone();
        thread::Builder::new()
            .name(format!("read-aloud-{}", events.slot()))
            .spawn(move || worker(source, config, events, rx, worker_settled))
            .map_err(|e| MediaError::Backend(format!("spawn audio worker: {e}")))?;
        Ok(Box::new(DeviceResource {
            url: url.to_string(),
            tx,
            settled,
        }))
    }
}

enum Command {
    Start(Sender<Result<(), MediaError>>),
    Pause,
    Rewind,
}

/// Handle to one worker. Dropping it disconnects the channel and ends the worker.
struct DeviceResource {
    url: String,
    tx: Sender<Command>,
    /// Set by the worker once loading finished, successfully or not.
    settled: Arc<AtomicBool>,
}

impl DeviceResource {
    fn send(&self, command: Command) -> Result<(), MediaError> {
        self.tx.send(command).map_err(|_| MediaError::Closed)
    }
}

impl AudioResource for DeviceResource {
    fn start(&mut self) -> Result<(), MediaError> {
        if !self.settled.load(Ordering::Acquire) {
            return Err(MediaError::Backend("audio is still loading".to_string()));
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.send(Command::Start(ack_tx))?;
        match ack_rx.recv_timeout(START_ACK_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(MediaError::Backend(
                "audio worker did not acknowledge start".to_string(),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(MediaError::Closed),
        }
    }

    fn pause(&mut self) -> Result<(), MediaError> {
        self.send(Command::Pause)
    }

    fn reset_position(&mut self) -> Result<(), MediaError> {
        self.send(Command::Rewind)
    }
}

impl Drop for DeviceResource {
    fn drop(&mut self) {
        tracing::trace!(url = %self.url, "audio resource released");
    }
}

/// Loaded clip plus the stream rendering it.
struct Loaded {
    _stream: cpal::Stream,
    transport: Arc<Transport>,
    ended: Receiver<()>,
}

fn worker(
    source: ClipSource,
    config: Arc<DeviceConfig>,
    events: MediaEventSink,
    commands: Receiver<Command>,
    settled: Arc<AtomicBool>,
) {
    let slot = events.slot();
    let loaded = load(&source, &config);
    settled.store(true, Ordering::Release);
    let loaded = match loaded {
        Ok(loaded) => {
            events.emit(MediaEvent::ReadyToPlay);
            Some(loaded)
        }
        Err(err) => {
            tracing::warn!(%slot, ?source, "audio load failed: {err:#}");
            events.emit(MediaEvent::LoadError(format!("{err:#}")));
            None
        }
    };
    let never = crossbeam_channel::never();
    let ended = loaded.as_ref().map_or(&never, |l| &l.ended);

    loop {
        crossbeam_channel::select! {
            recv(commands) -> command => match command {
                Ok(Command::Start(ack)) => {
                    let result = match &loaded {
                        Some(l) => {
                            l.transport.play();
                            Ok(())
                        }
                        None => Err(MediaError::Backend("audio failed to load".to_string())),
                    };
                    let _ = ack.send(result);
                }
                Ok(Command::Pause) => {
                    if let Some(l) = &loaded {
                        l.transport.pause();
                    }
                }
                Ok(Command::Rewind) => {
                    if let Some(l) = &loaded {
                        l.transport.rewind();
                    }
                }
                Err(_) => break,
            },
            recv(ended) -> _ => {
                tracing::debug!(%slot, "clip ended");
                events.emit(MediaEvent::Ended);
            }
        }
    }
    if let Some(l) = &loaded {
        l.transport.pause();
    }
    tracing::debug!(%slot, "audio worker stopped");
}

fn load(source: &ClipSource, config: &DeviceConfig) -> Result<Loaded> {
    let bytes = source.fetch()?;
    let clip = decode_clip(bytes, source.extension().as_deref()).context("decode audio")?;

    let host = cpal::default_host();
    let device = pick_device(&host, config.device.as_deref())?;
    let output = pick_output_config(&device, config.preferred_rate)?;
    let stream_config: cpal::StreamConfig = output.config();
    let clip = resample_clip(clip, stream_config.sample_rate)?;
    tracing::debug!(
        rate_hz = clip.rate,
        channels = clip.channels,
        duration_ms = clip.duration_ms(),
        "clip decoded"
    );

    let transport = Arc::new(Transport::default());
    let (ended_tx, ended_rx) = crossbeam_channel::bounded(1);
    let stream = build_clip_stream(
        &device,
        &stream_config,
        output.sample_format(),
        Arc::new(clip),
        transport.clone(),
        ended_tx,
    )?;
    stream.play().context("start output stream")?;
    Ok(Loaded {
        _stream: stream,
        transport,
        ended: ended_rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use read_aloud::SlotId;
    use read_aloud::media::media_channel;

    fn offline_provider() -> DeviceAudioProvider {
        DeviceAudioProvider {
            config: Arc::new(DeviceConfig {
                media_root: std::env::temp_dir(),
                ..DeviceConfig::default()
            }),
        }
    }

    #[test]
    fn unsupported_scheme_fails_synchronously() {
        let (tx, _rx) = media_channel();
        let result = offline_provider().open("ftp://host/a.mp3", MediaEventSink::new(SlotId(1), tx));
        assert!(matches!(result, Err(MediaError::UnsupportedUrl(_))));
    }

    #[test]
    fn missing_clip_reports_load_error() {
        let (tx, mut rx) = media_channel();
        let mut resource = offline_provider()
            .open("read-aloud-missing-clip.mp3", MediaEventSink::new(SlotId(7), tx))
            .unwrap();

        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.slot, SlotId(7));
        assert!(matches!(event.event, MediaEvent::LoadError(ref msg) if msg.contains("read-aloud-missing-clip")));

        assert!(resource.start().is_err());
        assert!(resource.pause().is_ok());
        assert!(resource.reset_position().is_ok());
    }

    #[test]
    fn start_while_loading_fails_without_waiting() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut resource = DeviceResource {
            url: "slow.mp3".to_string(),
            tx,
            settled: Arc::new(AtomicBool::new(false)),
        };

        let started = std::time::Instant::now();
        assert!(matches!(resource.start(), Err(MediaError::Backend(_))));
        assert!(started.elapsed() < START_ACK_TIMEOUT);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn start_gives_up_on_a_silent_worker() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut resource = DeviceResource {
            url: "wedged.mp3".to_string(),
            tx,
            settled: Arc::new(AtomicBool::new(true)),
        };
        assert!(matches!(resource.start(), Err(MediaError::Backend(_))));
    }
}
