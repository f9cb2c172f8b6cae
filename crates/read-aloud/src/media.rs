//! Audio resource collaborator.
//!
//! An [`AudioProvider`] turns a URL into a playable [`AudioResource`]. Resources report
//! readiness, load failures and natural end through a [`MediaEventSink`]; the events are
//! queued on a channel and handled by the reader loop, never re-entrantly.

use std::fmt;

use tokio::sync::mpsc;

/// Identity of one playback slot. Increases with every slot created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// Events a resource emits back to the core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaEvent {
    /// Enough data is buffered to play through without interruption.
    ReadyToPlay,
    /// The resource cannot become playable.
    LoadError(String),
    /// Playback reached the end of the resource.
    Ended,
}

/// A [`MediaEvent`] tagged with the slot whose resource emitted it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotEvent {
    pub slot: SlotId,
    pub event: MediaEvent,
}

pub type MediaEventReceiver = mpsc::UnboundedReceiver<SlotEvent>;

/// Create the channel media events travel on.
pub fn media_channel() -> (mpsc::UnboundedSender<SlotEvent>, MediaEventReceiver) {
    mpsc::unbounded_channel()
}

/// Handle a resource uses to report events for its slot. Safe to use from any thread.
#[derive(Clone, Debug)]
pub struct MediaEventSink {
    slot: SlotId,
    tx: mpsc::UnboundedSender<SlotEvent>,
}

impl MediaEventSink {
    pub fn new(slot: SlotId, tx: mpsc::UnboundedSender<SlotEvent>) -> Self {
        Self { slot, tx }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Queue `event`; returns `false` once the reader is gone.
    pub fn emit(&self, event: MediaEvent) -> bool {
        self.tx
            .send(SlotEvent {
                slot: self.slot,
                event,
            })
            .is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("unsupported audio url: {0}")]
    UnsupportedUrl(String),
    #[error("audio resource closed")]
    Closed,
    #[error("{0}")]
    Backend(String),
}

/// An owned, playable audio resource. Dropping it releases the underlying playback object.
pub trait AudioResource: Send {
    fn start(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self) -> Result<(), MediaError>;
    fn reset_position(&mut self) -> Result<(), MediaError>;
}

/// Factory for audio resources.
pub trait AudioProvider: Send + Sync {
    /// Construct a resource for `url`. Loading continues in the background and is reported
    /// through `events`.
    fn open(&self, url: &str, events: MediaEventSink) -> Result<Box<dyn AudioResource>, MediaError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider that records every resource call.

    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Script {
        log: Vec<String>,
        sinks: Vec<(String, MediaEventSink)>,
        fail_open: HashSet<String>,
        fail_start: HashSet<String>,
        fail_pause: HashSet<String>,
        ready_on_open: bool,
        live: usize,
    }

    #[derive(Clone, Default)]
    pub(crate) struct ScriptedProvider {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Emit `ReadyToPlay` from inside `open`.
        pub(crate) fn ready_on_open(self) -> Self {
            self.script.lock().unwrap().ready_on_open = true;
            self
        }

        pub(crate) fn fail_open(&self, url: &str) {
            self.script.lock().unwrap().fail_open.insert(url.to_string());
        }

        pub(crate) fn fail_start(&self, url: &str) {
            self.script.lock().unwrap().fail_start.insert(url.to_string());
        }

        pub(crate) fn fail_pause(&self, url: &str) {
            self.script.lock().unwrap().fail_pause.insert(url.to_string());
        }

        pub(crate) fn log(&self) -> Vec<String> {
            self.script.lock().unwrap().log.clone()
        }

        pub(crate) fn clear_log(&self) {
            self.script.lock().unwrap().log.clear();
        }

        /// Number of resources opened and not yet dropped.
        pub(crate) fn live(&self) -> usize {
            self.script.lock().unwrap().live
        }

        /// Emit `event` from the most recent resource opened for `url`.
        pub(crate) fn emit(&self, url: &str, event: MediaEvent) {
            let sink = self
                .script
                .lock()
                .unwrap()
                .sinks
                .iter()
                .rev()
                .find(|(u, _)| u == url)
                .map(|(_, s)| s.clone())
                .expect("no resource opened for url");
            sink.emit(event);
        }
    }

    impl AudioProvider for ScriptedProvider {
        fn open(&self, url: &str, events: MediaEventSink) -> Result<Box<dyn AudioResource>, MediaError> {
            let mut script = self.script.lock().unwrap();
            script.log.push(format!("open {url}"));
            if script.fail_open.contains(url) {
                return Err(MediaError::UnsupportedUrl(url.to_string()));
            }
            if script.ready_on_open {
                events.emit(MediaEvent::ReadyToPlay);
            }
            script.sinks.push((url.to_string(), events));
            script.live += 1;
            Ok(Box::new(ScriptedResource {
                url: url.to_string(),
                script: self.script.clone(),
            }))
        }
    }

    struct ScriptedResource {
        url: String,
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedResource {
        fn call(&self, op: &str, failing: impl Fn(&Script) -> bool) -> Result<(), MediaError> {
            let mut script = self.script.lock().unwrap();
            script.log.push(format!("{op} {}", self.url));
            if failing(&script) {
                return Err(MediaError::Backend(format!("{op} failed")));
            }
            Ok(())
        }
    }

    impl AudioResource for ScriptedResource {
        fn start(&mut self) -> Result<(), MediaError> {
            let url = self.url.clone();
            self.call("start", |s| s.fail_start.contains(&url))
        }

        fn pause(&mut self) -> Result<(), MediaError> {
            let url = self.url.clone();
            self.call("pause", |s| s.fail_pause.contains(&url))
        }

        fn reset_position(&mut self) -> Result<(), MediaError> {
            self.call("reset", |_| false)
        }
    }

    impl Drop for ScriptedResource {
        fn drop(&mut self) {
            let mut script = self.script.lock().unwrap();
            script.log.push(format!("release {}", self.url));
            script.live -= 1;
        }
    }
}
