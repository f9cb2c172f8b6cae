//! Single-slot playback state machine.
//!
//! At most one [`PlayingSlot`] exists. `queue` always stops the current slot before doing
//! anything else, so a second activation of the same URL toggles playback off and any other
//! activation switches tracks. The slot's existence and URL are the only record of which
//! element is active.
//!
//! Phases: `Idle` (no slot) → `Loading` (slot created by `queue`) → `Playing` (after
//! `play`) → `Idle` (after `stop`, natural end, or failure).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};

use read_aloud_types::{ActivationInfo, DeactivateReason, PlaybackPhase, SlotStatus};

use crate::attachment::{self, Attachment};
use crate::config::ReaderConfig;
use crate::document::{Document, ElementId};
use crate::error::ReaderError;
use crate::media::{
    AudioProvider, AudioResource, MediaEvent, MediaEventReceiver, MediaEventSink, SlotEvent,
    SlotId, media_channel,
};

/// Result of [`PlaybackController::queue`].
#[derive(Debug)]
pub enum QueueOutcome {
    /// A new slot was created; the ticket resolves once its resource is ready to play.
    Started(LoadTicket),
    /// The activation matched the slot that was playing; playback stays stopped.
    ToggledOff,
}

impl QueueOutcome {
    pub fn started(&self) -> bool {
        matches!(self, QueueOutcome::Started(_))
    }
}

/// Future resolving when the slot's resource reports `ready-to-play`.
///
/// Resolves to `Err(Load)` on a load error and to `Err(Superseded)` when the slot is
/// stopped before it became ready.
#[derive(Debug)]
pub struct LoadTicket {
    slot: SlotId,
    rx: oneshot::Receiver<Result<(), ReaderError>>,
}

impl LoadTicket {
    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

impl Future for LoadTicket {
    type Output = Result<SlotId, ReaderError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(Ok(()))) => Poll::Ready(Ok(this.slot)),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(err)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ReaderError::Superseded)),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct PlayingSlot {
    id: SlotId,
    url: String,
    element: ElementId,
    resource: Box<dyn AudioResource>,
    phase: PlaybackPhase,
    ready: Option<oneshot::Sender<Result<(), ReaderError>>>,
}

impl PlayingSlot {
    fn info(&self, reason: Option<DeactivateReason>) -> ActivationInfo {
        ActivationInfo {
            element: self.element.0,
            url: self.url.clone(),
            reason,
        }
    }
}

/// Owns the playback slot and every transition of it.
pub struct PlaybackController {
    doc: Arc<dyn Document>,
    provider: Arc<dyn AudioProvider>,
    config: Arc<ReaderConfig>,
    slot: Option<PlayingSlot>,
    next_slot: u64,
    media_tx: mpsc::UnboundedSender<SlotEvent>,
}

impl PlaybackController {
    /// Create an idle controller and the receiver its resources report into.
    ///
    /// Events from the receiver must be fed back through [`Self::handle_media_event`].
    pub fn new(
        doc: Arc<dyn Document>,
        provider: Arc<dyn AudioProvider>,
        config: Arc<ReaderConfig>,
    ) -> (Self, MediaEventReceiver) {
        let (media_tx, media_rx) = media_channel();
        let controller = Self {
            doc,
            provider,
            config,
            slot: None,
            next_slot: 1,
            media_tx,
        };
        (controller, media_rx)
    }

    pub fn config(&self) -> &Arc<ReaderConfig> {
        &self.config
    }

    /// Replace the configuration. Callers stop playback first so the old classes are
    /// stripped with the config that applied them.
    pub fn set_config(&mut self, config: Arc<ReaderConfig>) {
        self.config = config;
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.slot
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(PlaybackPhase::Idle)
    }

    pub fn current_slot(&self) -> Option<SlotId> {
        self.slot.as_ref().map(|s| s.id)
    }

    pub fn status(&self) -> SlotStatus {
        match &self.slot {
            Some(slot) => SlotStatus {
                phase: slot.phase,
                url: Some(slot.url.clone()),
                element: Some(slot.element.0),
            },
            None => SlotStatus::idle(),
        }
    }

    /// Stop whatever is active, then start loading `target` unless it was the slot just
    /// stopped.
    pub fn queue(&mut self, target: &Attachment) -> Result<QueueOutcome, ReaderError> {
        let url = attachment::audio_url(self.doc.as_ref(), &self.config, target)?;

        let toggled = match self.slot.as_ref() {
            Some(slot) => {
                let toggled = slot.url == url;
                let reason = if toggled {
                    DeactivateReason::Stopped
                } else {
                    DeactivateReason::Superseded
                };
                if let Err(err) = self.teardown(reason) {
                    tracing::warn!(error = %err, "cleanup of previous slot failed");
                }
                toggled
            }
            None => false,
        };
        if toggled {
            tracing::info!(%url, element = %target.element(), "playback toggled off");
            return Ok(QueueOutcome::ToggledOff);
        }

        let id = SlotId(self.next_slot);
        self.next_slot += 1;
        let sink = MediaEventSink::new(id, self.media_tx.clone());
        let resource = self
            .provider
            .open(&url, sink)
            .map_err(|e| ReaderError::Load(e.to_string()))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        self.slot = Some(PlayingSlot {
            id,
            url: url.clone(),
            element: target.element(),
            resource,
            phase: PlaybackPhase::Loading,
            ready: Some(ready_tx),
        });
        tracing::info!(slot = %id, %url, element = %target.element(), "slot loading");
        Ok(QueueOutcome::Started(LoadTicket { slot: id, rx: ready_rx }))
    }

    /// Start the slot's resource and mark its element active.
    ///
    /// Any failure clears the slot before the error is returned.
    pub fn play(&mut self) -> Result<(), ReaderError> {
        if self.slot.is_none() {
            return Err(ReaderError::Playback("no queued slot to play".to_string()));
        }
        if let Err(err) = self.issue_play() {
            tracing::warn!(error = %err, "playback failed to start");
            if let Err(cleanup) = self.teardown(DeactivateReason::Failed) {
                tracing::debug!(error = %cleanup, "cleanup after failed start");
            }
            return Err(err);
        }
        if let Some(slot) = &self.slot {
            tracing::info!(slot = %slot.id, url = %slot.url, "playing");
            self.config.notify_activate(&slot.info(None));
        }
        Ok(())
    }

    fn issue_play(&mut self) -> Result<(), ReaderError> {
        let doc = self.doc.clone();
        let config = self.config.clone();
        let slot = self
            .slot
            .as_mut()
            .ok_or_else(|| ReaderError::Playback("no queued slot to play".to_string()))?;

        slot.resource.start()?;
        doc.add_class(slot.element, &config.active_class)?;
        for icon in doc.find(slot.element, &config.icon_selector) {
            doc.remove_class(icon, &config.icon_inactive_class)?;
            doc.add_class(icon, &config.icon_active_class)?;
        }
        slot.phase = PlaybackPhase::Playing;
        Ok(())
    }

    /// Stop and release the active slot. A no-op when idle.
    pub fn stop(&mut self) -> Result<(), ReaderError> {
        self.teardown(DeactivateReason::Stopped)
    }

    /// Apply an event reported by a slot's resource. Events from stopped slots are dropped.
    pub fn handle_media_event(&mut self, event: SlotEvent) {
        let Some(slot) = self.slot.as_mut().filter(|s| s.id == event.slot) else {
            tracing::debug!(slot = %event.slot, event = ?event.event, "dropping stale media event");
            return;
        };

        match event.event {
            MediaEvent::ReadyToPlay => {
                tracing::debug!(slot = %slot.id, "ready to play");
                if let Some(ready) = slot.ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            MediaEvent::LoadError(msg) => {
                tracing::warn!(slot = %slot.id, url = %slot.url, error = %msg, "audio failed to load");
                let ready = slot.ready.take();
                if let Err(err) = self.teardown(DeactivateReason::Failed) {
                    tracing::debug!(error = %err, "cleanup after load error");
                }
                if let Some(ready) = ready {
                    let _ = ready.send(Err(ReaderError::Load(msg)));
                }
            }
            MediaEvent::Ended => {
                if slot.phase != PlaybackPhase::Playing {
                    tracing::debug!(slot = %slot.id, "ignoring end before playback started");
                    return;
                }
                tracing::info!(slot = %slot.id, url = %slot.url, "playback ended");
                if let Err(err) = self.teardown(DeactivateReason::Ended) {
                    tracing::warn!(error = %err, "cleanup after natural end failed");
                }
            }
        }
    }

    /// Clear the slot, then undo every side effect of it. All steps run; the first failure
    /// is returned.
    fn teardown(&mut self, reason: DeactivateReason) -> Result<(), ReaderError> {
        let Some(slot) = self.slot.take() else {
            return Ok(());
        };
        let info = slot.info(Some(reason));
        let PlayingSlot {
            id,
            element,
            mut resource,
            phase,
            ..
        } = slot;

        let mut first_err: Option<ReaderError> = None;
        let mut record = |result: Result<(), ReaderError>| {
            if let Err(err) = result {
                tracing::debug!(slot = %id, error = %err, "cleanup step failed");
                first_err.get_or_insert(err);
            }
        };

        record(resource.pause().map_err(ReaderError::from));
        record(resource.reset_position().map_err(ReaderError::from));
        drop(resource);

        let doc = self.doc.as_ref();
        let config = self.config.as_ref();
        record(doc.remove_class(element, &config.active_class).map_err(ReaderError::from));
        for icon in doc.find(element, &config.icon_selector) {
            record(doc.remove_class(icon, &config.icon_active_class).map_err(ReaderError::from));
            record(doc.add_class(icon, &config.icon_inactive_class).map_err(ReaderError::from));
        }

        tracing::info!(slot = %id, url = %info.url, ?reason, "slot stopped");
        if phase == PlaybackPhase::Playing {
            config.notify_deactivate(&info);
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::debug!(error = %err, "stop on drop failed");
        }
    }
}
