//! Activation dispatch: input filtering, target resolution and the queue → play chain.
//!
//! This is the only place where playback errors are swallowed. Every failure is logged and
//! turned into an [`ActivationOutcome`], so a bad activation never escapes the input handler.

use crate::attachment::AttachmentRegistry;
use crate::controller::{LoadTicket, PlaybackController, QueueOutcome};
use crate::document::{Document, ElementId};
use crate::error::ReaderError;
use crate::media::SlotId;

/// Activation-class input event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Click,
    TouchStart,
    TouchEnd,
}

/// Raw input event as delivered by the host's delegated listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: InputKind,
    pub target: ElementId,
    /// Contact points still reported by the event; `None` for pointer input.
    pub touches: Option<usize>,
}

impl InputEvent {
    pub fn click(target: ElementId) -> Self {
        Self {
            kind: InputKind::Click,
            target,
            touches: None,
        }
    }

    pub fn touch_start(target: ElementId, touches: usize) -> Self {
        Self {
            kind: InputKind::TouchStart,
            target,
            touches: Some(touches),
        }
    }

    pub fn touch_end(target: ElementId, touches: usize) -> Self {
        Self {
            kind: InputKind::TouchEnd,
            target,
            touches: Some(touches),
        }
    }

    /// Multi-touch gestures and touch-ends with residual contacts are not activations.
    pub fn is_deliberate(&self) -> bool {
        match self.touches {
            Some(n) if n > 1 => false,
            Some(n) if self.kind == InputKind::TouchEnd && n > 0 => false,
            _ => true,
        }
    }
}

/// What an activation led to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Dropped by the input filter; no state changed.
    Filtered,
    /// Target is outside every attachment.
    Ignored,
    /// The active slot was stopped and nothing new started.
    ToggledOff,
    /// A new slot is loading; playback starts when it is ready.
    Loading(SlotId),
    /// The chained `play` ran for this slot.
    Playing(SlotId),
    /// Queue or play failed; the error has been logged.
    Rejected,
}

#[derive(Debug, Default)]
pub struct ActivationDispatcher {
    pending: Option<LoadTicket>,
}

impl ActivationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot waiting for its resource to become ready, if any.
    pub fn pending_slot(&self) -> Option<SlotId> {
        self.pending.as_ref().map(LoadTicket::slot)
    }

    /// Filter `event`, resolve its attachment and queue it.
    pub fn dispatch(
        &mut self,
        doc: &dyn Document,
        registry: &AttachmentRegistry,
        controller: &mut PlaybackController,
        event: &InputEvent,
    ) -> ActivationOutcome {
        if !event.is_deliberate() {
            tracing::debug!(kind = ?event.kind, touches = ?event.touches, "input filtered");
            return ActivationOutcome::Filtered;
        }

        let config = controller.config().clone();
        let Some(el) = doc.closest(event.target, &config.selector) else {
            tracing::trace!(element = %event.target, "input outside attachments");
            return ActivationOutcome::Ignored;
        };

        let queued = registry
            .attachment(doc, &config, el)
            .and_then(|att| controller.queue(&att));
        match queued {
            Ok(QueueOutcome::ToggledOff) => {
                self.pending = None;
                ActivationOutcome::ToggledOff
            }
            Ok(QueueOutcome::Started(ticket)) => {
                let slot = ticket.slot();
                self.pending = Some(ticket);
                ActivationOutcome::Loading(slot)
            }
            Err(err) => {
                tracing::warn!(element = %el, error = %err, "activation rejected");
                ActivationOutcome::Rejected
            }
        }
    }

    /// Wait for the pending slot's load to settle. Never resolves while nothing is pending.
    ///
    /// Cancel safe: the ticket stays pending if this future is dropped.
    pub async fn ready(&mut self) -> Result<SlotId, ReaderError> {
        let result = match self.pending.as_mut() {
            Some(ticket) => ticket.await,
            None => std::future::pending().await,
        };
        self.pending = None;
        result
    }

    /// Continue the chain once [`Self::ready`] resolved: play if the slot is still current.
    pub fn resume(
        &mut self,
        controller: &mut PlaybackController,
        ready: Result<SlotId, ReaderError>,
    ) -> ActivationOutcome {
        match ready {
            Ok(slot) if controller.current_slot() == Some(slot) => match controller.play() {
                Ok(()) => ActivationOutcome::Playing(slot),
                Err(err) => {
                    tracing::warn!(%slot, error = %err, "activation failed to play");
                    ActivationOutcome::Rejected
                }
            },
            Ok(slot) => {
                tracing::debug!(%slot, "ready slot is no longer current");
                ActivationOutcome::Ignored
            }
            Err(ReaderError::Superseded) => {
                tracing::debug!("pending load superseded");
                ActivationOutcome::Ignored
            }
            Err(err) => {
                tracing::warn!(error = %err, "activation failed to load");
                ActivationOutcome::Rejected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use read_aloud_types::PlaybackPhase;

    use crate::config::ReaderOptions;
    use crate::document::MemoryDocument;
    use crate::media::testing::ScriptedProvider;
    use crate::media::{MediaEvent, MediaEventReceiver};

    struct Fixture {
        doc: Arc<MemoryDocument>,
        provider: ScriptedProvider,
        registry: AttachmentRegistry,
        controller: PlaybackController,
        media_rx: MediaEventReceiver,
        dispatcher: ActivationDispatcher,
        a: ElementId,
        b: ElementId,
    }

    impl Fixture {
        fn new() -> Self {
            let doc = Arc::new(MemoryDocument::new());
            let a = doc.append(doc.root(), "p").unwrap();
            doc.add_class(a, "audio-attach-paragraph").unwrap();
            doc.set_attr(a, "data-audio-url", "a.mp3").unwrap();
            let b = doc.append(doc.root(), "p").unwrap();
            doc.add_class(b, "audio-attach-paragraph").unwrap();
            doc.set_attr(b, "data-audio-url", "b.mp3").unwrap();

            let config = Arc::new(ReaderOptions::default().resolve().unwrap());
            let registry = AttachmentRegistry::new();
            registry.refresh(doc.as_ref(), &config).unwrap();
            let provider = ScriptedProvider::new();
            let (controller, media_rx) =
                PlaybackController::new(doc.clone(), Arc::new(provider.clone()), config);
            Self {
                doc,
                provider,
                registry,
                controller,
                media_rx,
                dispatcher: ActivationDispatcher::new(),
                a,
                b,
            }
        }

        fn dispatch(&mut self, event: InputEvent) -> ActivationOutcome {
            self.dispatcher
                .dispatch(self.doc.as_ref(), &self.registry, &mut self.controller, &event)
        }

        async fn ready(&mut self, url: &str) -> ActivationOutcome {
            self.provider.emit(url, MediaEvent::ReadyToPlay);
            while let Ok(event) = self.media_rx.try_recv() {
                self.controller.handle_media_event(event);
            }
            let ready = self.dispatcher.ready().await;
            self.dispatcher.resume(&mut self.controller, ready)
        }
    }

    #[test]
    fn filter_rules() {
        let el = ElementId(1);
        assert!(InputEvent::click(el).is_deliberate());
        assert!(InputEvent::touch_start(el, 1).is_deliberate());
        assert!(!InputEvent::touch_start(el, 2).is_deliberate());
        assert!(InputEvent::touch_end(el, 0).is_deliberate());
        assert!(!InputEvent::touch_end(el, 1).is_deliberate());
    }

    #[test]
    fn multi_touch_changes_nothing() {
        let mut fx = Fixture::new();
        let before = fx.doc.render();
        let a = fx.a;

        assert_eq!(fx.dispatch(InputEvent::touch_start(a, 2)), ActivationOutcome::Filtered);
        assert_eq!(fx.dispatch(InputEvent::touch_end(a, 1)), ActivationOutcome::Filtered);

        assert_eq!(fx.controller.phase(), PlaybackPhase::Idle);
        assert!(fx.dispatcher.pending_slot().is_none());
        assert!(fx.provider.log().is_empty());
        assert_eq!(fx.doc.render(), before);
    }

    #[tokio::test]
    async fn click_queues_then_plays_when_ready() {
        let mut fx = Fixture::new();
        let a = fx.a;
        let ActivationOutcome::Loading(slot) = fx.dispatch(InputEvent::click(a)) else {
            panic!("expected loading");
        };
        assert_eq!(fx.dispatcher.pending_slot(), Some(slot));

        assert_eq!(fx.ready("a.mp3").await, ActivationOutcome::Playing(slot));
        assert_eq!(fx.controller.phase(), PlaybackPhase::Playing);
        assert!(fx.doc.has_class(a, "audio-attach-active"));
        assert!(fx.dispatcher.pending_slot().is_none());
    }

    #[tokio::test]
    async fn click_on_icon_resolves_to_attachment() {
        let mut fx = Fixture::new();
        let icon = fx.doc.children(fx.a)[0];
        assert!(matches!(
            fx.dispatch(InputEvent::click(icon)),
            ActivationOutcome::Loading(_)
        ));
        assert_eq!(fx.controller.status().element, Some(fx.a.0));
    }

    #[test]
    fn click_outside_attachments_is_ignored() {
        let mut fx = Fixture::new();
        let root = fx.doc.root();
        assert_eq!(fx.dispatch(InputEvent::click(root)), ActivationOutcome::Ignored);
    }

    #[test]
    fn unmarked_match_is_rejected_without_escaping() {
        let mut fx = Fixture::new();
        let late = fx.doc.append(fx.doc.root(), "p").unwrap();
        fx.doc.add_class(late, "audio-attach-paragraph").unwrap();
        fx.doc.set_attr(late, "data-audio-url", "c.mp3").unwrap();

        assert_eq!(fx.dispatch(InputEvent::click(late)), ActivationOutcome::Rejected);
        assert!(fx.provider.log().is_empty());
    }

    #[tokio::test]
    async fn second_click_toggles_off() {
        let mut fx = Fixture::new();
        let a = fx.a;
        fx.dispatch(InputEvent::click(a));
        fx.ready("a.mp3").await;

        assert_eq!(fx.dispatch(InputEvent::click(a)), ActivationOutcome::ToggledOff);
        assert_eq!(fx.controller.phase(), PlaybackPhase::Idle);
        assert!(!fx.doc.has_class(a, "audio-attach-active"));
    }

    #[tokio::test]
    async fn switching_while_loading_drops_old_continuation() {
        let mut fx = Fixture::new();
        let (a, b) = (fx.a, fx.b);
        fx.dispatch(InputEvent::click(a));
        let ActivationOutcome::Loading(slot_b) = fx.dispatch(InputEvent::click(b)) else {
            panic!("expected loading");
        };

        assert_eq!(fx.ready("b.mp3").await, ActivationOutcome::Playing(slot_b));
        assert!(!fx.doc.has_class(a, "audio-attach-active"));
        assert!(fx.doc.has_class(b, "audio-attach-active"));
        assert_eq!(fx.provider.live(), 1);
    }

    #[tokio::test]
    async fn play_failure_is_reported_not_raised() {
        let mut fx = Fixture::new();
        fx.provider.fail_start("a.mp3");
        let a = fx.a;
        fx.dispatch(InputEvent::click(a));

        assert_eq!(fx.ready("a.mp3").await, ActivationOutcome::Rejected);
        assert_eq!(fx.controller.phase(), PlaybackPhase::Idle);
    }

    #[tokio::test]
    async fn load_failure_is_reported_not_raised() {
        let mut fx = Fixture::new();
        let a = fx.a;
        fx.dispatch(InputEvent::click(a));
        fx.provider
            .emit("a.mp3", MediaEvent::LoadError("corrupt".to_string()));
        while let Ok(event) = fx.media_rx.try_recv() {
            fx.controller.handle_media_event(event);
        }
        let ready = fx.dispatcher.ready().await;
        assert_eq!(
            fx.dispatcher.resume(&mut fx.controller, ready),
            ActivationOutcome::Rejected
        );
    }
}
