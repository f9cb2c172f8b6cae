//! Reader runtime: owns the registry, controller and dispatcher and runs the event loop.
//!
//! The loop is single-threaded. Load continuations, media events and host commands are
//! taken one at a time, in that priority order, so playback state is never touched
//! concurrently and needs no locking.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use read_aloud_types::SlotStatus;

use crate::attachment::{AttachmentRegistry, RefreshReport};
use crate::config::ReaderOptions;
use crate::controller::PlaybackController;
use crate::dispatcher::{ActivationDispatcher, ActivationOutcome, InputEvent};
use crate::document::Document;
use crate::error::ReaderError;
use crate::media::{AudioProvider, MediaEventReceiver};

/// Commands accepted by the reader loop.
#[derive(Debug)]
pub enum ReaderCommand {
    Activate(InputEvent),
    Refresh(ReaderOptions),
    Stop,
    Status(oneshot::Sender<SlotStatus>),
    Shutdown,
}

/// Read-aloud instance bound to one document.
pub struct ReadAloud {
    doc: Arc<dyn Document>,
    registry: AttachmentRegistry,
    controller: PlaybackController,
    dispatcher: ActivationDispatcher,
    media_rx: MediaEventReceiver,
}

impl ReadAloud {
    /// Resolve `options` and decorate the document.
    pub fn new(
        doc: Arc<dyn Document>,
        provider: Arc<dyn AudioProvider>,
        options: &ReaderOptions,
    ) -> Result<Self, ReaderError> {
        let config = Arc::new(options.resolve()?);
        let registry = AttachmentRegistry::new();
        registry.refresh(doc.as_ref(), &config)?;
        let (controller, media_rx) = PlaybackController::new(doc.clone(), provider, config);
        Ok(Self {
            doc,
            registry,
            controller,
            dispatcher: ActivationDispatcher::new(),
            media_rx,
        })
    }

    /// Stop playback, replace the configuration and decorate new matches.
    ///
    /// Invalid options are rejected before anything changes.
    pub fn refresh(&mut self, options: &ReaderOptions) -> Result<RefreshReport, ReaderError> {
        let config = Arc::new(options.resolve()?);
        self.registry.validate(self.doc.as_ref(), &config)?;
        if let Err(err) = self.controller.stop() {
            tracing::warn!(error = %err, "stop before refresh failed");
        }
        let report = self.registry.refresh(self.doc.as_ref(), &config)?;
        self.controller.set_config(config);
        Ok(report)
    }

    pub fn activate(&mut self, event: &InputEvent) -> ActivationOutcome {
        self.dispatcher
            .dispatch(self.doc.as_ref(), &self.registry, &mut self.controller, event)
    }

    pub fn stop(&mut self) -> Result<(), ReaderError> {
        self.controller.stop()
    }

    pub fn status(&self) -> SlotStatus {
        self.controller.status()
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.doc
    }

    /// Run until `Shutdown` arrives or every command sender is dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ReaderCommand>) {
        tracing::info!("reader loop started");
        loop {
            tokio::select! {
                biased;
                ready = self.dispatcher.ready() => {
                    let outcome = self.dispatcher.resume(&mut self.controller, ready);
                    tracing::debug!(?outcome, "load settled");
                }
                Some(event) = self.media_rx.recv() => {
                    self.controller.handle_media_event(event);
                }
                command = commands.recv() => match command {
                    Some(ReaderCommand::Activate(event)) => {
                        let outcome = self.activate(&event);
                        tracing::debug!(?outcome, "activation handled");
                    }
                    Some(ReaderCommand::Refresh(options)) => match self.refresh(&options) {
                        Ok(report) => tracing::debug!(?report, "refreshed"),
                        Err(err) => tracing::warn!(error = %err, "refresh failed"),
                    },
                    Some(ReaderCommand::Stop) => {
                        if let Err(err) = self.stop() {
                            tracing::warn!(error = %err, "stop failed");
                        }
                    }
                    Some(ReaderCommand::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(ReaderCommand::Shutdown) | None => break,
                },
            }
        }
        if let Err(err) = self.stop() {
            tracing::warn!(error = %err, "stop on shutdown failed");
        }
        tracing::info!("reader loop stopped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("reader loop is not running")]
pub struct ReaderOffline;

/// Cloneable handle to a reader loop running on a tokio task.
#[derive(Clone, Debug)]
pub struct ReaderHandle {
    tx: mpsc::UnboundedSender<ReaderCommand>,
}

impl ReaderHandle {
    /// Spawn `reader`'s loop on the current tokio runtime.
    pub fn spawn(reader: ReadAloud) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(reader.run(rx));
        (Self { tx }, join)
    }

    fn send(&self, command: ReaderCommand) -> Result<(), ReaderOffline> {
        self.tx.send(command).map_err(|_| ReaderOffline)
    }

    /// Deliver an input event from the host's delegated listener.
    pub fn activate(&self, event: InputEvent) -> Result<(), ReaderOffline> {
        self.send(ReaderCommand::Activate(event))
    }

    pub fn refresh(&self, options: ReaderOptions) -> Result<(), ReaderOffline> {
        self.send(ReaderCommand::Refresh(options))
    }

    pub fn stop(&self) -> Result<(), ReaderOffline> {
        self.send(ReaderCommand::Stop)
    }

    pub fn shutdown(&self) -> Result<(), ReaderOffline> {
        self.send(ReaderCommand::Shutdown)
    }

    /// Current slot status, answered after every command sent before it.
    pub async fn status(&self) -> Result<SlotStatus, ReaderOffline> {
        let (reply, rx) = oneshot::channel();
        self.send(ReaderCommand::Status(reply))?;
        rx.await.map_err(|_| ReaderOffline)
    }
}
