//! Read-aloud attachments for document elements.
//!
//! Elements matching a selector get a playback icon. Activating one plays its audio URL
//! through a single playback slot; activating it again, or another element, stops it.

pub mod attachment;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod media;
pub mod reader;

pub use attachment::{Attachment, AttachmentRegistry, RefreshReport};
pub use config::{ReaderConfig, ReaderOptions};
pub use controller::{LoadTicket, PlaybackController, QueueOutcome};
pub use dispatcher::{ActivationDispatcher, ActivationOutcome, InputEvent, InputKind};
pub use document::{Document, ElementId, MemoryDocument, PageFixture, Selector};
pub use error::ReaderError;
pub use media::{AudioProvider, AudioResource, MediaError, MediaEvent, MediaEventSink, SlotId};
pub use reader::{ReadAloud, ReaderCommand, ReaderHandle, ReaderOffline};
