//! Error taxonomy for the playback core.

use crate::document::{DocumentError, ElementId};
use crate::media::MediaError;

/// Failures surfaced by `queue`, `play` and `stop`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReaderError {
    /// Activation target is not an initialized attachment, or the config is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The activated element has no usable audio URL.
    #[error("invalid audio url on element {element}")]
    InvalidUrl { element: ElementId },
    /// The audio resource reported that it cannot become playable.
    #[error("load error: {0}")]
    Load(String),
    /// Starting, pausing or resetting the resource failed.
    #[error("playback error: {0}")]
    Playback(String),
    /// The slot was stopped before its resource became ready.
    #[error("slot superseded before it was ready")]
    Superseded,
}

impl From<DocumentError> for ReaderError {
    fn from(err: DocumentError) -> Self {
        ReaderError::Playback(err.to_string())
    }
}

impl From<MediaError> for ReaderError {
    fn from(err: MediaError) -> Self {
        ReaderError::Playback(err.to_string())
    }
}
