use serde::{Deserialize, Serialize};

/// Lifecycle phase of the single playback slot.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// No slot exists.
    #[default]
    Idle,
    /// A slot exists but its resource has not reported ready-to-play yet.
    Loading,
    /// The slot's resource is producing sound.
    Playing,
}

/// Reason a slot was torn down.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeactivateReason {
    /// Explicit stop (toggle-off, refresh, shutdown).
    Stopped,
    /// Replaced by a newer activation.
    Superseded,
    /// Natural end of the audio resource.
    Ended,
    /// Load or playback failure cleared the slot.
    Failed,
}

/// Payload handed to the activate/deactivate hooks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationInfo {
    /// Opaque element identifier from the host document.
    pub element: u64,
    /// Audio URL of the slot.
    pub url: String,
    /// Set on deactivation only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DeactivateReason>,
}

/// Snapshot of the playback slot for status reporting.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotStatus {
    /// Current phase; `Idle` when no slot exists.
    pub phase: PlaybackPhase,
    /// Audio URL of the active slot.
    pub url: Option<String>,
    /// Element the active slot was started from.
    pub element: Option<u64>,
}

impl SlotStatus {
    /// Status reported while no slot exists.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.phase != PlaybackPhase::Idle
    }
}
