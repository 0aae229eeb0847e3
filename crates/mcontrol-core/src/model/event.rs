// ── Engine notifications ──

use std::sync::Arc;

use serde::Serialize;

use super::state::DeviceState;

/// Push notification emitted by the engine.
///
/// Delivered both to callbacks registered with
/// [`SyncEngine::on_update`](crate::SyncEngine::on_update) and on the
/// [`SyncEngine::updates`](crate::SyncEngine::updates) broadcast channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Sent after every committed local or cloud merge and every accepted
    /// command, including merges that only advanced freshness.
    StateChanged { state: Arc<DeviceState> },
    /// A device appeared in the cloud listing.
    DeviceAdded { cloud_id: String },
    /// A device vanished from the cloud listing.
    DeviceRemoved { cloud_id: String },
    /// The gateway failed repeatedly; mapped devices now read from the cloud.
    CloudFallback { consecutive_failures: u32 },
    /// The gateway answered again after a fallback.
    LocalRecovered,
    /// The cloud could not be reached for this device.
    DeviceUnavailable { cloud_id: String, reason: String },
    /// The address map was rebuilt.
    Remapped { mapped: usize, unmapped: Vec<String> },
    /// Credentials were rejected at runtime; the engine stopped.
    AuthFailed { message: String },
}

impl EngineEvent {
    /// Cloud id the event concerns, if it is device-scoped.
    pub fn cloud_id(&self) -> Option<&str> {
        match self {
            Self::StateChanged { state } => Some(&state.cloud_id),
            Self::DeviceAdded { cloud_id }
            | Self::DeviceRemoved { cloud_id }
            | Self::DeviceUnavailable { cloud_id, .. } => Some(cloud_id),
            Self::CloudFallback { .. }
            | Self::LocalRecovered
            | Self::Remapped { .. }
            | Self::AuthFailed { .. } => None,
        }
    }
}
