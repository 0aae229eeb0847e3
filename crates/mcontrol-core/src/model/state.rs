// ── Per-device merged state ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::device::{FanMode, HvacMode};

/// Where a device sits in the synchronization lifecycle.
///
/// ```text
/// Uninitialized ─┬─> Mapped ──> Synced <──> CloudFallback
///                └─> CloudOnly
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Listed by the cloud, mapping not attempted yet.
    Uninitialized,
    /// Paired with a gateway slot, no local poll merged yet.
    Mapped,
    /// No gateway slot; cloud is the only source.
    CloudOnly,
    /// Local telemetry is flowing.
    Synced,
    /// Mapped, but the gateway is unreachable.
    CloudFallback,
}

impl SyncState {
    /// `true` when the device has a gateway slot.
    pub fn is_mapped(self) -> bool {
        matches!(self, Self::Mapped | Self::Synced | Self::CloudFallback)
    }
}

/// Which source produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Local,
    Cloud,
}

/// Source and time of the most recent merge into a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    pub source: Source,
    pub at: DateTime<Utc>,
}

/// Complete state of one device as merged from cloud and gateway.
///
/// Local telemetry owns `power`, `hvac_mode` and `current_temp` while the
/// device is `Synced`; the cloud owns `fan_mode`, `swing_on`,
/// `target_temp` and anything written by a pending command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub cloud_id: String,
    pub power: bool,
    pub hvac_mode: HvacMode,
    pub fan_mode: FanMode,
    pub swing_on: bool,
    pub target_temp: Option<f32>,
    pub current_temp: Option<f32>,
    pub freshness: Freshness,
    pub last_local: Option<DateTime<Utc>>,
    pub last_cloud: Option<DateTime<Utc>>,
    /// Gateway-reported fault code; 0 means no fault.
    pub error_code: Option<u8>,
    /// `false` after the cloud could not be reached for this device.
    pub available: bool,
    pub sync: SyncState,
}

impl DeviceState {
    /// Short human-readable summary, e.g. `cool 24° (room 26°)`.
    pub fn summary(&self) -> String {
        let mut out = if self.power {
            self.hvac_mode.to_string()
        } else {
            "off".to_owned()
        };
        if let Some(t) = self.target_temp {
            out.push_str(&format!(" {t}°"));
        }
        if let Some(t) = self.current_temp {
            out.push_str(&format!(" (room {t}°)"));
        }
        out
    }

    /// Equal in everything a consumer would display; timestamps and
    /// freshness are ignored.
    pub fn same_values(&self, other: &Self) -> bool {
        self.power == other.power
            && self.hvac_mode == other.hvac_mode
            && self.fan_mode == other.fan_mode
            && self.swing_on == other.swing_on
            && self.target_temp == other.target_temp
            && self.current_temp == other.current_temp
            && self.error_code == other.error_code
            && self.available == other.available
            && self.sync == other.sync
    }

    /// `true` if the gateway reports a fault on this unit.
    pub fn has_fault(&self) -> bool {
        self.error_code.is_some_and(|c| c != 0)
    }
}
