// ── Device domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Operating mode, normalized across cloud and gateway.
///
/// "Off" is not a mode; it is `power == false` on [`DeviceState`](super::DeviceState).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Cool,
    Heat,
    Auto,
    Dry,
    #[strum(to_string = "fan_only", serialize = "fan")]
    FanOnly,
    /// Reported by the gateway with a code we do not recognise.
    Unknown,
}

/// Fan speed, normalized across cloud and gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    Auto,
    Low,
    #[strum(to_string = "medium", serialize = "mid")]
    Medium,
    High,
    Unknown,
}

/// What a unit supports. Midea VRF indoor units expose the same set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub hvac_modes: Vec<HvacMode>,
    pub fan_modes: Vec<FanMode>,
    pub swing: bool,
    pub min_temp: f32,
    pub max_temp: f32,
}

impl Capabilities {
    pub const MIN_TEMP: f32 = 16.0;
    pub const MAX_TEMP: f32 = 30.0;

    pub fn supports_mode(&self, mode: HvacMode) -> bool {
        self.hvac_modes.contains(&mode)
    }

    pub fn supports_fan(&self, fan: FanMode) -> bool {
        self.fan_modes.contains(&fan)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            hvac_modes: vec![
                HvacMode::Cool,
                HvacMode::Heat,
                HvacMode::Auto,
                HvacMode::Dry,
                HvacMode::FanOnly,
            ],
            fan_modes: vec![FanMode::Auto, FanMode::Low, FanMode::Medium, FanMode::High],
            swing: true,
            min_temp: Self::MIN_TEMP,
            max_temp: Self::MAX_TEMP,
        }
    }
}

/// An indoor unit discovered through the cloud listing.
///
/// `cloud_id` never changes for the lifetime of the process. `local_slot`
/// is set while the address map pairs the unit with a gateway slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub cloud_id: String,
    pub name: String,
    pub area: Option<String>,
    pub capabilities: Capabilities,
    pub local_slot: Option<u8>,
}

impl Device {
    /// Display name, falling back to the cloud id.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.cloud_id
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn mode_names_round_trip_through_strum() {
        assert_eq!(HvacMode::FanOnly.to_string(), "fan_only");
        assert_eq!(HvacMode::from_str("fan").unwrap(), HvacMode::FanOnly);
        assert_eq!(HvacMode::from_str("COOL").unwrap(), HvacMode::Cool);
        assert!(HvacMode::from_str("turbo").is_err());

        assert_eq!(FanMode::from_str("mid").unwrap(), FanMode::Medium);
        assert_eq!(FanMode::Medium.to_string(), "medium");
    }

    #[test]
    fn default_capabilities_cover_vrf_units() {
        let caps = Capabilities::default();
        assert!(caps.supports_mode(HvacMode::Dry));
        assert!(!caps.supports_mode(HvacMode::Unknown));
        assert!(!caps.supports_fan(FanMode::Unknown));
        assert!(caps.swing);
    }
}
