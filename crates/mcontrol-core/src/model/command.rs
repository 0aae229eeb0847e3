// ── Control commands ──

use serde::{Deserialize, Serialize};

use super::device::{Capabilities, FanMode, HvacMode};
use super::state::DeviceState;
use crate::error::CoreError;

/// A partial control write. Only the fields that are `Some` are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub power: Option<bool>,
    pub hvac_mode: Option<HvacMode>,
    pub fan_mode: Option<FanMode>,
    pub swing_on: Option<bool>,
    pub target_temp: Option<f32>,
}

impl ControlCommand {
    pub fn power(on: bool) -> Self {
        Self {
            power: Some(on),
            ..Self::default()
        }
    }

    pub fn target_temp(temp: f32) -> Self {
        Self {
            target_temp: Some(temp),
            ..Self::default()
        }
    }

    pub fn hvac_mode(mode: HvacMode) -> Self {
        Self {
            hvac_mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_none()
            && self.hvac_mode.is_none()
            && self.fan_mode.is_none()
            && self.swing_on.is_none()
            && self.target_temp.is_none()
    }

    /// Reject commands the unit cannot carry out.
    ///
    /// Temperatures must be whole degrees within the unit's range.
    pub fn validate(&self, caps: &Capabilities) -> Result<(), CoreError> {
        if self.is_empty() {
            return Err(invalid("command sets no fields"));
        }

        if let Some(mode) = self.hvac_mode {
            if !caps.supports_mode(mode) {
                return Err(invalid(format!("unsupported mode {mode}")));
            }
        }

        if let Some(fan) = self.fan_mode {
            if !caps.supports_fan(fan) {
                return Err(invalid(format!("unsupported fan mode {fan}")));
            }
        }

        if self.swing_on.is_some() && !caps.swing {
            return Err(invalid("swing is not supported"));
        }

        if let Some(temp) = self.target_temp {
            if !temp.is_finite() || temp < caps.min_temp || temp > caps.max_temp {
                return Err(invalid(format!(
                    "target temperature {temp} outside {}..={}",
                    caps.min_temp, caps.max_temp
                )));
            }
            if temp.fract() != 0.0 {
                return Err(invalid(format!(
                    "target temperature {temp} must be a whole degree"
                )));
            }
        }

        Ok(())
    }

    /// Apply the set fields to a state (optimistic update).
    pub fn apply_to(&self, state: &mut DeviceState) {
        if let Some(power) = self.power {
            state.power = power;
        }
        if let Some(mode) = self.hvac_mode {
            state.hvac_mode = mode;
        }
        if let Some(fan) = self.fan_mode {
            state.fan_mode = fan;
        }
        if let Some(swing) = self.swing_on {
            state.swing_on = swing;
        }
        if let Some(temp) = self.target_temp {
            state.target_temp = Some(temp);
        }
    }

    /// Union of two commands; fields set in `later` win.
    pub fn merged_with(&self, later: &Self) -> Self {
        Self {
            power: later.power.or(self.power),
            hvac_mode: later.hvac_mode.or(self.hvac_mode),
            fan_mode: later.fan_mode.or(self.fan_mode),
            swing_on: later.swing_on.or(self.swing_on),
            target_temp: later.target_temp.or(self.target_temp),
        }
    }
}

/// Result of [`SyncEngine::set_command`](crate::SyncEngine::set_command).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The cloud acknowledged the write.
    Accepted,
    /// The cloud refused the write or could not be reached.
    Rejected { reason: String },
}

impl CommandOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::ValidationFailed {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_bounds() {
        let caps = Capabilities::default();
        assert!(ControlCommand::target_temp(22.0).validate(&caps).is_ok());
        assert!(ControlCommand::target_temp(16.0).validate(&caps).is_ok());
        assert!(ControlCommand::target_temp(30.0).validate(&caps).is_ok());
        assert!(ControlCommand::target_temp(15.0).validate(&caps).is_err());
        assert!(ControlCommand::target_temp(31.0).validate(&caps).is_err());
        assert!(ControlCommand::target_temp(22.5).validate(&caps).is_err());
        assert!(ControlCommand::target_temp(f32::NAN).validate(&caps).is_err());
        assert!(ControlCommand::default().validate(&caps).is_err());
        assert!(
            ControlCommand::hvac_mode(HvacMode::Unknown)
                .validate(&caps)
                .is_err()
        );
    }

    #[test]
    fn later_fields_win_when_merging() {
        let first = ControlCommand {
            power: Some(true),
            target_temp: Some(20.0),
            ..ControlCommand::default()
        };
        let merged = first.merged_with(&ControlCommand::target_temp(23.0));
        assert_eq!(merged.power, Some(true));
        assert_eq!(merged.target_temp, Some(23.0));
        assert!(merged.hvac_mode.is_none());
    }
}
