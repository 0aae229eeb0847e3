//! Control command handler.

use mcontrol_core::{CommandOutcome, ControlCommand, FanMode, HvacMode, SyncEngine};

use crate::cli::{FanArg, GlobalOpts, ModeArg, SetArgs, Toggle};
use crate::error::CliError;
use crate::output;

use super::devices::{DeviceView, detail};
use super::util;

impl From<Toggle> for bool {
    fn from(t: Toggle) -> Self {
        matches!(t, Toggle::On)
    }
}

impl From<ModeArg> for HvacMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Cool => Self::Cool,
            ModeArg::Heat => Self::Heat,
            ModeArg::Auto => Self::Auto,
            ModeArg::Dry => Self::Dry,
            ModeArg::FanOnly => Self::FanOnly,
        }
    }
}

impl From<FanArg> for FanMode {
    fn from(f: FanArg) -> Self {
        match f {
            FanArg::Auto => Self::Auto,
            FanArg::Low => Self::Low,
            FanArg::Medium => Self::Medium,
            FanArg::High => Self::High,
        }
    }
}

/// Collect the flags into a partial command.
pub fn build_command(args: &SetArgs) -> Result<ControlCommand, CliError> {
    let command = ControlCommand {
        power: args.power.map(bool::from),
        hvac_mode: args.mode.map(HvacMode::from),
        fan_mode: args.fan.map(FanMode::from),
        swing_on: args.swing.map(bool::from),
        target_temp: args.temp,
    };
    if command.is_empty() {
        return Err(CliError::Validation {
            field: "set".into(),
            reason: "pass at least one of --power, --mode, --fan, --temp, --swing".into(),
        });
    }
    Ok(command)
}

pub async fn handle(
    engine: &SyncEngine,
    args: &SetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let command = build_command(args)?;
    let device = util::resolve_device(engine, &args.device)?;

    tracing::debug!(device = %device.cloud_id, ?command, "sending control command");
    match engine.set_command(&device.cloud_id, command).await? {
        CommandOutcome::Accepted => {
            if !global.quiet {
                eprintln!("✓ {} updated", device.display_name());
            }
            let view = DeviceView::load(engine, device);
            let color = output::should_color(&global.color);
            let out = output::render_single(
                &global.output,
                &view,
                |v| detail(v, color),
                |v| v.device.cloud_id.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
        CommandOutcome::Rejected { reason } => Err(CliError::CommandRejected {
            device: device.cloud_id.clone(),
            reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SetArgs {
        SetArgs {
            device: "101".into(),
            power: None,
            mode: None,
            fan: None,
            temp: None,
            swing: None,
        }
    }

    #[test]
    fn only_given_flags_are_set() {
        let cmd = build_command(&SetArgs {
            temp: Some(22.0),
            ..args()
        });
        let Ok(cmd) = cmd else {
            panic!("command should build");
        };
        assert_eq!(cmd, ControlCommand::target_temp(22.0));

        let Ok(cmd) = build_command(&SetArgs {
            power: Some(Toggle::Off),
            mode: Some(ModeArg::FanOnly),
            fan: Some(FanArg::Medium),
            ..args()
        }) else {
            panic!("command should build");
        };
        assert_eq!(cmd.power, Some(false));
        assert_eq!(cmd.hvac_mode, Some(HvacMode::FanOnly));
        assert_eq!(cmd.fan_mode, Some(FanMode::Medium));
        assert!(cmd.swing_on.is_none());
    }

    #[test]
    fn empty_set_is_a_usage_error() {
        assert!(matches!(
            build_command(&args()),
            Err(CliError::Validation { .. })
        ));
    }
}
