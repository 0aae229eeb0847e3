//! Command dispatch: bridges CLI args -> engine calls -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod local;
pub mod set;
pub mod status;
pub mod util;
pub mod watch;

use mcontrol_core::EngineConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Start the engine, run an engine-bound command, then stop the engine.
pub async fn dispatch(
    cmd: Command,
    config: EngineConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (engine, warnings) = util::start_engine(config, global).await?;

    if !matches!(cmd, Command::Status) {
        util::print_warnings(&warnings, global);
    }

    let result = match cmd {
        Command::Status => status::handle(&engine, warnings, global),
        Command::Devices(args) => devices::handle(&engine, args, global),
        Command::Set(args) => set::handle(&engine, &args, global).await,
        Command::Watch(args) => watch::handle(&engine, &args, global).await,
        // Handled before the engine starts
        Command::Local(_) | Command::Config(_) | Command::Completions(_) => unreachable!(),
    };

    engine.stop().await;
    result
}
