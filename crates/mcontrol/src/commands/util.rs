//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use mcontrol_core::{Device, EngineConfig, SyncEngine};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

/// Spinner on stderr while the engine connects, hidden when quiet or piped.
fn spinner(global: &GlobalOpts, message: &'static str) -> Option<ProgressBar> {
    if global.quiet || !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Build and start the engine, then merge one gateway poll so the first
/// snapshot already carries local telemetry.
///
/// Returns the engine together with the warnings recorded during start.
pub async fn start_engine(
    config: EngineConfig,
    global: &GlobalOpts,
) -> Result<(SyncEngine, Vec<String>), CliError> {
    let hybrid = config.is_hybrid();
    let engine = SyncEngine::new(config)?;

    let pb = spinner(global, "Connecting to M-Control...");
    let started = engine.start().await;
    if let Err(e) = started {
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        return Err(e.into());
    }

    if hybrid && engine.address_map().mapped_count() > 0 {
        if let Some(ref pb) = pb {
            pb.set_message("Reading gateway...");
        }
        if let Err(e) = engine.poll_local().await {
            warn!(error = %e, "initial gateway poll failed");
        }
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let warnings = engine.take_warnings().await;
    Ok((engine, warnings))
}

/// Print start-up warnings to stderr unless quiet.
pub fn print_warnings(warnings: &[String], global: &GlobalOpts) {
    if global.quiet {
        return;
    }
    let color = output::should_color(&global.color);
    for w in warnings {
        eprintln!("{}", output::warn_label(&format!("warning: {w}"), color));
    }
}

/// Resolve a device by cloud id, falling back to a case-insensitive name
/// match.
pub fn resolve_device(engine: &SyncEngine, identifier: &str) -> Result<Arc<Device>, CliError> {
    let devices = engine.get_discovered_devices();
    if let Some(d) = devices.iter().find(|d| d.cloud_id == identifier) {
        return Ok(Arc::clone(d));
    }

    let mut by_name = devices
        .iter()
        .filter(|d| d.name.trim().eq_ignore_ascii_case(identifier.trim()));
    match (by_name.next(), by_name.next()) {
        (Some(d), None) => Ok(Arc::clone(d)),
        (Some(_), Some(_)) => Err(CliError::Validation {
            field: "device".into(),
            reason: format!("name '{identifier}' matches several units; use the cloud id"),
        }),
        (None, _) => Err(CliError::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "devices list".into(),
        }),
    }
}

/// Format an optional temperature as `24°` or `-`.
pub fn temp(value: Option<f32>) -> String {
    value.map_or_else(|| "-".into(), |t| format!("{t}°"))
}
