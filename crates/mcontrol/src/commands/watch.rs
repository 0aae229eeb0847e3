//! Live event stream.

use std::collections::HashMap;
use std::future;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use mcontrol_core::{DeviceState, EngineEvent, SyncEngine};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn name_of(engine: &SyncEngine, cloud_id: &str) -> String {
    engine
        .get_discovered_devices()
        .iter()
        .find(|d| d.cloud_id == cloud_id)
        .map_or_else(|| cloud_id.to_owned(), |d| d.display_name().to_owned())
}

fn state_line(engine: &SyncEngine, state: &DeviceState, color: bool) -> String {
    let mut line = format!(
        "{:<20} {:<16} {}",
        name_of(engine, &state.cloud_id),
        output::sync_label(state.sync, color),
        state.summary()
    );
    if !state.available {
        line.push_str(" [unavailable]");
    }
    if state.has_fault() {
        let code = state.error_code.unwrap_or_default();
        line.push_str(&output::warn_label(&format!(" [fault E{code}]"), color));
    }
    line
}

/// One human-readable line per event.
fn event_line(engine: &SyncEngine, event: &EngineEvent, color: bool) -> String {
    let body = match event {
        EngineEvent::StateChanged { state } => state_line(engine, state, color),
        EngineEvent::DeviceAdded { cloud_id } => {
            format!("+ {} appeared in the cloud listing", name_of(engine, cloud_id))
        }
        EngineEvent::DeviceRemoved { cloud_id } => {
            format!("- {cloud_id} removed from the cloud listing")
        }
        EngineEvent::CloudFallback {
            consecutive_failures,
        } => output::warn_label(
            &format!("gateway failed {consecutive_failures} times, reading from the cloud"),
            color,
        ),
        EngineEvent::LocalRecovered => "gateway answering again".to_owned(),
        EngineEvent::DeviceUnavailable { cloud_id, reason } => output::warn_label(
            &format!("{} unavailable: {reason}", name_of(engine, cloud_id)),
            color,
        ),
        EngineEvent::Remapped { mapped, unmapped } => {
            if unmapped.is_empty() {
                format!("address map rebuilt: {mapped} mapped")
            } else {
                format!(
                    "address map rebuilt: {mapped} mapped, unmapped {}",
                    unmapped.join(", ")
                )
            }
        }
        EngineEvent::AuthFailed { message } => {
            output::warn_label(&format!("credentials rejected: {message}"), color)
        }
    };
    let time = Local::now().format("%H:%M:%S").to_string();
    format!("{} {body}", output::dim(&time, color))
}

fn plain_line(event: &EngineEvent) -> String {
    let kind = match event {
        EngineEvent::StateChanged { .. } => "state_changed",
        EngineEvent::DeviceAdded { .. } => "device_added",
        EngineEvent::DeviceRemoved { .. } => "device_removed",
        EngineEvent::CloudFallback { .. } => "cloud_fallback",
        EngineEvent::LocalRecovered => "local_recovered",
        EngineEvent::DeviceUnavailable { .. } => "device_unavailable",
        EngineEvent::Remapped { .. } => "remapped",
        EngineEvent::AuthFailed { .. } => "auth_failed",
    };
    match event.cloud_id() {
        Some(id) => format!("{kind} {id}"),
        None => kind.to_owned(),
    }
}

fn render(
    engine: &SyncEngine,
    event: &EngineEvent,
    format: &OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Table => event_line(engine, event, color),
        // One JSON document per line
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(event)?,
        OutputFormat::Yaml => format!("---\n{}", output::yaml(event)),
        OutputFormat::Plain => plain_line(event),
    })
}

pub async fn handle(
    engine: &SyncEngine,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let filter = args
        .device
        .as_deref()
        .map(|d| util::resolve_device(engine, d))
        .transpose()?
        .map(|d| d.cloud_id.clone());
    // Engine-wide events always pass the device filter.
    let wanted = |event: &EngineEvent| {
        filter
            .as_deref()
            .is_none_or(|want| event.cloud_id().is_none_or(|id| id == want))
    };
    let color = output::should_color(&global.color);

    // Subscribe first so nothing between the snapshot and the loop is lost.
    let mut rx = engine.updates();
    let table = matches!(global.output, OutputFormat::Table);
    // Table mode prints a device line only when something visible moved.
    let mut shown: HashMap<String, Arc<DeviceState>> = HashMap::new();

    if table {
        for device in engine.get_discovered_devices() {
            if filter.as_ref().is_some_and(|f| *f != device.cloud_id) {
                continue;
            }
            if let Some(state) = engine.get_snapshot(&device.cloud_id) {
                output::print_output(&state_line(engine, &state, color), global.quiet);
                shown.insert(device.cloud_id.clone(), state);
            }
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match args.duration {
            Some(d) => tokio::time::sleep(d).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut seen = 0usize;
    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => break,
            () = &mut deadline => break,
            received = rx.recv() => match received {
                Ok(event) => {
                    if !wanted(&event) {
                        continue;
                    }
                    if let (true, EngineEvent::StateChanged { state }) = (table, &event) {
                        if shown.get(&state.cloud_id).is_some_and(|prev| prev.same_values(state)) {
                            continue;
                        }
                        shown.insert(state.cloud_id.clone(), Arc::clone(state));
                    }
                    let line = render(engine, &event, &global.output, color)?;
                    output::print_output(&line, global.quiet);

                    if let EngineEvent::AuthFailed { message } = event {
                        return Err(CliError::AuthFailed {
                            profile: "current".into(),
                            message,
                        });
                    }

                    seen += 1;
                    if args.count.is_some_and(|n| seen >= n) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
