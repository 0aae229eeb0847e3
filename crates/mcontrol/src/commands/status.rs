//! Engine status: lifecycle, source mode, gateway health and address map.

use chrono::{DateTime, Utc};
use serde::Serialize;

use mcontrol_core::{EngineStatus, SyncEngine, SyncState};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct SlotView {
    cloud_id: String,
    name: String,
    slot: Option<u8>,
    sync: Option<SyncState>,
}

#[derive(Debug, Serialize)]
struct StatusView {
    status: EngineStatus,
    mode: &'static str,
    gateway: Option<String>,
    in_fallback: bool,
    devices: usize,
    mapped: usize,
    unmapped: Vec<String>,
    map_built_at: Option<DateTime<Utc>>,
    slots: Vec<SlotView>,
    warnings: Vec<String>,
}

fn collect(engine: &SyncEngine, warnings: Vec<String>) -> StatusView {
    let map = engine.address_map();
    let slots: Vec<SlotView> = engine
        .get_discovered_devices()
        .iter()
        .map(|d| SlotView {
            cloud_id: d.cloud_id.clone(),
            name: d.display_name().to_owned(),
            slot: map.slot_for(&d.cloud_id),
            sync: engine.get_snapshot(&d.cloud_id).map(|s| s.sync),
        })
        .collect();

    let config = engine.config();
    StatusView {
        status: engine.status(),
        mode: if config.is_hybrid() { "hybrid" } else { "cloud_only" },
        gateway: config.gateway.clone(),
        in_fallback: engine.in_fallback(),
        devices: slots.len(),
        mapped: map.mapped_count(),
        unmapped: map.unmapped_ids().to_vec(),
        map_built_at: map.built_at(),
        slots,
        warnings,
    }
}

fn detail(v: &StatusView, color: bool) -> String {
    let gateway = match (&v.gateway, v.in_fallback) {
        (None, _) => "-".to_owned(),
        (Some(host), false) => host.clone(),
        (Some(host), true) => {
            output::warn_label(&format!("{host} (unreachable, cloud fallback)"), color)
        }
    };

    let mut lines = vec![
        format!("Engine:   {}", v.status),
        format!("Mode:     {}", v.mode),
        format!("Gateway:  {gateway}"),
        format!("Devices:  {} ({} mapped)", v.devices, v.mapped),
    ];
    if let Some(at) = v.map_built_at {
        lines.push(output::dim(
            &format!("Map:      built {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            color,
        ));
    }

    if !v.slots.is_empty() {
        lines.push(String::new());
        for s in &v.slots {
            let slot = s.slot.map_or_else(|| "--".into(), |n| format!("{n:>2}"));
            let sync = s
                .sync
                .map(|st| output::sync_label(st, color))
                .unwrap_or_default();
            lines.push(format!("  [{slot}] {:<10} {:<20} {sync}", s.cloud_id, s.name));
        }
    }

    for w in &v.warnings {
        lines.push(output::warn_label(&format!("warning: {w}"), color));
    }
    lines.join("\n")
}

#[allow(clippy::unnecessary_wraps)]
pub fn handle(
    engine: &SyncEngine,
    warnings: Vec<String>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let view = collect(engine, warnings);
    let color = output::should_color(&global.color);
    let out = output::render_single(&global.output, &view, |v| detail(v, color), |v| {
        v.status.to_string()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
