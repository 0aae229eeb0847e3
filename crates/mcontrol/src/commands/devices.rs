//! Device command handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use mcontrol_core::{Device, DeviceState, SyncEngine};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

/// A device joined with its merged state, as printed by every format.
#[derive(Debug, Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: Arc<Device>,
    pub state: Option<Arc<DeviceState>>,
}

impl DeviceView {
    pub fn load(engine: &SyncEngine, device: Arc<Device>) -> Self {
        let state = engine.get_snapshot(&device.cloud_id);
        Self { device, state }
    }
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Area")]
    area: String,
    #[tabled(rename = "Slot")]
    slot: String,
    #[tabled(rename = "Sync")]
    sync: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Fan")]
    fan: String,
    #[tabled(rename = "Fault")]
    fault: String,
}

impl From<&DeviceView> for DeviceRow {
    fn from(v: &DeviceView) -> Self {
        let d = &v.device;
        let s = v.state.as_deref();
        Self {
            id: d.cloud_id.clone(),
            name: d.display_name().to_owned(),
            area: d.area.clone().unwrap_or_default(),
            slot: d.local_slot.map(|s| s.to_string()).unwrap_or_default(),
            sync: s.map(|s| s.sync.to_string()).unwrap_or_default(),
            state: s.map_or_else(String::new, |s| {
                if s.available {
                    s.summary()
                } else {
                    "unavailable".into()
                }
            }),
            fan: s.map(|s| s.fan_mode.to_string()).unwrap_or_default(),
            fault: s
                .and_then(|s| s.error_code)
                .filter(|c| *c != 0)
                .map(|c| format!("E{c}"))
                .unwrap_or_default(),
        }
    }
}

pub fn detail(v: &DeviceView, color: bool) -> String {
    let d = &v.device;
    let mut lines = vec![
        format!("ID:       {}", d.cloud_id),
        format!("Name:     {}", d.display_name()),
        format!("Area:     {}", d.area.as_deref().unwrap_or("-")),
        format!(
            "Slot:     {}",
            d.local_slot.map_or_else(|| "-".into(), |s| s.to_string())
        ),
    ];

    let Some(s) = v.state.as_deref() else {
        lines.push("State:    (not yet merged)".into());
        return lines.join("\n");
    };

    lines.extend([
        format!("Sync:     {}", output::sync_label(s.sync, color)),
        format!("Power:    {}", if s.power { "on" } else { "off" }),
        format!("Mode:     {}", s.hvac_mode),
        format!("Fan:      {}", s.fan_mode),
        format!("Swing:    {}", if s.swing_on { "on" } else { "off" }),
        format!("Target:   {}", util::temp(s.target_temp)),
        format!("Room:     {}", util::temp(s.current_temp)),
        format!("Online:   {}", if s.available { "yes" } else { "no" }),
    ]);
    if s.has_fault() {
        let code = s.error_code.unwrap_or_default();
        lines.push(output::warn_label(&format!("Fault:    E{code}"), color));
    }
    lines.push(output::dim(
        &format!(
            "Updated:  {} from {}",
            s.freshness.at.format("%Y-%m-%d %H:%M:%S UTC"),
            s.freshness.source
        ),
        color,
    ));
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    engine: &SyncEngine,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List => {
            let views: Vec<DeviceView> = engine
                .get_discovered_devices()
                .into_iter()
                .map(|d| DeviceView::load(engine, d))
                .collect();
            let out = output::render_list(
                &global.output,
                &views,
                |v| DeviceRow::from(v),
                |v| v.device.cloud_id.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { device } => {
            let found = util::resolve_device(engine, &device)?;
            let view = DeviceView::load(engine, found);
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
    }
}
