//! Direct gateway access, bypassing the sync engine.

use serde::Serialize;
use tabled::Tabled;

use mcontrol_api::{LocalClient, TransportConfig, UnitStatus};
use mcontrol_core::CoreError;

use crate::cli::{GlobalOpts, LocalArgs, LocalCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

/// One gateway slot as printed by `local dump`.
#[derive(Debug, Serialize)]
struct SlotDump {
    slot: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
    status: Option<UnitStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Slot")]
    slot: u8,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Fan")]
    fan: String,
    #[tabled(rename = "Swing")]
    swing: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "Error")]
    error: String,
    #[tabled(rename = "Raw")]
    raw: String,
}

fn lower_debug(value: &impl std::fmt::Debug) -> String {
    format!("{value:?}").to_lowercase()
}

impl From<&SlotDump> for SlotRow {
    fn from(d: &SlotDump) -> Self {
        let raw = d.raw.clone().unwrap_or_default();
        match (&d.status, &d.error) {
            (Some(u), _) => Self {
                slot: d.slot,
                power: if u.power { "on" } else { "off" }.into(),
                mode: lower_debug(&u.mode),
                fan: lower_debug(&u.fan),
                swing: if u.swing { "on" } else { "off" }.into(),
                target: format!("{}°", u.target_temp),
                room: format!("{}°", u.current_temp),
                error: if u.error_code == 0 {
                    String::new()
                } else {
                    format!("E{}", u.error_code)
                },
                raw,
            },
            (None, error) => Self {
                slot: d.slot,
                power: "-".into(),
                mode: "-".into(),
                fan: "-".into(),
                swing: "-".into(),
                target: "-".into(),
                room: "-".into(),
                error: error.clone().unwrap_or_else(|| "empty".into()),
                raw,
            },
        }
    }
}

/// Build a gateway client from the active profile or `--gateway`.
fn gateway_client(global: &GlobalOpts) -> Result<LocalClient, CliError> {
    let (profile, _name, defaults) = config::effective_profile(global)?;
    let host = profile.gateway.ok_or(CliError::NoGateway)?;
    mcontrol_core::config::validate_gateway_host(&host)?;

    let timeout_raw = profile.local_timeout.unwrap_or(defaults.local_timeout);
    let timeout = mcontrol_config::parse_duration("local_timeout", &timeout_raw)?;
    let transport = TransportConfig::default().with_timeout(timeout);
    LocalClient::new(host.trim(), &transport).map_err(|e| CoreError::from(e).into())
}

/// Poll once. In raw mode each entry is decoded on its own so one bad
/// slot does not hide the others.
async fn dump(client: &LocalClient, raw: bool) -> Result<Vec<SlotDump>, CliError> {
    if !raw {
        let units = client.poll_units().await.map_err(CoreError::from)?;
        return Ok(units
            .into_values()
            .map(|u| SlotDump {
                slot: u.slot,
                raw: None,
                status: Some(u),
                error: None,
            })
            .collect());
    }

    let entries = client.fetch_entries().await.map_err(CoreError::from)?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let (status, error) = match entry.status_bytes() {
                Ok(Some(bytes)) => (Some(UnitStatus::from_status_bytes(entry.addr, &bytes)), None),
                Ok(None) => (None, None),
                Err(reason) => (None, Some(reason)),
            };
            SlotDump {
                slot: entry.addr,
                raw: entry.data,
                status,
                error,
            }
        })
        .collect())
}

pub async fn handle(args: LocalArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        LocalCommand::Dump { raw } => {
            let client = gateway_client(global)?;
            tracing::debug!(host = client.host(), raw, "dumping gateway status");

            let slots = dump(&client, raw).await?;
            if slots.is_empty() && !global.quiet {
                eprintln!("Gateway reported no units");
            }
            let out = output::render_list(
                &global.output,
                &slots,
                |s| SlotRow::from(s),
                |s| s.slot.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
