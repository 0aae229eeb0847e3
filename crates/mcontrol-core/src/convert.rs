// ── API-to-domain type conversions ──
//
// Bridges raw `mcontrol_api` wire types into canonical `model` types,
// and domain commands back into cloud control requests.

use chrono::{DateTime, Utc};

use mcontrol_api::local::{LocalFan, LocalMode, UnitStatus};
use mcontrol_api::{CloudDevice, ControlRequest};

use crate::model::{
    Capabilities, ControlCommand, Device, DeviceState, FanMode, Freshness, HvacMode, Source,
    SyncState,
};

// ── Wire vocabularies ────────────────────────────────────────────────

pub fn hvac_mode_from_cloud(raw: &str) -> HvacMode {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cool" => HvacMode::Cool,
        "heat" => HvacMode::Heat,
        "auto" => HvacMode::Auto,
        "dry" => HvacMode::Dry,
        "fan" => HvacMode::FanOnly,
        _ => HvacMode::Unknown,
    }
}

pub fn hvac_mode_to_cloud(mode: HvacMode) -> Option<&'static str> {
    match mode {
        HvacMode::Cool => Some("cool"),
        HvacMode::Heat => Some("heat"),
        HvacMode::Auto => Some("auto"),
        HvacMode::Dry => Some("dry"),
        HvacMode::FanOnly => Some("fan"),
        HvacMode::Unknown => None,
    }
}

pub fn fan_mode_from_cloud(raw: &str) -> FanMode {
    match raw.trim().to_ascii_lowercase().as_str() {
        "auto" => FanMode::Auto,
        "low" => FanMode::Low,
        "mid" | "medium" => FanMode::Medium,
        "high" => FanMode::High,
        _ => FanMode::Unknown,
    }
}

pub fn fan_mode_to_cloud(fan: FanMode) -> Option<&'static str> {
    match fan {
        FanMode::Auto => Some("auto"),
        FanMode::Low => Some("low"),
        FanMode::Medium => Some("mid"),
        FanMode::High => Some("high"),
        FanMode::Unknown => None,
    }
}

fn flag_from_cloud(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("y" | "1" | "on" | "true")
    )
}

fn temp_from_cloud(raw: Option<&str>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|t| t.is_finite())
}

/// Whole-degree temperature string, as the cloud expects.
fn temp_to_cloud(temp: f32) -> String {
    format!("{temp:.0}")
}

// ── Cloud listing ────────────────────────────────────────────────────

/// State fields as reported by one cloud listing entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudReading {
    pub power: bool,
    pub hvac_mode: HvacMode,
    pub fan_mode: FanMode,
    pub swing_on: bool,
    pub target_temp: Option<f32>,
    pub current_temp: Option<f32>,
}

impl From<&CloudDevice> for CloudReading {
    fn from(d: &CloudDevice) -> Self {
        Self {
            power: flag_from_cloud(d.power.as_deref()),
            hvac_mode: d
                .mode
                .as_deref()
                .map_or(HvacMode::Unknown, hvac_mode_from_cloud),
            fan_mode: d
                .wind
                .as_deref()
                .map_or(FanMode::Unknown, fan_mode_from_cloud),
            swing_on: flag_from_cloud(d.swing.as_deref()),
            target_temp: temp_from_cloud(d.set_temp.as_deref()),
            current_temp: temp_from_cloud(d.fact_temp.as_deref()),
        }
    }
}

pub fn device_from_cloud(d: &CloudDevice) -> Device {
    Device {
        cloud_id: d.id.clone(),
        name: d.name.clone(),
        area: d.area.clone(),
        capabilities: Capabilities::default(),
        local_slot: None,
    }
}

/// Initial state for a freshly discovered device.
pub fn state_from_cloud(d: &CloudDevice, now: DateTime<Utc>) -> DeviceState {
    let r = CloudReading::from(d);
    DeviceState {
        cloud_id: d.id.clone(),
        power: r.power,
        hvac_mode: r.hvac_mode,
        fan_mode: r.fan_mode,
        swing_on: r.swing_on,
        target_temp: r.target_temp,
        current_temp: r.current_temp,
        freshness: Freshness {
            source: Source::Cloud,
            at: now,
        },
        last_local: None,
        last_cloud: Some(now),
        error_code: None,
        available: true,
        sync: SyncState::Uninitialized,
    }
}

// ── Gateway status ───────────────────────────────────────────────────

/// State fields as decoded from one gateway slot.
///
/// `hvac_mode` / `fan_mode` are `None` while the unit is off: the gateway
/// reports "off" in place of the mode, which says nothing about the mode
/// the unit will resume in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalReading {
    pub slot: u8,
    pub power: bool,
    pub hvac_mode: Option<HvacMode>,
    pub fan_mode: Option<FanMode>,
    pub swing_on: bool,
    pub target_temp: f32,
    pub current_temp: f32,
    pub error_code: u8,
}

impl From<&UnitStatus> for LocalReading {
    fn from(u: &UnitStatus) -> Self {
        let hvac_mode = match u.mode {
            LocalMode::Cool => Some(HvacMode::Cool),
            LocalMode::Heat => Some(HvacMode::Heat),
            LocalMode::Dry => Some(HvacMode::Dry),
            LocalMode::Fan => Some(HvacMode::FanOnly),
            LocalMode::Auto => Some(HvacMode::Auto),
            LocalMode::Off => None,
            LocalMode::Unknown(_) => Some(HvacMode::Unknown),
        };
        let fan_mode = match u.fan {
            LocalFan::Auto => Some(FanMode::Auto),
            LocalFan::Low => Some(FanMode::Low),
            LocalFan::Medium => Some(FanMode::Medium),
            LocalFan::High => Some(FanMode::High),
            LocalFan::Off => None,
            LocalFan::Unknown(_) => Some(FanMode::Unknown),
        };
        Self {
            slot: u.slot,
            power: u.power,
            hvac_mode,
            fan_mode,
            swing_on: u.swing,
            target_temp: f32::from(u.target_temp),
            current_temp: f32::from(u.current_temp),
            error_code: u.error_code,
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────────

/// Translate a validated command into a cloud control request carrying
/// only the fields the command sets.
pub fn control_request(cloud_id: &str, cmd: &ControlCommand) -> ControlRequest {
    let mut req = ControlRequest::new(cloud_id);
    req.power = cmd.power.map(|on| if on { "y" } else { "n" }.to_owned());
    req.mode = cmd
        .hvac_mode
        .and_then(hvac_mode_to_cloud)
        .map(str::to_owned);
    req.wind = cmd.fan_mode.and_then(fan_mode_to_cloud).map(str::to_owned);
    req.swing = cmd
        .swing_on
        .map(|on| if on { "1" } else { "0" }.to_owned());
    req.set_temp = cmd.target_temp.map(temp_to_cloud);
    req
}
