// Cloud API wire types
//
// Every response is wrapped in `{ code, msg, result }`. `code` is absent
// or 200 on success; the cloud is inconsistent about sending it as a
// number or a string.

use serde::{Deserialize, Serialize};

use crate::de;

/// Default M-Control cloud base URL.
pub const DEFAULT_CLOUD_URL: &str = "https://www.aircontrolbase.com";

/// Envelope code signalling that the session cookie is no longer valid.
pub const SESSION_EXPIRED_CODE: i64 = 40018;

pub(crate) const LOGIN_PATH: &str = "/web/user/login";
pub(crate) const DETAILS_PATH: &str = "/web/userGroup/getDetails";
pub(crate) const CONTROL_PATH: &str = "/web/device/control";

/// Returns `true` for envelope codes the cloud uses to signal success.
pub fn is_success_code(code: Option<i64>) -> bool {
    matches!(code, None | Some(200))
}

/// The `{ code, msg, result }` response envelope.
#[derive(Debug, Deserialize)]
pub struct CloudEnvelope<T> {
    #[serde(default, deserialize_with = "de::opt_code")]
    pub code: Option<i64>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    pub result: Option<T>,
}

impl<T> CloudEnvelope<T> {
    pub fn is_success(&self) -> bool {
        is_success_code(self.code)
    }

    /// Human-readable failure description.
    pub fn describe(&self) -> String {
        match (&self.msg, self.code) {
            (Some(msg), Some(code)) if !msg.is_empty() => format!("{msg} (code {code})"),
            (Some(msg), None) if !msg.is_empty() => msg.clone(),
            (_, Some(code)) => format!("code {code}"),
            _ => "unknown error".into(),
        }
    }
}

/// `result` of `/web/user/login`.
#[derive(Debug, Deserialize)]
pub struct LoginResult {
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub id: Option<String>,
}

/// `result` of `/web/userGroup/getDetails`.
#[derive(Debug, Default, Deserialize)]
pub struct DetailsResult {
    #[serde(default)]
    pub areas: Vec<CloudArea>,
}

/// A named group of indoor units.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudArea {
    #[serde(default, alias = "areaName")]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Vec<CloudDevice>,
}

/// One indoor unit as listed by the cloud, with its last reported state.
///
/// Wire values are kept as the raw strings the cloud uses
/// (`power: "y"`, `mode: "cool"`, `wind: "mid"`, `swing: "1"`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudDevice {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub power: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub set_temp: Option<String>,
    #[serde(default)]
    pub wind: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub swing: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub fact_temp: Option<String>,
    /// Area the unit was listed under. Filled in by `list_devices`.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

/// Body of a control write. Only populated fields are sent.
///
/// A temperature-only change serializes to `{"id":"7","setTemp":"22"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_temp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swing: Option<String>,
}

impl ControlRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if no field besides `id` is set.
    pub fn is_empty(&self) -> bool {
        self.power.is_none()
            && self.mode.is_none()
            && self.set_temp.is_none()
            && self.wind.is_none()
            && self.swing.is_none()
    }
}
