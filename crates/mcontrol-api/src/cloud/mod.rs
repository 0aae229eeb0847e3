// M-Control cloud API (aircontrolbase.com)
//
// Form-encoded POST endpoints with a `{ code, msg, result }` envelope.
// Authentication is a user id plus a session cookie captured at login.

pub mod auth;
pub mod client;
pub mod devices;
pub mod models;

pub use client::CloudClient;
pub use models::{
    CloudArea, CloudDevice, ControlRequest, DEFAULT_CLOUD_URL, SESSION_EXPIRED_CODE,
    is_success_code,
};
