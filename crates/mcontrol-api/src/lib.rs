//! Async client library for Midea VRF systems.
//!
//! Two API surfaces:
//!
//! - **Cloud** ([`CloudClient`]): the M-Control service at aircontrolbase.com.
//!   Login, device listing with last known state, and control writes.
//! - **Local** ([`LocalClient`]): the CCM21-i / CCM15 gateway on the LAN.
//!   Read-only status polling, decoded by [`decode`] into [`UnitStatus`]
//!   records.
//!
//! Both clients are stateless with respect to sessions and polling; the
//! `mcontrol-core` crate owns scheduling, re-login and state merging.

mod de;

pub mod auth;
pub mod cloud;
pub mod error;
pub mod local;
pub mod transport;

pub use auth::Session;
pub use cloud::{CloudClient, CloudDevice, ControlRequest, DEFAULT_CLOUD_URL};
pub use error::Error;
pub use local::{LocalClient, LocalFan, LocalMode, ProtocolError, UnitStatus, decode};
pub use transport::{TlsMode, TransportConfig};
