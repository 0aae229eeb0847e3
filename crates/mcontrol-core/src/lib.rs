//! Dual-source state synchronization for Midea VRF systems.
//!
//! This crate owns the business logic between `mcontrol-api` and consumers
//! (the CLI, or any automation host):
//!
//! - **[`SyncEngine`]**: central facade. [`start()`](SyncEngine::start)
//!   authenticates, discovers devices, maps them to local gateway slots and
//!   spawns a fast local loop, a slow cloud loop and a command processor.
//!   Consumers read snapshots, send [`ControlCommand`]s and receive
//!   [`EngineEvent`]s.
//!
//! - **[`SessionManager`]**: cloud session lifecycle with single-flight
//!   login, one re-login on expiry and backoff retries.
//!
//! - **[`AddressMap`]**: cloud id to gateway slot pairing, built by
//!   discovery order or by unique fingerprint match.
//!
//! - **[`DataStore`]**: reactive storage (`DashMap` + `tokio::sync::watch`)
//!   vended as [`StateStream`] subscriptions.

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod model;
pub mod session;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::EngineConfig;
pub use engine::{EngineStatus, ListenerId, SyncEngine};
pub use error::{AuthError, CoreError};
pub use mapping::{AddressMap, AddressMapper, Fingerprint};
pub use session::{RetryPolicy, SessionManager};
pub use store::DataStore;
pub use stream::{StateStream, StateWatchStream};

pub use model::{
    Capabilities, CommandOutcome, ControlCommand, Device, DeviceState, EngineEvent, FanMode,
    Freshness, HvacMode, Source, SyncState,
};
