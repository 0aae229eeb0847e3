// ── Domain model ──
//
// Canonical types shared by the engine, the store and consumers. Wire
// formats stay in `mcontrol-api`; `convert` bridges the two.

pub mod command;
pub mod device;
pub mod event;
pub mod state;

pub use command::{CommandOutcome, ControlCommand};
pub use device::{Capabilities, Device, FanMode, HvacMode};
pub use event::EngineEvent;
pub use state::{DeviceState, Freshness, Source, SyncState};
