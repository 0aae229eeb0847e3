// CCM21-i / CCM15 local gateway
//
// `client` fetches the status array over HTTP and assembles the binary
// status frame; `protocol` decodes that frame into per-unit records.

pub mod client;
pub mod protocol;

pub use client::{GatewayEntry, LocalClient};
pub use protocol::{
    LocalFan, LocalMode, ProtocolError, ProtocolErrorKind, RECORD_LEN, STATUS_LEN, UnitStatus,
    decode,
};
