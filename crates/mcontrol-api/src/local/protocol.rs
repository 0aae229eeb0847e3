// CCM21-i / CCM15 unit status decoding
//
// The gateway reports each indoor unit as 7 status bytes. The local
// client packs occupied slots into a status frame of fixed-size records:
//
//   offset 0     slot (unit address)
//   offset 1..8  status bytes 0..6
//
// Status byte layout:
//
//   byte 2  bits 2..7  error code
//   byte 3  bits 2..4  mode   (0 cool, 1 heat, 2 dry, 3 fan, 4 off, 5 auto)
//   byte 3  bits 5..7  fan    (0 auto, 2 low, 3 medium, 4 high, 5 off)
//   byte 4  bit  1     swing
//   byte 4  bits 3..7  target temperature (°C)
//   byte 6             current temperature (°C, two's complement)
//
// Bytes 0, 1 and 5 carry lock and timer flags that are not decoded.

use std::collections::BTreeMap;
use std::fmt;

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use thiserror::Error;

/// Number of status bytes the gateway reports per unit.
pub const STATUS_LEN: usize = 7;

/// Size of one frame record: slot byte plus status bytes.
pub const RECORD_LEN: usize = 1 + STATUS_LEN;

/// Why a frame failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// The frame ended inside a record.
    Truncated { needed: usize, available: usize },
    /// The same slot appeared twice.
    DuplicateSlot(u8),
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(f, "truncated record ({available} of {needed} bytes)")
            }
            Self::DuplicateSlot(slot) => write!(f, "duplicate slot {slot}"),
        }
    }
}

/// Malformed status frame. `offset` is the byte offset of the first
/// record that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("protocol error at byte offset {offset}: {kind}")]
pub struct ProtocolError {
    pub offset: usize,
    pub kind: ProtocolErrorKind,
}

/// Operating mode as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LocalMode {
    Cool,
    Heat,
    Dry,
    Fan,
    Off,
    Auto,
    Unknown(u8),
}

impl LocalMode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Cool,
            1 => Self::Heat,
            2 => Self::Dry,
            3 => Self::Fan,
            4 => Self::Off,
            5 => Self::Auto,
            other => Self::Unknown(other),
        }
    }
}

/// Fan speed as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LocalFan {
    Auto,
    Low,
    Medium,
    High,
    Off,
    Unknown(u8),
}

impl LocalFan {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Auto,
            2 => Self::Low,
            3 => Self::Medium,
            4 => Self::High,
            5 => Self::Off,
            other => Self::Unknown(other),
        }
    }
}

/// Decoded status of one indoor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub slot: u8,
    pub power: bool,
    pub mode: LocalMode,
    pub fan: LocalFan,
    pub swing: bool,
    pub target_temp: u8,
    pub current_temp: i8,
    pub error_code: u8,
}

impl UnitStatus {
    /// Decode the 7 status bytes of a single unit.
    pub fn from_status_bytes(slot: u8, raw: &[u8; STATUS_LEN]) -> Self {
        let [_, _, b2, b3, b4, _, b6] = *raw;
        let mode = LocalMode::from_code((b3 >> 2) & 0x07);
        Self {
            slot,
            power: mode != LocalMode::Off,
            mode,
            fan: LocalFan::from_code((b3 >> 5) & 0x07),
            swing: (b4 >> 1) & 0x01 != 0,
            target_temp: (b4 >> 3) & 0x1F,
            current_temp: i8::from_le_bytes([b6]),
            error_code: (b2 >> 2) & 0x3F,
        }
    }
}

/// Append one record (slot + status bytes) to a frame under construction.
pub fn push_record(frame: &mut BytesMut, slot: u8, status: &[u8; STATUS_LEN]) {
    frame.reserve(RECORD_LEN);
    frame.put_u8(slot);
    frame.put_slice(status);
}

/// Decode a full status frame into per-slot unit records.
///
/// Pure and total over well-formed frames. Unknown mode / fan codes
/// decode to their `Unknown` variants. A truncated frame or a repeated
/// slot fails the whole frame; no records are returned past the error.
pub fn decode(frame: &[u8]) -> Result<BTreeMap<u8, UnitStatus>, ProtocolError> {
    let mut units = BTreeMap::new();

    for (index, record) in frame.chunks(RECORD_LEN).enumerate() {
        let offset = index * RECORD_LEN;
        let Some((&slot, status)) = record.split_first() else {
            continue;
        };
        let Ok(status) = <&[u8; STATUS_LEN]>::try_from(status) else {
            return Err(ProtocolError {
                offset,
                kind: ProtocolErrorKind::Truncated {
                    needed: RECORD_LEN,
                    available: record.len(),
                },
            });
        };
        if units.contains_key(&slot) {
            return Err(ProtocolError {
                offset,
                kind: ProtocolErrorKind::DuplicateSlot(slot),
            });
        }
        units.insert(slot, UnitStatus::from_status_bytes(slot, status));
    }

    Ok(units)
}
