//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "RCON frame encoding and decoding."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Frame layout, all integers little-endian:
//!
//! ```text
//! i32 length | i32 request id | i32 type | payload | 0x00 0x00
//! ```
//!
//! `length` counts everything after itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::RconError;

/// Bytes after the length field that are not payload: id, type, two NULs.
pub const FRAME_OVERHEAD: usize = 10;
/// Largest payload a server sends in one response fragment.
pub const MAX_RESPONSE_PAYLOAD: usize = 4096;
/// Frames above this length are rejected as malformed.
pub const MAX_FRAME_LEN: usize = 1 << 16;
/// Request id echoed by the server when authentication fails.
pub const AUTH_FAILED_ID: i32 = -1;

/// Packet type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Authentication request carrying the password.
    Login,
    /// Command request. Authentication replies reuse this value.
    Command,
    /// Command output.
    Response,
}

impl PacketType {
    /// Wire value.
    pub fn code(self) -> i32 {
        match self {
            PacketType::Login => 3,
            PacketType::Command => 2,
            PacketType::Response => 0,
        }
    }

    /// Parse a wire value.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            3 => Some(PacketType::Login),
            2 => Some(PacketType::Command),
            0 => Some(PacketType::Response),
            _ => None,
        }
    }
}

/// One RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Correlates replies with requests.
    pub request_id: i32,
    /// Packet type.
    pub kind: PacketType,
    /// Text body without the trailing NULs.
    pub payload: String,
}

impl Packet {
    /// Build a packet.
    pub fn new(request_id: i32, kind: PacketType, payload: impl Into<String>) -> Self {
        Self {
            request_id,
            kind,
            payload: payload.into(),
        }
    }

    /// Encode including the length prefix.
    pub fn encode(&self) -> Bytes {
        let body_len = self.payload.len() + FRAME_OVERHEAD;
        let mut buf = BytesMut::with_capacity(4 + body_len);
        buf.put_i32_le(body_len as i32);
        buf.put_i32_le(self.request_id);
        buf.put_i32_le(self.kind.code());
        buf.put_slice(self.payload.as_bytes());
        buf.put_u8(0);
        buf.put_u8(0);
        buf.freeze()
    }

    /// Validate a length prefix and return the body size to read.
    pub fn body_len(prefix: i32) -> Result<usize, RconError> {
        let len = usize::try_from(prefix)
            .map_err(|_| RconError::Protocol(format!("negative frame length {prefix}")))?;
        if !(FRAME_OVERHEAD..=MAX_FRAME_LEN).contains(&len) {
            return Err(RconError::Protocol(format!(
                "frame length {len} outside {FRAME_OVERHEAD}..={MAX_FRAME_LEN}"
            )));
        }
        Ok(len)
    }

    /// Decode a frame body (everything after the length prefix).
    pub fn decode(mut body: &[u8]) -> Result<Self, RconError> {
        if body.len() < FRAME_OVERHEAD {
            return Err(RconError::Protocol(format!(
                "frame body of {} bytes is too short",
                body.len()
            )));
        }
        let request_id = body.get_i32_le();
        let code = body.get_i32_le();
        let kind = PacketType::from_code(code)
            .ok_or_else(|| RconError::Protocol(format!("unknown packet type {code}")))?;
        let Some(payload) = body.strip_suffix(&[0u8, 0u8]) else {
            return Err(RconError::Protocol("frame is not NUL terminated".into()));
        };
        Ok(Self {
            request_id,
            kind,
            payload: String::from_utf8_lossy(payload).into_owned(),
        })
    }
}
