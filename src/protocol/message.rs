//! Payload layouts for every request and reply.
//!
//! Parsers borrow from the payload and return `None` for any shape error;
//! handlers turn that into [`ErrorCode::MalformedFrame`](crate::error::ErrorCode).
//! Strings on the wire are NUL-terminated.

use crate::core::frame::Frame;
use crate::core::hash::MD5_SIZE;
use crate::core::header::{MAGIC, PROTOCOL_VERSION};
use crate::protocol::{msg, ProtocolId};
use crate::state::session_registry::{AuthLevel, Token, MAX_USERNAME_LEN, TOKEN_SIZE};

/// Algorithms the relay advertises in its handshake reply.
pub const SERVER_HASHES: &str = "Blake3, MD5";

/// Largest chunk a single DATA frame may carry.
pub const MAX_CHUNK: usize = 256;

/// Length of the privileged grant field in an elevation reply.
pub const GRANT_LEN: usize = 15;

/// Length of the C-style string at the start of `bytes` (up to the first NUL).
pub fn strnlen(bytes: &[u8]) -> usize {
    bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len())
}

fn token_at(payload: &[u8], pos: usize) -> Option<&[u8]> {
    payload.get(pos..pos.checked_add(TOKEN_SIZE)?)
}

/// Outgoing reply, before framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub protocol: ProtocolId,
    pub msg_type: u8,
    pub payload: Vec<u8>,
}

impl Reply {
    pub fn new(protocol: ProtocolId, msg_type: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            protocol,
            msg_type,
            payload: payload.into(),
        }
    }

    pub fn into_frame(self) -> Frame {
        Frame::build(self.protocol, self.msg_type, self.payload)
    }
}

// ---------------------------------------------------------------------------
// Handshake

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest<'a> {
    pub magic_part: u16,
    pub version: u8,
    /// Hash names, up to the first NUL.
    pub hashes: &'a [u8],
}

impl HandshakeRequest<'_> {
    /// Case-insensitive search for `blake3` in the hash list.
    pub fn supports_blake3(&self) -> bool {
        const TAG: &[u8] = b"blake3";
        self.hashes
            .windows(TAG.len())
            .any(|w| w.eq_ignore_ascii_case(TAG))
    }
}

pub fn parse_handshake(payload: &[u8]) -> Option<HandshakeRequest<'_>> {
    if payload.len() < 3 {
        return None;
    }
    let list = &payload[3..];
    Some(HandshakeRequest {
        magic_part: u16::from_le_bytes([payload[0], payload[1]]),
        version: payload[2],
        hashes: &list[..strnlen(list)],
    })
}

pub fn encode_handshake(magic_part: u16, version: u8, hashes: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 + hashes.len());
    out.extend_from_slice(&magic_part.to_le_bytes());
    out.push(version);
    out.extend_from_slice(hashes.as_bytes());
    out
}

/// The relay's reply: first two magic bytes, version, advertised hashes.
pub fn handshake_reply_payload() -> Vec<u8> {
    let magic_part = u16::from_le_bytes([MAGIC[0], MAGIC[1]]);
    encode_handshake(magic_part, PROTOCOL_VERSION, SERVER_HASHES)
}

// ---------------------------------------------------------------------------
// Auth

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest<'a> {
    pub username: &'a [u8],
    pub password: &'a [u8],
}

/// `username\0password\0`, each at most 8 bytes.
pub fn parse_login(payload: &[u8]) -> Option<LoginRequest<'_>> {
    let u_len = strnlen(payload);
    if u_len > MAX_USERNAME_LEN || u_len >= payload.len() {
        return None;
    }
    let rest = &payload[u_len + 1..];
    let p_len = strnlen(rest);
    if p_len > MAX_USERNAME_LEN || p_len >= rest.len() {
        return None;
    }
    Some(LoginRequest {
        username: &payload[..u_len],
        password: &rest[..p_len],
    })
}

pub fn encode_login(username: &str, password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(username.len() + password.len() + 2);
    out.extend_from_slice(username.as_bytes());
    out.push(0);
    out.extend_from_slice(password.as_bytes());
    out.push(0);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevateRequest<'a> {
    pub token: &'a [u8],
    /// Marker text without its NUL.
    pub marker: &'a [u8],
}

/// `token(16) marker\0`. The marker must be non-empty and terminated.
pub fn parse_elevate(payload: &[u8]) -> Option<ElevateRequest<'_>> {
    if payload.len() < TOKEN_SIZE + 2 {
        return None;
    }
    let area = &payload[TOKEN_SIZE..];
    let m_len = strnlen(area);
    if m_len == 0 || m_len >= area.len() {
        return None;
    }
    Some(ElevateRequest {
        token: &payload[..TOKEN_SIZE],
        marker: &area[..m_len],
    })
}

pub fn encode_elevate(token: &Token, marker: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(TOKEN_SIZE + marker.len() + 1);
    out.extend_from_slice(token);
    out.extend_from_slice(marker.as_bytes());
    out.push(0);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReply {
    pub accepted: bool,
    pub token: Token,
    pub level: AuthLevel,
    pub grant: Option<Vec<u8>>,
}

/// `accept(1) token(16) level(1) [grant(15)]`.
pub fn encode_login_reply(token: &Token, level: AuthLevel, grant: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + TOKEN_SIZE + GRANT_LEN);
    out.push(0x01);
    out.extend_from_slice(token);
    out.push(level.wire_byte());
    if let Some(grant) = grant {
        let mut field = [0u8; GRANT_LEN];
        let n = grant.len().min(GRANT_LEN);
        field[..n].copy_from_slice(&grant[..n]);
        out.extend_from_slice(&field);
    }
    out
}

pub fn parse_login_reply(payload: &[u8]) -> Option<LoginReply> {
    if payload.len() < 2 + TOKEN_SIZE {
        return None;
    }
    let mut token = [0u8; TOKEN_SIZE];
    token.copy_from_slice(&payload[1..1 + TOKEN_SIZE]);
    let grant = payload.get(2 + TOKEN_SIZE..).filter(|g| !g.is_empty());
    Some(LoginReply {
        accepted: payload[0] == 0x01,
        token,
        level: AuthLevel::from_wire(payload[1 + TOKEN_SIZE])?,
        grant: grant.map(<[u8]>::to_vec),
    })
}

// ---------------------------------------------------------------------------
// Transfer

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtsRequest<'a> {
    pub size: u32,
    pub token: &'a [u8],
}

/// `size(4, LE) token(16)`.
pub fn parse_rts(payload: &[u8]) -> Option<RtsRequest<'_>> {
    if payload.len() < 4 + TOKEN_SIZE {
        return None;
    }
    Some(RtsRequest {
        size: u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
        token: &payload[4..4 + TOKEN_SIZE],
    })
}

pub fn encode_rts(size: u32, token: &Token) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + TOKEN_SIZE);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(token);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChunk<'a> {
    pub data: &'a [u8],
    pub tag: &'a [u8],
    pub token: &'a [u8],
}

/// `data(n) md5(16) token(16)`, with `n <= 256`.
pub fn parse_data(payload: &[u8]) -> Option<DataChunk<'_>> {
    let tail = MD5_SIZE + TOKEN_SIZE;
    let n = payload.len().checked_sub(tail)?;
    if n > MAX_CHUNK {
        return None;
    }
    Some(DataChunk {
        data: &payload[..n],
        tag: &payload[n..n + MD5_SIZE],
        token: &payload[n + MD5_SIZE..],
    })
}

pub fn encode_data(data: &[u8], tag: &[u8; MD5_SIZE], token: &Token) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + MD5_SIZE + TOKEN_SIZE);
    out.extend_from_slice(data);
    out.extend_from_slice(tag);
    out.extend_from_slice(token);
    out
}

// ---------------------------------------------------------------------------
// Config

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigGet<'a> {
    pub key: &'a [u8],
    pub token: &'a [u8],
}

/// `key\0 token(16)`.
pub fn parse_config_get(payload: &[u8]) -> Option<ConfigGet<'_>> {
    let k_len = strnlen(payload);
    if k_len == 0 || k_len >= payload.len() {
        return None;
    }
    Some(ConfigGet {
        key: &payload[..k_len],
        token: token_at(payload, k_len + 1)?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSet<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
    pub token: &'a [u8],
}

/// `key\0 value\0 token(16)`. The value may be empty.
pub fn parse_config_set(payload: &[u8]) -> Option<ConfigSet<'_>> {
    let k_len = strnlen(payload);
    if k_len == 0 || k_len >= payload.len() {
        return None;
    }
    let pos = k_len + 1;
    let v_len = strnlen(&payload[pos..]);
    if v_len >= payload.len() - pos {
        return None;
    }
    Some(ConfigSet {
        key: &payload[..k_len],
        value: &payload[pos..pos + v_len],
        token: token_at(payload, pos + v_len + 1)?,
    })
}

pub fn encode_config_get(key: &str, token: &Token) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1 + TOKEN_SIZE);
    out.extend_from_slice(key.as_bytes());
    out.push(0);
    out.extend_from_slice(token);
    out
}

pub fn encode_config_set(key: &str, value: &str, token: &Token) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + value.len() + 2 + TOKEN_SIZE);
    out.extend_from_slice(key.as_bytes());
    out.push(0);
    out.extend_from_slice(value.as_bytes());
    out.push(0);
    out.extend_from_slice(token);
    out
}

/// Outcome of a Config-Set that reached the policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
}

impl Decision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Deny => "deny",
        }
    }
}

/// `key\0 decision\0`.
pub fn encode_decision(key: &[u8], decision: Decision) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 9);
    out.extend_from_slice(key);
    out.push(0);
    out.extend_from_slice(decision.as_str().as_bytes());
    out.push(0);
    out
}

pub fn parse_decision(payload: &[u8]) -> Option<(String, Decision)> {
    let k_len = strnlen(payload);
    let rest = payload.get(k_len + 1..)?;
    let decision = match &rest[..strnlen(rest)] {
        b"approve" => Decision::Approve,
        b"deny" => Decision::Deny,
        _ => return None,
    };
    Some((String::from_utf8_lossy(&payload[..k_len]).into_owned(), decision))
}

/// Value text followed by NUL.
pub fn encode_value(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 1);
    out.extend_from_slice(value.as_bytes());
    out.push(0);
    out
}

pub fn parse_value(payload: &[u8]) -> String {
    String::from_utf8_lossy(&payload[..strnlen(payload)]).into_owned()
}

// ---------------------------------------------------------------------------
// Exec and teardown

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest<'a> {
    pub command: &'a [u8],
    pub token: &'a [u8],
}

/// `command\0 token(16)`.
pub fn parse_exec(payload: &[u8]) -> Option<ExecRequest<'_>> {
    let c_len = strnlen(payload);
    if c_len >= payload.len() {
        return None;
    }
    Some(ExecRequest {
        command: &payload[..c_len],
        token: token_at(payload, c_len + 1)?,
    })
}

pub fn encode_exec(command: &str, token: &Token) -> Vec<u8> {
    encode_config_get(command, token)
}

/// `token(16)`.
pub fn parse_teardown(payload: &[u8]) -> Option<&[u8]> {
    token_at(payload, 0)
}

// ---------------------------------------------------------------------------
// Session token location

/// Where the session token sits for each token-bearing request.
///
/// Only the bytes needed to find the token are checked here; the handler
/// validates the rest of the layout.
pub fn extract_token(protocol: ProtocolId, msg_type: u8, payload: &[u8]) -> Option<&[u8]> {
    match (protocol, msg_type) {
        (ProtocolId::Transfer, msg::BC_RTS) => token_at(payload, 4),
        (ProtocolId::Transfer, msg::BC_DATA) => {
            if payload.len() < MD5_SIZE + TOKEN_SIZE {
                return None;
            }
            token_at(payload, payload.len() - TOKEN_SIZE)
        }
        (ProtocolId::Config, msg::NW_GETCFG) => {
            let k_len = strnlen(payload);
            if k_len >= payload.len() {
                return None;
            }
            token_at(payload, k_len + 1)
        }
        (ProtocolId::Config, msg::NW_SETCFG) => {
            let k_len = strnlen(payload);
            if k_len >= payload.len() {
                return None;
            }
            let pos = k_len + 1;
            let v_len = strnlen(&payload[pos..]);
            if pos + v_len >= payload.len() {
                return None;
            }
            token_at(payload, pos + v_len + 1)
        }
        (ProtocolId::Exec, _) => parse_exec(payload).map(|r| r.token),
        (ProtocolId::Teardown, _) => parse_teardown(payload),
        _ => None,
    }
}
