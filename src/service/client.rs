use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

use crate::core::codec::FrameCodec;
use crate::core::frame::{Frame, MAX_PAYLOAD_LEN};
use crate::core::hash::{md5_digest, MD5_SIZE};
use crate::core::header::{MAGIC, PROTOCOL_VERSION};
use crate::error::constants::{ERR_REPLY_INTEGRITY, ERR_UNEXPECTED_REPLY};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::{
    encode_config_get, encode_config_set, encode_data, encode_elevate, encode_exec,
    encode_handshake, encode_login, encode_rts, parse_decision, parse_handshake,
    parse_login_reply, parse_value, Decision, LoginReply,
};
use crate::protocol::responder::parse_error_frame;
use crate::protocol::{msg, ProtocolId};
use crate::state::session_registry::{Token, TOKEN_SIZE};
use crate::utils::timeout::{with_timeout_error, CLIENT_TIMEOUT};

/// Largest chunk that still fits a DATA frame under the payload ceiling.
pub const UPLOAD_CHUNK: usize = MAX_PAYLOAD_LEN - MD5_SIZE - TOKEN_SIZE;

/// Client for a relay.
///
/// The relay serves one request per connection, so every call opens a fresh
/// TCP connection, sends one frame and reads one reply. Error frames come
/// back as [`ProtocolError::Remote`].
#[derive(Debug, Clone)]
pub struct RelayClient {
    addr: String,
    timeout: Duration,
}

impl RelayClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: CLIENT_TIMEOUT,
        }
    }

    /// Bound on connecting and on waiting for each reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<TcpStream> {
        with_timeout_error(
            async {
                TcpStream::connect(&self.addr)
                    .await
                    .map_err(ProtocolError::from)
            },
            self.timeout,
        )
        .await
    }

    /// Send `frame` and return the verified reply, error frames included.
    #[instrument(skip(self, frame), fields(addr = %self.addr, msg_type = frame.msg_type()))]
    pub async fn exchange(&self, frame: Frame) -> Result<Frame> {
        let stream = self.connect().await?;
        let mut framed = Framed::new(stream, FrameCodec::default());
        framed.send(frame).await?;

        let reply = with_timeout_error(
            async {
                match framed.next().await {
                    Some(result) => result,
                    None => Err(ProtocolError::ConnectionClosed),
                }
            },
            self.timeout,
        )
        .await?;

        if !reply.verify() {
            return Err(ProtocolError::UnexpectedReply(ERR_REPLY_INTEGRITY.to_string()));
        }
        debug!(msg_type = reply.msg_type(), len = reply.payload.len(), "Reply received");
        Ok(reply)
    }

    /// Like [`exchange`](Self::exchange), but error frames become
    /// [`ProtocolError::Remote`] and any other reply must be `expected`.
    pub async fn request(&self, frame: Frame, expected: (ProtocolId, u8)) -> Result<Frame> {
        let reply = self.exchange(frame).await?;
        if let Some(code) = parse_error_frame(&reply) {
            return Err(ProtocolError::Remote(code));
        }
        if reply.protocol() != Some(expected.0) || reply.msg_type() != expected.1 {
            return Err(unexpected(&reply));
        }
        Ok(reply)
    }

    /// Write raw bytes and read whatever comes back until the relay closes.
    /// `None` when the relay closed without replying.
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<Option<Frame>> {
        let mut stream = self.connect().await?;
        stream.write_all(bytes).await?;

        let mut buf = Vec::new();
        with_timeout_error(
            async { stream.read_to_end(&mut buf).await.map_err(ProtocolError::from) },
            self.timeout,
        )
        .await?;

        if buf.is_empty() {
            return Ok(None);
        }
        Frame::decode(&buf).map(Some)
    }

    /// Capability handshake. Returns the relay's advertised hash list.
    pub async fn handshake(&self, hashes: &str) -> Result<String> {
        let magic_part = u16::from_le_bytes([MAGIC[0], MAGIC[1]]);
        let frame = Frame::build(
            ProtocolId::Handshake,
            msg::AR_REQ,
            encode_handshake(magic_part, PROTOCOL_VERSION, hashes),
        );
        let reply = self
            .request(frame, (ProtocolId::Handshake, msg::AR_RESP))
            .await?;
        let parsed = parse_handshake(&reply.payload).ok_or_else(|| unexpected(&reply))?;
        Ok(String::from_utf8_lossy(parsed.hashes).into_owned())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginReply> {
        let frame = Frame::build(ProtocolId::Auth, msg::SB_REQ, encode_login(username, password));
        let reply = self.request(frame, (ProtocolId::Auth, msg::SB_RESP)).await?;
        parse_login_reply(&reply.payload).ok_or_else(|| unexpected(&reply))
    }

    /// Handshake then login, as a fresh client would.
    pub async fn connect_session(&self, username: &str, password: &str) -> Result<Token> {
        self.handshake("blake3,md5").await?;
        Ok(self.login(username, password).await?.token)
    }

    pub async fn elevate(&self, token: &Token, marker: &str) -> Result<LoginReply> {
        let frame = Frame::build(ProtocolId::Auth, msg::SB_ELEVATE, encode_elevate(token, marker));
        let reply = self.request(frame, (ProtocolId::Auth, msg::SB_RESP)).await?;
        parse_login_reply(&reply.payload).ok_or_else(|| unexpected(&reply))
    }

    /// Announce a transfer of `size` bytes.
    pub async fn request_to_send(&self, token: &Token, size: u32) -> Result<()> {
        let frame = Frame::build(ProtocolId::Transfer, msg::BC_RTS, encode_rts(size, token));
        self.request(frame, (ProtocolId::Transfer, msg::BC_CTS))
            .await
            .map(|_| ())
    }

    /// Send one chunk tagged with its MD5.
    pub async fn send_chunk(&self, token: &Token, data: &[u8]) -> Result<()> {
        let tag = md5_digest(data);
        let frame = Frame::build(
            ProtocolId::Transfer,
            msg::BC_DATA,
            encode_data(data, &tag, token),
        );
        self.request(frame, (ProtocolId::Transfer, msg::BC_ACK))
            .await
            .map(|_| ())
    }

    /// Announce and send `data` in chunks of at most [`UPLOAD_CHUNK`] bytes.
    pub async fn upload(&self, token: &Token, data: &[u8]) -> Result<()> {
        let size = u32::try_from(data.len())
            .map_err(|_| ProtocolError::Custom("upload too large".to_string()))?;
        self.request_to_send(token, size).await?;
        for chunk in data.chunks(UPLOAD_CHUNK) {
            self.send_chunk(token, chunk).await?;
        }
        Ok(())
    }

    pub async fn config_get(&self, token: &Token, key: &str) -> Result<String> {
        let frame = Frame::build(ProtocolId::Config, msg::NW_GETCFG, encode_config_get(key, token));
        let reply = self.request(frame, (ProtocolId::Config, msg::NW_GETCFG)).await?;
        Ok(parse_value(&reply.payload))
    }

    pub async fn config_set(&self, token: &Token, key: &str, value: &str) -> Result<Decision> {
        let frame = Frame::build(
            ProtocolId::Config,
            msg::NW_SETCFG,
            encode_config_set(key, value, token),
        );
        let reply = self.request(frame, (ProtocolId::Config, msg::NW_APPROVE)).await?;
        parse_decision(&reply.payload)
            .map(|(_, decision)| decision)
            .ok_or_else(|| unexpected(&reply))
    }

    /// Submit a command. Returns the relay's result byte.
    pub async fn exec(&self, token: &Token, command: &str) -> Result<u8> {
        let frame = Frame::build(ProtocolId::Exec, msg::UW_EXEC, encode_exec(command, token));
        let reply = self.request(frame, (ProtocolId::Exec, msg::UW_RESULT)).await?;
        reply.payload.first().copied().ok_or_else(|| unexpected(&reply))
    }

    pub async fn teardown(&self, token: &Token) -> Result<()> {
        let frame = Frame::build(ProtocolId::Teardown, msg::ER_REQ, token.to_vec());
        self.request(frame, (ProtocolId::Teardown, msg::ER_RESP))
            .await
            .map(|_| ())
    }
}

fn unexpected(reply: &Frame) -> ProtocolError {
    ProtocolError::UnexpectedReply(format!(
        "{ERR_UNEXPECTED_REPLY}: {:#06x}/{:#04x} ({} bytes)",
        reply.header.protocol_u16(),
        reply.msg_type(),
        reply.payload.len()
    ))
}
