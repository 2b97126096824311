//! # Relay Service
//!
//! One relay: its shared tables, its dispatcher, and the inbound pipeline
//! every frame goes through.
//!
//! ## Pipeline
//! 1. Declared payload above `maxPayload`: MalformedFrame, payload unread
//! 2. Magic and version (all protocols except the handshake)
//! 3. Header hash
//! 4. Route lookup from protocol id and message type
//! 5. Session resolution for token-bearing protocols
//! 6. Handler
//!
//! Each connection carries exactly one request and one reply.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::AuthConfig;
use crate::core::codec::FrameCodec;
use crate::core::frame::Frame;
use crate::error::{ErrorCode, ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatcher, RequestContext, Route};
use crate::protocol::message::{extract_token, Reply};
use crate::protocol::responder::error_frame;
use crate::protocol::ProtocolId;
use crate::state::{ConfigKey, RelayState};
use crate::utils::time::{system_clock, Clock};

pub struct RelayService {
    state: Arc<RelayState>,
    dispatcher: Dispatcher,
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new(AuthConfig::default())
    }
}

impl RelayService {
    pub fn new(auth: AuthConfig) -> Self {
        Self::with_clock(auth, system_clock())
    }

    /// Relay whose expiry checks read `clock`.
    pub fn with_clock(auth: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RelayState::new(auth, clock)),
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Publish the listening port through the `serverPort` key.
    pub fn seed_port(&self, port: u16) {
        if let Err(e) = self
            .state
            .config
            .set(ConfigKey::ServerPort.name(), &port.to_string(), true)
        {
            warn!(error = %e, "Could not seed serverPort");
        }
    }

    /// Validate and dispatch one decoded frame.
    pub fn process(&self, peer: IpAddr, frame: &Frame) -> std::result::Result<Reply, ErrorCode> {
        let header = &frame.header;
        let protocol = header.protocol();

        if protocol.map_or(true, ProtocolId::checks_envelope) && !header.has_valid_envelope() {
            return Err(ErrorCode::MagicVersionMismatch);
        }
        if !frame.verify() {
            return Err(ErrorCode::IntegrityFailure);
        }

        let protocol = protocol.ok_or(ErrorCode::MalformedFrame)?;
        let route = Route::resolve(protocol, header.msg_type).ok_or(ErrorCode::MalformedFrame)?;

        let session = if protocol.requires_session() {
            let token = extract_token(protocol, header.msg_type, &frame.payload)
                .ok_or(ErrorCode::MalformedFrame)?;
            let handle = self
                .state
                .sessions
                .lookup_by_token(token)
                .ok_or(ErrorCode::Unauthorized)?;
            self.state.sessions.touch(&handle);
            Some(handle)
        } else {
            None
        };

        let ctx = RequestContext {
            state: &self.state,
            peer,
            route,
            session,
        };
        self.dispatcher.dispatch(&ctx, &frame.payload)
    }

    /// Reply frame for one request: the handler's reply or an error frame.
    pub fn handle_frame(&self, peer: IpAddr, frame: &Frame) -> Frame {
        match self.process(peer, frame) {
            Ok(reply) => reply.into_frame(),
            Err(code) => self.reject(code),
        }
    }

    fn reject(&self, code: ErrorCode) -> Frame {
        self.state.metrics.error_reply(code);
        error_frame(code)
    }

    /// Serve one request on `stream` and close it.
    ///
    /// A read timeout or a truncated header drops the connection without a
    /// reply. A payload cut short by the peer gets a best-effort
    /// MalformedFrame.
    #[instrument(skip(self, stream), fields(peer = %peer))]
    pub async fn serve_stream<S>(&self, stream: S, peer: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = &self.state.config;
        let mut framed = Framed::new(stream, FrameCodec::new(config.max_payload()));
        let read_timeout = config.read_timeout();

        let reply = match tokio::time::timeout(read_timeout, framed.next()).await {
            Err(_) => {
                debug!(?read_timeout, "Read timed out");
                self.state.metrics.connection_dropped();
                return Err(ProtocolError::Timeout);
            }
            Ok(None) => {
                trace!("Peer closed before sending");
                return Ok(());
            }
            Ok(Some(Ok(frame))) => {
                self.state
                    .metrics
                    .frame_received(frame.encoded_len() as u64);
                debug!(
                    protocol = %format_args!("{:#06x}", frame.header.protocol_u16()),
                    msg_type = frame.msg_type(),
                    len = frame.payload.len(),
                    "Frame received"
                );
                self.handle_frame(peer.ip(), &frame)
            }
            Ok(Some(Err(ProtocolError::OversizedFrame(len)))) => {
                debug!(len, "Declared payload too large");
                self.reject(ErrorCode::MalformedFrame)
            }
            Ok(Some(Err(ProtocolError::ConnectionClosed))) => {
                debug!("Payload cut short");
                self.reject(ErrorCode::MalformedFrame)
            }
            Ok(Some(Err(e))) => {
                debug!(error = %e, "Dropping connection");
                self.state.metrics.connection_dropped();
                return Err(e);
            }
        };

        let sent = reply.encoded_len() as u64;
        framed.send(reply).await?;
        framed.close().await?;
        self.state.metrics.frame_sent(sent);
        Ok(())
    }

    /// Log the relay's counters.
    pub fn log_metrics(&self) {
        info!(
            sessions = self.state.sessions.active_count(),
            "Relay state at shutdown"
        );
        self.state.metrics.log_metrics();
    }
}
