use tracing::{debug, instrument};

use crate::error::ErrorCode;
use crate::protocol::dispatcher::{Handler, HandlerResult, RequestContext};
use crate::protocol::message::{handshake_reply_payload, parse_handshake, Reply};
use crate::protocol::{msg, ProtocolId};

/// `AR`: capability handshake.
///
/// The client lists the hashes it supports; BLAKE3 is mandatory. A valid
/// handshake opens a short login window for the client's address.
pub struct HandshakeHandler;

impl Handler for HandshakeHandler {
    fn protocol(&self) -> ProtocolId {
        ProtocolId::Handshake
    }

    #[instrument(skip_all, fields(peer = %ctx.peer))]
    fn handle(&self, ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
        let req = parse_handshake(payload).ok_or(ErrorCode::MalformedFrame)?;
        if !req.supports_blake3() {
            debug!(hashes = %String::from_utf8_lossy(req.hashes), "Client lacks blake3");
            return Err(ErrorCode::MalformedFrame);
        }

        ctx.state.handshakes.mark(ctx.peer);
        ctx.state.metrics.handshake_accepted();

        Ok(Reply::new(
            ProtocolId::Handshake,
            msg::AR_RESP,
            handshake_reply_payload(),
        ))
    }
}
