use tracing::{debug, instrument};

use crate::core::hash::verify_md5_tag;
use crate::error::ErrorCode;
use crate::protocol::dispatcher::{Handler, HandlerResult, RequestContext, Route};
use crate::protocol::handlers::require_token;
use crate::protocol::message::{parse_data, parse_rts, Reply};
use crate::protocol::{msg, ProtocolId};
use crate::state::session_registry::{lock_session, TransferState};

/// `BC`: announced chunked uploads.
///
/// An RTS announces the total size; DATA chunks are then counted against it
/// until the remainder reaches zero. Chunk contents are verified and
/// discarded.
pub struct TransferHandler;

impl Handler for TransferHandler {
    fn protocol(&self) -> ProtocolId {
        ProtocolId::Transfer
    }

    fn handle(&self, ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
        match ctx.route {
            Route::TransferRts => request_to_send(ctx, payload),
            Route::TransferData => data(ctx, payload),
            _ => Err(ErrorCode::MalformedFrame),
        }
    }
}

#[instrument(skip_all, fields(peer = %ctx.peer))]
fn request_to_send(ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
    let req = parse_rts(payload).ok_or(ErrorCode::MalformedFrame)?;
    let handle = ctx.session()?;
    let max = ctx.state.config.max_chunk_size();

    let mut session = lock_session(handle);
    require_token(&session, req.token)?;
    if max < 0 || i64::from(req.size) > max {
        debug!(size = req.size, max, "Transfer exceeds policy");
        return Err(ErrorCode::TransferPolicyViolation);
    }

    session.set_transfer(TransferState::Receiving {
        remaining: req.size,
    });
    debug!(user = %session.username(), size = req.size, "Transfer announced");
    Ok(Reply::new(ProtocolId::Transfer, msg::BC_CTS, [0x01]))
}

/// The session lock is held across the whole chunk so two chunks for one
/// session never interleave their accounting.
#[instrument(skip_all, fields(peer = %ctx.peer, len = payload.len()))]
fn data(ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
    let handle = ctx.session()?;
    let mut session = lock_session(handle);

    let remaining = match session.transfer() {
        TransferState::Receiving { remaining } => remaining,
        TransferState::Idle => return Err(ErrorCode::MalformedFrame),
    };

    let chunk = parse_data(payload).ok_or(ErrorCode::MalformedFrame)?;
    require_token(&session, chunk.token)?;

    let n = chunk.data.len() as u32;
    if n > remaining {
        session.set_transfer(TransferState::Idle);
        debug!(n, remaining, "Chunk overruns announced size");
        return Err(ErrorCode::TransferPolicyViolation);
    }

    if !verify_md5_tag(chunk.tag, chunk.data) {
        return Err(ErrorCode::ChunkIntegrityFailure);
    }

    let left = remaining - n;
    if left == 0 {
        session.set_transfer(TransferState::Idle);
        debug!(user = %session.username(), "Transfer complete");
    } else {
        session.set_transfer(TransferState::Receiving { remaining: left });
    }
    Ok(Reply::new(ProtocolId::Transfer, msg::BC_ACK, Vec::new()))
}
