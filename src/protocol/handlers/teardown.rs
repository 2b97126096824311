use tracing::{info, instrument};

use crate::error::ErrorCode;
use crate::protocol::dispatcher::{Handler, HandlerResult, RequestContext};
use crate::protocol::{msg, ProtocolId};
use crate::protocol::message::Reply;
use crate::state::session_registry::lock_session;

/// `ER`: end a session.
pub struct TeardownHandler;

impl Handler for TeardownHandler {
    fn protocol(&self) -> ProtocolId {
        ProtocolId::Teardown
    }

    #[instrument(skip_all, fields(peer = %ctx.peer))]
    fn handle(&self, ctx: &RequestContext<'_>, _payload: &[u8]) -> HandlerResult {
        let handle = ctx.session()?;
        {
            let session = lock_session(handle);
            if !session.is_active() {
                return Err(ErrorCode::Unauthorized);
            }
            info!(user = %session.username(), "Session closed by client");
        }
        ctx.state.sessions.invalidate(handle);
        Ok(Reply::new(ProtocolId::Teardown, msg::ER_RESP, [0x00]))
    }
}
