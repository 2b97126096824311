use tracing::{debug, instrument, warn};

use crate::error::ErrorCode;
use crate::protocol::dispatcher::{Handler, HandlerResult, RequestContext};
use crate::protocol::handlers::require_token;
use crate::protocol::message::{parse_exec, Reply};
use crate::protocol::{msg, ProtocolId};
use crate::state::config_store::MAX_CMD_LEN;
use crate::state::session_registry::{lock_session, AuthLevel, TOKEN_SIZE};
use crate::state::ConfigKey;

/// `UW`: remote command channel.
///
/// Commands are accepted, bounded and logged, never run. Every gate is
/// checked before the command touches the fixed copy buffer.
pub struct ExecHandler;

/// Result byte returned for an accepted command.
pub const EXEC_ACCEPTED: u8 = 0x00;

impl Handler for ExecHandler {
    fn protocol(&self) -> ProtocolId {
        ProtocolId::Exec
    }

    #[instrument(skip_all, fields(peer = %ctx.peer))]
    fn handle(&self, ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
        if payload.len() < TOKEN_SIZE + 1 {
            return Err(ErrorCode::MalformedFrame);
        }
        let req = parse_exec(payload).ok_or(ErrorCode::MalformedFrame)?;

        let level = {
            let session = lock_session(ctx.session()?);
            require_token(&session, req.token)?;
            session.level()
        };
        if level != AuthLevel::Admin {
            return Err(ErrorCode::CommandDenied);
        }

        let config = &ctx.state.config;
        if !config.flag_enabled(ConfigKey::CommandExecEnabled) {
            return Err(ErrorCode::CommandDenied);
        }
        let limit = config.command_size_limit();
        if req.command.len() > limit {
            warn!(len = req.command.len(), limit, "Command over size limit");
            return Err(ErrorCode::CommandDenied);
        }

        let mut buf = [0u8; MAX_CMD_LEN];
        buf[..req.command.len()].copy_from_slice(req.command);
        debug!(
            command = %String::from_utf8_lossy(&buf[..req.command.len()]),
            "Command accepted"
        );

        Ok(Reply::new(ProtocolId::Exec, msg::UW_RESULT, [EXEC_ACCEPTED]))
    }
}
