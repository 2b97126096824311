use tracing::{debug, info, instrument};

use crate::error::ErrorCode;
use crate::protocol::dispatcher::{Handler, HandlerResult, RequestContext, Route};
use crate::protocol::handlers::require_token;
use crate::protocol::message::{
    encode_decision, encode_value, parse_config_get, parse_config_set, Decision, Reply,
};
use crate::protocol::{msg, ProtocolId};
use crate::state::session_registry::{lock_session, AuthLevel};
use crate::state::ConfigKey;

/// `NW`: read and write runtime configuration.
pub struct ConfigHandler;

impl Handler for ConfigHandler {
    fn protocol(&self) -> ProtocolId {
        ProtocolId::Config
    }

    fn handle(&self, ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
        match ctx.route {
            Route::ConfigGet => get(ctx, payload),
            Route::ConfigSet => set(ctx, payload),
            _ => Err(ErrorCode::MalformedFrame),
        }
    }
}

/// Caller's level after checking `token`. The session lock is released on
/// return.
fn caller_level(ctx: &RequestContext<'_>, token: &[u8]) -> Result<AuthLevel, ErrorCode> {
    let session = lock_session(ctx.session()?);
    require_token(&session, token)?;
    Ok(session.level())
}

#[instrument(skip_all, fields(peer = %ctx.peer))]
fn get(ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
    let req = parse_config_get(payload).ok_or(ErrorCode::MalformedFrame)?;
    caller_level(ctx, req.token)?;

    let key = std::str::from_utf8(req.key).map_err(|_| ErrorCode::ConfigNotFound)?;
    let value = ctx.state.config.get(key).ok_or(ErrorCode::ConfigNotFound)?;
    debug!(key, %value, "Config read");
    Ok(Reply::new(
        ProtocolId::Config,
        msg::NW_GETCFG,
        encode_value(&value),
    ))
}

#[instrument(skip_all, fields(peer = %ctx.peer))]
fn set(ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
    let req = parse_config_set(payload).ok_or(ErrorCode::MalformedFrame)?;
    let level = caller_level(ctx, req.token)?;

    let key = std::str::from_utf8(req.key)
        .ok()
        .filter(|k| ConfigKey::from_name(k).is_some())
        .ok_or(ErrorCode::ConfigNotFound)?;
    let value = std::str::from_utf8(req.value).map_err(|_| ErrorCode::MalformedFrame)?;

    let store = &ctx.state.config;
    if !store.can_write(level, key) {
        debug!(key, ?level, "Config write denied");
        return Ok(Reply::new(
            ProtocolId::Config,
            msg::NW_APPROVE,
            encode_decision(req.key, Decision::Deny),
        ));
    }

    store
        .set(key, value, level == AuthLevel::Admin)
        .map_err(|_| ErrorCode::ConfigNotFound)?;
    info!(key, value, ?level, "Config write approved");
    Ok(Reply::new(
        ProtocolId::Config,
        msg::NW_APPROVE,
        encode_decision(req.key, Decision::Approve),
    ))
}
