use tracing::{info, instrument, warn};

use crate::error::ErrorCode;
use crate::protocol::dispatcher::{Handler, HandlerResult, RequestContext, Route};
use crate::protocol::message::{encode_login_reply, parse_elevate, parse_login, Reply};
use crate::protocol::{msg, ProtocolId};
use crate::state::session_registry::{lock_session, AuthLevel, Token, TOKEN_SIZE};
use crate::state::ConfigKey;

/// `SB`: password login and privilege elevation.
///
/// Neither message goes through relay-level session resolution; login has no
/// token yet and elevation looks its token up itself.
pub struct AuthHandler;

impl Handler for AuthHandler {
    fn protocol(&self) -> ProtocolId {
        ProtocolId::Auth
    }

    fn handle(&self, ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
        match ctx.route {
            Route::Login => login(ctx, payload),
            Route::Elevate => elevate(ctx, payload),
            _ => Err(ErrorCode::MalformedFrame),
        }
    }
}

/// Fresh random session token.
pub fn generate_token() -> Option<Token> {
    let mut token = [0u8; TOKEN_SIZE];
    match getrandom::fill(&mut token) {
        Ok(()) => Some(token),
        Err(e) => {
            warn!(error = %e, "OS random source failed");
            None
        }
    }
}

#[instrument(skip_all, fields(peer = %ctx.peer))]
fn login(ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
    let state = ctx.state;
    let result = (|| {
        if !state.handshakes.has_recent(ctx.peer) {
            return Err(ErrorCode::Unauthorized);
        }
        let req = parse_login(payload).ok_or(ErrorCode::MalformedFrame)?;
        if req.password != state.auth.passphrase.as_bytes() {
            return Err(ErrorCode::Unauthorized);
        }

        // Sessions are keyed on the name, so a lossy decode would merge users.
        let username = std::str::from_utf8(req.username).map_err(|_| ErrorCode::MalformedFrame)?;
        let token = generate_token().ok_or(ErrorCode::MalformedFrame)?;
        state
            .sessions
            .create(username, token, AuthLevel::Unprivileged)
            .map_err(|e| {
                warn!(user = %username, error = %e, "Session not created");
                ErrorCode::MalformedFrame
            })?;

        info!(user = %username, "Login accepted");
        Ok(Reply::new(
            ProtocolId::Auth,
            msg::SB_RESP,
            encode_login_reply(&token, AuthLevel::Unprivileged, None),
        ))
    })();

    state.metrics.login(result.is_ok());
    result
}

#[instrument(skip_all, fields(peer = %ctx.peer))]
fn elevate(ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
    let state = ctx.state;
    if payload.len() < TOKEN_SIZE + 2 {
        return Err(ErrorCode::MalformedFrame);
    }

    let handle = state
        .sessions
        .lookup_by_token(&payload[..TOKEN_SIZE])
        .ok_or(ErrorCode::Unauthorized)?;
    let req = parse_elevate(payload).ok_or(ErrorCode::MalformedFrame)?;

    if !state.config.flag_enabled(ConfigKey::ElevationEnabled) {
        return Err(ErrorCode::Unauthorized);
    }
    if req.marker != state.auth.elevation_marker.as_bytes() {
        return Err(ErrorCode::Unauthorized);
    }

    let token = {
        let mut session = lock_session(&handle);
        if !session.is_active() {
            return Err(ErrorCode::Unauthorized);
        }
        session.set_level(AuthLevel::Admin);
        info!(user = %session.username(), "Session elevated to admin");
        *session.token()
    };
    state.sessions.touch(&handle);

    Ok(Reply::new(
        ProtocolId::Auth,
        msg::SB_RESP,
        encode_login_reply(
            &token,
            AuthLevel::Admin,
            Some(state.auth.admin_grant.as_bytes()),
        ),
    ))
}
