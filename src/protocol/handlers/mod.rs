//! Sub-protocol handlers.
//!
//! Every handler is synchronous: it locks what it needs, decides, and
//! returns a [`Reply`](crate::protocol::message::Reply) or an
//! [`ErrorCode`](crate::error::ErrorCode). Token-bearing handlers re-check
//! the token in their own layout against the session the relay resolved.

pub mod auth;
pub mod config;
pub mod exec;
pub mod handshake;
pub mod teardown;
pub mod transfer;

use crate::error::ErrorCode;
use crate::state::session_registry::Session;

/// Token check shared by the session-bound handlers.
pub(crate) fn require_token(session: &Session, token: &[u8]) -> Result<(), ErrorCode> {
    if session.validate_token(token) {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}
