use std::collections::HashMap;
use std::net::IpAddr;

use tracing::{debug, instrument};

use crate::error::ErrorCode;
use crate::protocol::handlers;
use crate::protocol::message::Reply;
use crate::protocol::{msg, ProtocolId};
use crate::state::{RelayState, SessionHandle};

/// Handler outcome: a reply frame, or an error to report.
pub type HandlerResult = std::result::Result<Reply, ErrorCode>;

/// A request the relay knows how to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Handshake,
    Login,
    Elevate,
    TransferRts,
    TransferData,
    ConfigGet,
    ConfigSet,
    Exec,
    Teardown,
}

impl Route {
    /// Route for a protocol and message type. Reply types and unlisted
    /// types have no route.
    pub fn resolve(protocol: ProtocolId, msg_type: u8) -> Option<Self> {
        Some(match (protocol, msg_type) {
            (ProtocolId::Handshake, msg::AR_REQ) => Route::Handshake,
            (ProtocolId::Auth, msg::SB_REQ) => Route::Login,
            (ProtocolId::Auth, msg::SB_ELEVATE) => Route::Elevate,
            (ProtocolId::Transfer, msg::BC_RTS) => Route::TransferRts,
            (ProtocolId::Transfer, msg::BC_DATA) => Route::TransferData,
            (ProtocolId::Config, msg::NW_GETCFG) => Route::ConfigGet,
            (ProtocolId::Config, msg::NW_SETCFG) => Route::ConfigSet,
            (ProtocolId::Exec, msg::UW_EXEC) => Route::Exec,
            (ProtocolId::Teardown, msg::ER_REQ) => Route::Teardown,
            _ => return None,
        })
    }

    pub const fn protocol(self) -> ProtocolId {
        match self {
            Route::Handshake => ProtocolId::Handshake,
            Route::Login | Route::Elevate => ProtocolId::Auth,
            Route::TransferRts | Route::TransferData => ProtocolId::Transfer,
            Route::ConfigGet | Route::ConfigSet => ProtocolId::Config,
            Route::Exec => ProtocolId::Exec,
            Route::Teardown => ProtocolId::Teardown,
        }
    }
}

/// Per-request inputs shared by every handler.
pub struct RequestContext<'a> {
    pub state: &'a RelayState,
    pub peer: IpAddr,
    pub route: Route,
    /// Resolved and refreshed session for token-bearing protocols.
    pub session: Option<SessionHandle>,
}

impl RequestContext<'_> {
    /// The resolved session, or `Unauthorized` when there is none.
    pub fn session(&self) -> Result<&SessionHandle, ErrorCode> {
        self.session.as_ref().ok_or(ErrorCode::Unauthorized)
    }
}

/// One implementation per sub-protocol.
pub trait Handler: Send + Sync {
    fn protocol(&self) -> ProtocolId;

    fn handle(&self, ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult;
}

/// Routes verified frames to sub-protocol handlers.
pub struct Dispatcher {
    handlers: HashMap<ProtocolId, Box<dyn Handler>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Dispatcher with the six relay handlers registered.
    pub fn new() -> Self {
        let mut d = Self::empty();
        d.register(Box::new(handlers::handshake::HandshakeHandler));
        d.register(Box::new(handlers::auth::AuthHandler));
        d.register(Box::new(handlers::transfer::TransferHandler));
        d.register(Box::new(handlers::config::ConfigHandler));
        d.register(Box::new(handlers::exec::ExecHandler));
        d.register(Box::new(handlers::teardown::TeardownHandler));
        d
    }

    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one for its protocol.
    pub fn register(&mut self, handler: Box<dyn Handler>) {
        self.handlers.insert(handler.protocol(), handler);
    }

    /// Run the handler for `ctx.route`.
    #[instrument(skip(self, ctx, payload), fields(route = ?ctx.route, peer = %ctx.peer))]
    pub fn dispatch(&self, ctx: &RequestContext<'_>, payload: &[u8]) -> HandlerResult {
        let handler = self
            .handlers
            .get(&ctx.route.protocol())
            .ok_or(ErrorCode::MalformedFrame)?;
        let result = handler.handle(ctx, payload);
        if let Err(code) = &result {
            debug!(%code, "Handler rejected request");
        }
        result
    }
}
