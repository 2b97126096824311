//! # Session Registry
//!
//! Bounded table of authenticated sessions keyed by a random 16-byte token.
//!
//! ## Behavior
//! - **One per user**: creating a session invalidates any active session
//!   with the same username
//! - **Bounded**: active sessions never exceed the configured `maxSess`, and
//!   the table never holds more than [`HARD_SESSION_CAP`] slots
//! - **Lazy expiry**: a session idle longer than `tknExpire` is marked
//!   inactive the next time it is looked up; there is no background sweep
//!
//! Each session lives behind its own mutex. The table lock is always taken
//! before a session lock, never the other way around.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::state::config_store::ConfigStore;
use crate::state::lock;
use crate::utils::time::Clock;

pub const TOKEN_SIZE: usize = 16;
pub const HARD_SESSION_CAP: usize = 100;
pub const MAX_USERNAME_LEN: usize = 8;

pub type Token = [u8; TOKEN_SIZE];

/// Authorization level carried in login replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthLevel {
    None,
    Unprivileged,
    Admin,
}

impl AuthLevel {
    pub const fn wire_byte(self) -> u8 {
        match self {
            AuthLevel::None => 0xFF,
            AuthLevel::Unprivileged => 0x00,
            AuthLevel::Admin => 0x01,
        }
    }

    pub const fn from_wire(b: u8) -> Option<Self> {
        match b {
            0xFF => Some(AuthLevel::None),
            0x00 => Some(AuthLevel::Unprivileged),
            0x01 => Some(AuthLevel::Admin),
            _ => None,
        }
    }
}

/// Transfer progress for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    Receiving { remaining: u32 },
}

#[derive(Debug, Clone)]
pub struct Session {
    username: String,
    token: Token,
    last_activity: u64,
    level: AuthLevel,
    active: bool,
    transfer: TransferState,
}

impl Session {
    fn new(username: &str, token: Token, level: AuthLevel, now: u64) -> Self {
        Self {
            username: username.to_string(),
            token,
            last_activity: now,
            level,
            active: true,
            transfer: TransferState::Idle,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn level(&self) -> AuthLevel {
        self.level
    }

    pub fn set_level(&mut self, level: AuthLevel) {
        self.level = level;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    pub fn transfer(&self) -> TransferState {
        self.transfer
    }

    pub fn set_transfer(&mut self, state: TransferState) {
        self.transfer = state;
    }

    /// Exact token match on an active session.
    pub fn validate_token(&self, token: &[u8]) -> bool {
        self.active && self.token.as_slice() == token
    }
}

/// Shared handle to one session slot.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Lock a session, recovering from poisoning.
pub fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, Session> {
    lock(handle.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CreateError {
    #[error("active session limit reached")]
    LimitReached,
    #[error("session table full")]
    TableFull,
    #[error("token already in use")]
    TokenInUse,
}

#[derive(Debug)]
pub struct SessionRegistry {
    slots: Mutex<Vec<SessionHandle>>,
    config: Arc<ConfigStore>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(config: Arc<ConfigStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(HARD_SESSION_CAP)),
            config,
            clock,
        }
    }

    /// Marks `session` inactive and returns true when it has been idle past
    /// the configured expiry.
    pub fn is_expired(&self, session: &mut Session) -> bool {
        let idle = self.clock.now_secs().saturating_sub(session.last_activity);
        if idle > self.config.token_expiry_secs() {
            session.active = false;
            return true;
        }
        false
    }

    /// Create a session for `username`.
    ///
    /// Reaps expired sessions and rejects a token already held by a live
    /// session. Only then replaces any active session for the same user and
    /// enforces the active limit.
    pub fn create(
        &self,
        username: &str,
        token: Token,
        level: AuthLevel,
    ) -> Result<SessionHandle, CreateError> {
        let mut slots = lock(&self.slots);

        let mut collision = false;
        for handle in slots.iter() {
            let mut s = lock_session(handle);
            if s.active && self.is_expired(&mut s) {
                trace!(user = %s.username, "Reaped expired session");
            }
            collision |= s.active && s.token == token;
        }
        if collision {
            return Err(CreateError::TokenInUse);
        }

        let mut active = 0usize;
        for handle in slots.iter() {
            let mut s = lock_session(handle);
            if s.active && s.username == username {
                s.active = false;
                debug!(user = %username, "Replaced existing session");
            }
            if s.active {
                active += 1;
            }
        }

        let max = self.config.max_sessions();
        if active >= max {
            debug!(active, max, "Session limit reached");
            return Err(CreateError::LimitReached);
        }

        let session = Arc::new(Mutex::new(Session::new(
            username,
            token,
            level,
            self.clock.now_secs(),
        )));

        // Reusing a slot swaps the Arc so old handles keep pointing at the dead session.
        match slots.iter().position(|h| !lock_session(h).active) {
            Some(i) => slots[i] = Arc::clone(&session),
            None if slots.len() >= HARD_SESSION_CAP => return Err(CreateError::TableFull),
            None => slots.push(Arc::clone(&session)),
        }

        debug!(user = %username, ?level, "Session created");
        Ok(session)
    }

    /// Active, unexpired session holding `token`.
    pub fn lookup_by_token(&self, token: &[u8]) -> Option<SessionHandle> {
        let slots = lock(&self.slots);
        for handle in slots.iter() {
            let mut s = lock_session(handle);
            if s.active && s.token.as_slice() == token {
                if self.is_expired(&mut s) {
                    debug!(user = %s.username, "Session expired on lookup");
                    return None;
                }
                return Some(Arc::clone(handle));
            }
        }
        None
    }

    /// Refresh the activity timestamp.
    pub fn touch(&self, handle: &SessionHandle) {
        lock_session(handle).last_activity = self.clock.now_secs();
    }

    pub fn invalidate(&self, handle: &SessionHandle) {
        let mut s = lock_session(handle);
        s.active = false;
        s.transfer = TransferState::Idle;
        debug!(user = %s.username, "Session invalidated");
    }

    pub fn active_count(&self) -> usize {
        lock(&self.slots)
            .iter()
            .filter(|h| lock_session(h).active)
            .count()
    }

    /// Slots in the table, active or not.
    pub fn slot_count(&self) -> usize {
        lock(&self.slots).len()
    }
}
