// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::{AuthConfig, ADMIN_GRANT};
use crate::core::frame::Frame;
use crate::core::hash::md5_digest;
use crate::error::ErrorCode;
use crate::protocol::message::*;
use crate::protocol::{msg, ProtocolId};
use crate::service::RelayService;
use crate::state::session_registry::lock_session;
use crate::state::{AuthLevel, Token, TransferState};
use crate::utils::time::ManualClock;

const PEER: [u8; 4] = [10, 0, 0, 7];
const PASS: &str = "SBLCHT42";

struct Harness {
    svc: RelayService,
    clock: ManualClock,
}

fn harness() -> Harness {
    let clock = ManualClock::new(10_000);
    let svc = RelayService::with_clock(AuthConfig::default(), Arc::new(clock.clone()));
    Harness { svc, clock }
}

fn peer() -> IpAddr {
    IpAddr::from(PEER)
}

impl Harness {
    fn send_from(
        &self,
        from: IpAddr,
        protocol: ProtocolId,
        msg_type: u8,
        payload: Vec<u8>,
    ) -> Result<Reply, ErrorCode> {
        self.svc
            .process(from, &Frame::build(protocol, msg_type, payload))
    }

    fn send(&self, protocol: ProtocolId, msg_type: u8, payload: Vec<u8>) -> Result<Reply, ErrorCode> {
        self.send_from(peer(), protocol, msg_type, payload)
    }

    fn handshake(&self) -> Result<Reply, ErrorCode> {
        self.send(
            ProtocolId::Handshake,
            msg::AR_REQ,
            encode_handshake(0x1C4C, 6, "BLAKE3, MD5"),
        )
    }

    fn login(&self, user: &str) -> Token {
        self.handshake().unwrap();
        let reply = self
            .send(ProtocolId::Auth, msg::SB_REQ, encode_login(user, PASS))
            .unwrap();
        parse_login_reply(&reply.payload).unwrap().token
    }

    fn set(&self, token: &Token, key: &str, value: &str) -> Result<Reply, ErrorCode> {
        self.send(
            ProtocolId::Config,
            msg::NW_SETCFG,
            encode_config_set(key, value, token),
        )
    }

    fn elevate(&self, token: &Token, marker: &str) -> Result<Reply, ErrorCode> {
        self.send(ProtocolId::Auth, msg::SB_ELEVATE, encode_elevate(token, marker))
    }

    fn admin(&self, user: &str) -> Token {
        let token = self.login(user);
        self.set(&token, "EleEnabled", "True").unwrap();
        self.elevate(&token, "elevateRequest").unwrap();
        token
    }

    fn rts(&self, token: &Token, size: u32) -> Result<Reply, ErrorCode> {
        self.send(ProtocolId::Transfer, msg::BC_RTS, encode_rts(size, token))
    }

    fn chunk(&self, token: &Token, data: &[u8]) -> Result<Reply, ErrorCode> {
        self.send(
            ProtocolId::Transfer,
            msg::BC_DATA,
            encode_data(data, &md5_digest(data), token),
        )
    }

    fn exec(&self, token: &Token, command: &str) -> Result<Reply, ErrorCode> {
        self.send(ProtocolId::Exec, msg::UW_EXEC, encode_exec(command, token))
    }

    fn transfer_state(&self, token: &Token) -> TransferState {
        let handle = self.svc.state().sessions.lookup_by_token(token).unwrap();
        let state = lock_session(&handle).transfer();
        state
    }

    fn level(&self, token: &Token) -> AuthLevel {
        let handle = self.svc.state().sessions.lookup_by_token(token).unwrap();
        let level = lock_session(&handle).level();
        level
    }
}

// ---------------------------------------------------------------------------
// Handshake and login

#[test]
fn test_handshake_then_login() {
    let h = harness();
    let reply = h.handshake().unwrap();
    assert_eq!(reply.protocol, ProtocolId::Handshake);
    assert_eq!(reply.msg_type, msg::AR_RESP);
    assert_eq!(&reply.payload[..3], &[0x4C, 0x1C, 0x06]);
    assert_eq!(&reply.payload[3..], b"Blake3, MD5");
    assert!(h.svc.state().handshakes.has_recent(peer()));

    let reply = h
        .send(ProtocolId::Auth, msg::SB_REQ, encode_login("alice", PASS))
        .unwrap();
    let login = parse_login_reply(&reply.payload).unwrap();
    assert!(login.accepted);
    assert_eq!(login.level, AuthLevel::Unprivileged);
    assert_eq!(login.grant, None);
    assert_eq!(h.svc.state().sessions.active_count(), 1);
    assert_eq!(h.svc.state().metrics.snapshot().logins_ok, 1);
}

#[test]
fn test_login_without_handshake_rejected() {
    let h = harness();
    h.handshake().unwrap();
    let other = IpAddr::from([10, 0, 0, 8]);
    let result = h.send_from(other, ProtocolId::Auth, msg::SB_REQ, encode_login("bob", PASS));
    assert_eq!(result.err(), Some(ErrorCode::Unauthorized));
    assert_eq!(h.svc.state().sessions.active_count(), 0);
}

#[test]
fn test_handshake_window_expires() {
    let h = harness();
    h.handshake().unwrap();
    h.clock.advance(31);
    let result = h.send(ProtocolId::Auth, msg::SB_REQ, encode_login("alice", PASS));
    assert_eq!(result.err(), Some(ErrorCode::Unauthorized));
}

#[test]
fn test_handshake_requires_blake3() {
    let h = harness();
    let result = h.send(
        ProtocolId::Handshake,
        msg::AR_REQ,
        encode_handshake(0x1C4C, 6, "md5,sha256"),
    );
    assert_eq!(result.err(), Some(ErrorCode::MalformedFrame));
    assert!(!h.svc.state().handshakes.has_recent(peer()));
}

#[test]
fn test_wrong_passphrase() {
    let h = harness();
    h.handshake().unwrap();
    let result = h.send(ProtocolId::Auth, msg::SB_REQ, encode_login("alice", "nope"));
    assert_eq!(result.err(), Some(ErrorCode::Unauthorized));
    assert_eq!(h.svc.state().metrics.snapshot().logins_failed, 1);
}

#[test]
fn test_malformed_login() {
    let h = harness();
    h.handshake().unwrap();
    let result = h.send(ProtocolId::Auth, msg::SB_REQ, b"toolongusername\0x\0".to_vec());
    assert_eq!(result.err(), Some(ErrorCode::MalformedFrame));
}

#[test]
fn test_non_utf8_username_rejected() {
    let h = harness();
    h.handshake().unwrap();
    for name in [&[0xFFu8][..], &[0xFE][..]] {
        let mut payload = name.to_vec();
        payload.push(0);
        payload.extend_from_slice(PASS.as_bytes());
        payload.push(0);
        let result = h.send(ProtocolId::Auth, msg::SB_REQ, payload);
        assert_eq!(result.err(), Some(ErrorCode::MalformedFrame));
    }
    assert_eq!(h.svc.state().sessions.active_count(), 0);
    assert_eq!(h.svc.state().metrics.snapshot().logins_failed, 2);
}

#[test]
fn test_relogin_replaces_session() {
    let h = harness();
    let first = h.login("alice");
    let second = h.login("alice");
    assert_ne!(first, second);
    assert!(h.svc.state().sessions.lookup_by_token(&first).is_none());
    assert_eq!(h.svc.state().sessions.active_count(), 1);
}

// ---------------------------------------------------------------------------
// Elevation

#[test]
fn test_elevation_succeeds() {
    let h = harness();
    let token = h.login("alice");
    h.set(&token, "EleEnabled", "True").unwrap();

    let reply = h.elevate(&token, "elevateRequest").unwrap();
    let parsed = parse_login_reply(&reply.payload).unwrap();
    assert_eq!(parsed.token, token);
    assert_eq!(parsed.level, AuthLevel::Admin);
    assert_eq!(parsed.grant.as_deref(), Some(&ADMIN_GRANT.as_bytes()[..GRANT_LEN]));
    assert_eq!(h.level(&token), AuthLevel::Admin);
}

#[test]
fn test_elevation_disabled_by_default() {
    let h = harness();
    let token = h.login("alice");
    assert_eq!(
        h.elevate(&token, "elevateRequest").err(),
        Some(ErrorCode::Unauthorized)
    );
    assert_eq!(h.level(&token), AuthLevel::Unprivileged);
}

#[test]
fn test_elevation_flag_must_be_exact() {
    let h = harness();
    let token = h.login("alice");
    h.set(&token, "EleEnabled", "true").unwrap();
    assert_eq!(
        h.elevate(&token, "elevateRequest").err(),
        Some(ErrorCode::Unauthorized)
    );
}

#[test]
fn test_elevation_wrong_marker() {
    let h = harness();
    let token = h.login("alice");
    h.set(&token, "EleEnabled", "True").unwrap();
    assert_eq!(
        h.elevate(&token, "elevaterequest").err(),
        Some(ErrorCode::Unauthorized)
    );
}

#[test]
fn test_elevation_unknown_token() {
    let h = harness();
    let token = h.login("alice");
    h.set(&token, "EleEnabled", "True").unwrap();
    assert_eq!(
        h.elevate(&[0xAB; 16], "elevateRequest").err(),
        Some(ErrorCode::Unauthorized)
    );
}

#[test]
fn test_elevation_short_or_unterminated() {
    let h = harness();
    let token = h.login("alice");
    assert_eq!(
        h.send(ProtocolId::Auth, msg::SB_ELEVATE, token[..10].to_vec())
            .err(),
        Some(ErrorCode::MalformedFrame)
    );

    let mut payload = token.to_vec();
    payload.extend_from_slice(b"elevateRequest");
    assert_eq!(
        h.send(ProtocolId::Auth, msg::SB_ELEVATE, payload).err(),
        Some(ErrorCode::MalformedFrame)
    );
}

// ---------------------------------------------------------------------------
// Transfer

#[test]
fn test_transfer_completes_exactly() {
    let h = harness();
    let token = h.login("alice");

    let cts = h.rts(&token, 100).unwrap();
    assert_eq!(cts.msg_type, msg::BC_CTS);
    assert_eq!(cts.payload, vec![0x01]);
    assert_eq!(
        h.transfer_state(&token),
        TransferState::Receiving { remaining: 100 }
    );

    let ack = h.chunk(&token, &[1u8; 60]).unwrap();
    assert_eq!(ack.msg_type, msg::BC_ACK);
    assert!(ack.payload.is_empty());
    assert_eq!(
        h.transfer_state(&token),
        TransferState::Receiving { remaining: 40 }
    );

    h.chunk(&token, &[2u8; 40]).unwrap();
    assert_eq!(h.transfer_state(&token), TransferState::Idle);

    assert_eq!(
        h.chunk(&token, &[3u8; 1]).err(),
        Some(ErrorCode::MalformedFrame)
    );
}

#[test]
fn test_transfer_overrun_resets() {
    let h = harness();
    let token = h.login("alice");
    h.rts(&token, 50).unwrap();
    assert_eq!(
        h.chunk(&token, &[0u8; 60]).err(),
        Some(ErrorCode::TransferPolicyViolation)
    );
    assert_eq!(h.transfer_state(&token), TransferState::Idle);
}

#[test]
fn test_transfer_chunk_tag_checked() {
    let h = harness();
    let token = h.login("alice");
    h.rts(&token, 10).unwrap();

    let data = [9u8; 10];
    let mut tag = md5_digest(&data);
    tag[0] ^= 0x01;
    let result = h.send(
        ProtocolId::Transfer,
        msg::BC_DATA,
        encode_data(&data, &tag, &token),
    );
    assert_eq!(result.err(), Some(ErrorCode::ChunkIntegrityFailure));
    assert_eq!(
        h.transfer_state(&token),
        TransferState::Receiving { remaining: 10 }
    );
}

#[test]
fn test_transfer_policy_limits() {
    let h = harness();
    let token = h.admin("alice");
    assert_eq!(
        h.rts(&token, 257).err(),
        Some(ErrorCode::TransferPolicyViolation)
    );
    assert!(h.rts(&token, 256).is_ok());

    h.set(&token, "maxChunkSize", "-1").unwrap();
    assert_eq!(
        h.rts(&token, 0).err(),
        Some(ErrorCode::TransferPolicyViolation)
    );
}

#[test]
fn test_data_without_rts() {
    let h = harness();
    let token = h.login("alice");
    assert_eq!(
        h.chunk(&token, b"hello").err(),
        Some(ErrorCode::MalformedFrame)
    );
}

// ---------------------------------------------------------------------------
// Config

#[test]
fn test_config_get() {
    let h = harness();
    let token = h.login("alice");
    let reply = h
        .send(
            ProtocolId::Config,
            msg::NW_GETCFG,
            encode_config_get("timeout", &token),
        )
        .unwrap();
    assert_eq!(reply.payload, b"10\0".to_vec());

    let missing = h.send(
        ProtocolId::Config,
        msg::NW_GETCFG,
        encode_config_get("nope", &token),
    );
    assert_eq!(missing.err(), Some(ErrorCode::ConfigNotFound));
}

#[test]
fn test_long_value_reads_back_whole() {
    let h = harness();
    let token = h.login("alice");
    let value = "v".repeat(100);

    let reply = h.set(&token, "EleEnabled", &value).unwrap();
    assert_eq!(
        parse_decision(&reply.payload),
        Some(("EleEnabled".to_string(), Decision::Approve))
    );

    let reply = h
        .send(
            ProtocolId::Config,
            msg::NW_GETCFG,
            encode_config_get("EleEnabled", &token),
        )
        .unwrap();
    assert_eq!(parse_value(&reply.payload), value);
}

#[test]
fn test_unprivileged_set_of_admin_key_denied() {
    let h = harness();
    let token = h.login("alice");
    let reply = h.set(&token, "maxSess", "50").unwrap();
    assert_eq!(reply.msg_type, msg::NW_APPROVE);
    assert_eq!(
        parse_decision(&reply.payload),
        Some(("maxSess".to_string(), Decision::Deny))
    );
    assert_eq!(h.svc.state().config.get("maxSess").as_deref(), Some("5"));
}

#[test]
fn test_admin_set_approved() {
    let h = harness();
    let token = h.admin("alice");
    let reply = h.set(&token, "maxSess", "50").unwrap();
    assert_eq!(reply.payload, b"maxSess\0approve\0".to_vec());
    assert_eq!(h.svc.state().config.max_sessions(), 50);
}

#[test]
fn test_set_unknown_key() {
    let h = harness();
    let token = h.admin("alice");
    assert_eq!(
        h.set(&token, "colour", "red").err(),
        Some(ErrorCode::ConfigNotFound)
    );
}

// ---------------------------------------------------------------------------
// Exec

#[test]
fn test_exec_accepted_for_admin() {
    let h = harness();
    let token = h.admin("alice");
    h.set(&token, "EnCmdExec", "True").unwrap();

    let reply = h.exec(&token, "uptime").unwrap();
    assert_eq!(reply.protocol, ProtocolId::Exec);
    assert_eq!(reply.msg_type, msg::UW_RESULT);
    assert_eq!(reply.payload, vec![0x00]);
}

#[test]
fn test_exec_gates() {
    let h = harness();
    let user = h.login("bob");
    assert_eq!(
        h.exec(&user, "uptime").err(),
        Some(ErrorCode::CommandDenied)
    );

    let admin = h.admin("alice");
    assert_eq!(
        h.exec(&admin, "uptime").err(),
        Some(ErrorCode::CommandDenied)
    );

    h.set(&admin, "EnCmdExec", "True").unwrap();
    h.set(&admin, "CmdSize", "4").unwrap();
    assert_eq!(
        h.exec(&admin, "uptime").err(),
        Some(ErrorCode::CommandDenied)
    );
    assert!(h.exec(&admin, "ls").is_ok());
}

// ---------------------------------------------------------------------------
// Teardown and session lifetime

#[test]
fn test_teardown() {
    let h = harness();
    let token = h.login("alice");
    let reply = h
        .send(ProtocolId::Teardown, msg::ER_REQ, token.to_vec())
        .unwrap();
    assert_eq!(reply.msg_type, msg::ER_RESP);
    assert_eq!(reply.payload, vec![0x00]);

    let again = h.send(ProtocolId::Teardown, msg::ER_REQ, token.to_vec());
    assert_eq!(again.err(), Some(ErrorCode::Unauthorized));
    assert_eq!(h.svc.state().sessions.active_count(), 0);
}

#[test]
fn test_idle_session_expires() {
    let h = harness();
    let token = h.login("alice");
    h.clock.advance(61);
    let result = h.send(
        ProtocolId::Config,
        msg::NW_GETCFG,
        encode_config_get("timeout", &token),
    );
    assert_eq!(result.err(), Some(ErrorCode::Unauthorized));
}

#[test]
fn test_activity_refreshes_session() {
    let h = harness();
    let token = h.login("alice");
    for _ in 0..3 {
        h.clock.advance(40);
        h.send(
            ProtocolId::Config,
            msg::NW_GETCFG,
            encode_config_get("timeout", &token),
        )
        .unwrap();
    }
}

// ---------------------------------------------------------------------------
// Pipeline

#[test]
fn test_integrity_failure() {
    let h = harness();
    let token = h.login("alice");
    let mut frame = Frame::build(
        ProtocolId::Config,
        msg::NW_GETCFG,
        encode_config_get("timeout", &token),
    );
    frame.payload[0] ^= 0x20;
    assert_eq!(
        h.svc.process(peer(), &frame).err(),
        Some(ErrorCode::IntegrityFailure)
    );
}

#[test]
fn test_unrouted_message_types() {
    let h = harness();
    let token = h.login("alice");
    assert_eq!(
        h.send(ProtocolId::Transfer, msg::BC_ACK, token.to_vec()).err(),
        Some(ErrorCode::MalformedFrame)
    );
    assert_eq!(
        h.send(ProtocolId::Handshake, msg::AR_RESP, b"xyz".to_vec())
            .err(),
        Some(ErrorCode::MalformedFrame)
    );
}

#[test]
fn test_missing_token_is_malformed() {
    let h = harness();
    h.login("alice");
    assert_eq!(
        h.send(ProtocolId::Transfer, msg::BC_RTS, vec![1, 0, 0, 0]).err(),
        Some(ErrorCode::MalformedFrame)
    );
    assert_eq!(
        h.send(ProtocolId::Config, msg::NW_GETCFG, b"timeout".to_vec())
            .err(),
        Some(ErrorCode::MalformedFrame)
    );
}

#[test]
fn test_unknown_token_is_unauthorized() {
    let h = harness();
    assert_eq!(
        h.rts(&[0x55; 16], 10).err(),
        Some(ErrorCode::Unauthorized)
    );
}
