//! Error frames.
//!
//! Every failure is reported on protocol `ER` with the 2-byte code as
//! payload. The message type depends on the error class.

use crate::core::frame::Frame;
use crate::error::ErrorCode;
use crate::protocol::message::Reply;
use crate::protocol::ProtocolId;

pub fn error_reply(code: ErrorCode) -> Reply {
    Reply::new(ProtocolId::Teardown, code.response_type(), code.to_payload())
}

pub fn error_frame(code: ErrorCode) -> Frame {
    error_reply(code).into_frame()
}

/// Error code carried by `frame`, if it is an error frame.
pub fn parse_error_frame(frame: &Frame) -> Option<ErrorCode> {
    if frame.protocol() != Some(ProtocolId::Teardown) || frame.payload.len() != 2 {
        return None;
    }
    let code = ErrorCode::from_code(u16::from_le_bytes([frame.payload[0], frame.payload[1]]))?;
    (code.response_type() == frame.msg_type()).then_some(code)
}
