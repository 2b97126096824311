#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use lich_relay::core::codec::FrameCodec;
use lich_relay::core::frame::Frame;
use lich_relay::protocol::message::extract_token;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Frame parsing and integrity checks must never panic
    if let Ok(frame) = Frame::decode(data) {
        let _ = frame.verify();
        if let Some(protocol) = frame.protocol() {
            let _ = extract_token(protocol, frame.msg_type(), &frame.payload);
        }
    }

    let mut buf = BytesMut::from(data);
    let mut codec = FrameCodec::default();
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
    let _ = codec.decode_eof(&mut buf);
});
