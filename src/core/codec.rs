use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::frame::{Frame, MAX_PAYLOAD_LEN, REPLY_CAPACITY};
use crate::core::header::{FrameHeader, HEADER_SIZE};
use crate::error::{ProtocolError, Result};

/// Stream codec for relay frames.
///
/// Decoding waits for the full header and the declared payload. Declared
/// payloads above `max_payload` are rejected before any payload is buffered.
/// At end of stream a partial header reads as [`ProtocolError::TruncatedHeader`]
/// and a partial payload as [`ProtocolError::ConnectionClosed`].
///
/// Encoding goes through a fixed [`REPLY_CAPACITY`] buffer; larger frames fail.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = FrameHeader::decode(&src[..HEADER_SIZE])?;
        let len = header.payload_len as usize;
        if len > self.max_payload {
            return Err(ProtocolError::OversizedFrame(len));
        }

        let total = HEADER_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(len).to_vec();
        Ok(Some(Frame { header, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None if src.len() < HEADER_SIZE => Err(ProtocolError::TruncatedHeader(src.len())),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let mut buf = [0u8; REPLY_CAPACITY];
        let n = frame.encode_into(&mut buf)?;
        dst.reserve(n);
        dst.put_slice(&buf[..n]);
        Ok(())
    }
}
