//! Length-prefixed frame codec
//!
//! Plugs into `tokio_util::codec::{FramedRead, FramedWrite}`. Sample payloads
//! are split off the read buffer without copying.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::constants::*;
use super::frame::{Endpoint, Frame};
use crate::error::{Error, ProtocolError};

/// Encoder/decoder for relay frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Codec with the default frame size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Codec with a custom frame size limit
    ///
    /// Limits above what the `u32` length prefix can carry are clamped.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(MAX_ENCODABLE_FRAME_SIZE),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn parse_body(mut body: Bytes) -> Result<Frame, ProtocolError> {
        let frame_type = body.get_u8();

        match frame_type {
            FRAME_CALL => {
                if body.len() != 2 {
                    return Err(ProtocolError::MalformedFrame("call frame must carry 2 bytes"));
                }
                let version = body.get_u8();
                let endpoint = Endpoint::from_u8(body.get_u8())?;
                Ok(Frame::Call { version, endpoint })
            }
            FRAME_SAMPLE => Ok(Frame::Sample(body)),
            FRAME_END_OF_STREAM => {
                if !body.is_empty() {
                    return Err(ProtocolError::MalformedFrame("end-of-stream frame has a payload"));
                }
                Ok(Frame::EndOfStream)
            }
            FRAME_ACK => {
                if !body.is_empty() {
                    return Err(ProtocolError::MalformedFrame("ack frame has a payload"));
                }
                Ok(Frame::Ack)
            }
            FRAME_REJECT => {
                let reason = String::from_utf8(body.to_vec())
                    .map_err(|_| ProtocolError::MalformedFrame("reject reason is not UTF-8"))?;
                Ok(Frame::Reject(reason))
            }
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let body_len = u32::from_be_bytes(prefix) as usize;

        if body_len == 0 {
            return Err(ProtocolError::MalformedFrame("empty frame").into());
        }
        if body_len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: body_len,
                max: self.max_frame_size,
            }
            .into());
        }

        if src.len() < LENGTH_PREFIX_SIZE + body_len {
            src.reserve(LENGTH_PREFIX_SIZE + body_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let body = src.split_to(body_len).freeze();

        Ok(Some(Self::parse_body(body)?))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
        let body_len = frame.body_len();
        if body_len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: body_len,
                max: self.max_frame_size,
            }
            .into());
        }

        let prefix = u32::try_from(body_len).map_err(|_| ProtocolError::FrameTooLarge {
            size: body_len,
            max: MAX_ENCODABLE_FRAME_SIZE,
        })?;

        dst.reserve(LENGTH_PREFIX_SIZE + body_len);
        dst.put_u32(prefix);
        dst.put_u8(frame.frame_type());

        match frame {
            Frame::Call { version, endpoint } => {
                dst.put_u8(version);
                dst.put_u8(endpoint.as_u8());
            }
            Frame::Sample(payload) => dst.put_slice(&payload),
            Frame::EndOfStream | Frame::Ack => {}
            Frame::Reject(reason) => dst.put_slice(reason.as_bytes()),
        }

        Ok(())
    }
}
