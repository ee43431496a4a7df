//! Frame types

use std::fmt;

use bytes::Bytes;

use super::constants::*;
use crate::error::ProtocolError;

/// Remote procedure selected by the opening Call frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Client-streaming: agent pushes samples, relay acks once at the end
    SendMetrics,
    /// Server-streaming: relay pushes samples until the subscriber leaves
    SubscribeMetrics,
}

impl Endpoint {
    pub fn as_u8(self) -> u8 {
        match self {
            Endpoint::SendMetrics => ENDPOINT_SEND_METRICS,
            Endpoint::SubscribeMetrics => ENDPOINT_SUBSCRIBE_METRICS,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            ENDPOINT_SEND_METRICS => Ok(Endpoint::SendMetrics),
            ENDPOINT_SUBSCRIBE_METRICS => Ok(Endpoint::SubscribeMetrics),
            other => Err(ProtocolError::UnknownEndpoint(other)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::SendMetrics => f.write_str("SendMetrics"),
            Endpoint::SubscribeMetrics => f.write_str("SubscribeMetrics"),
        }
    }
}

/// A single protocol frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Opens a stream on the given endpoint
    Call { version: u8, endpoint: Endpoint },
    /// Protobuf-encoded metric sample
    Sample(Bytes),
    /// Agent finished its stream cleanly
    EndOfStream,
    /// Relay acknowledges a cleanly finished agent stream
    Ack,
    /// Relay refuses the call
    Reject(String),
}

impl Frame {
    /// Call frame for the current protocol version
    pub fn call(endpoint: Endpoint) -> Self {
        Frame::Call {
            version: PROTOCOL_VERSION,
            endpoint,
        }
    }

    /// Wire type byte
    pub fn frame_type(&self) -> u8 {
        match self {
            Frame::Call { .. } => FRAME_CALL,
            Frame::Sample(_) => FRAME_SAMPLE,
            Frame::EndOfStream => FRAME_END_OF_STREAM,
            Frame::Ack => FRAME_ACK,
            Frame::Reject(_) => FRAME_REJECT,
        }
    }

    /// Short name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Call { .. } => "Call",
            Frame::Sample(_) => "Sample",
            Frame::EndOfStream => "EndOfStream",
            Frame::Ack => "Ack",
            Frame::Reject(_) => "Reject",
        }
    }

    /// Body length on the wire, type byte included
    pub fn body_len(&self) -> usize {
        1 + match self {
            Frame::Call { .. } => 2,
            Frame::Sample(payload) => payload.len(),
            Frame::EndOfStream | Frame::Ack => 0,
            Frame::Reject(reason) => reason.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_codes() {
        assert_eq!(Endpoint::from_u8(0x01).unwrap(), Endpoint::SendMetrics);
        assert_eq!(Endpoint::from_u8(0x02).unwrap(), Endpoint::SubscribeMetrics);
        assert!(matches!(
            Endpoint::from_u8(0x03),
            Err(ProtocolError::UnknownEndpoint(0x03))
        ));
    }

    #[test]
    fn test_call_uses_current_version() {
        let frame = Frame::call(Endpoint::SubscribeMetrics);
        assert_eq!(
            frame,
            Frame::Call {
                version: PROTOCOL_VERSION,
                endpoint: Endpoint::SubscribeMetrics
            }
        );
        assert_eq!(frame.body_len(), 3);
    }

    #[test]
    fn test_body_len() {
        assert_eq!(Frame::Ack.body_len(), 1);
        assert_eq!(Frame::Sample(Bytes::from_static(b"abcd")).body_len(), 5);
        assert_eq!(Frame::Reject("busy".into()).body_len(), 5);
    }
}
