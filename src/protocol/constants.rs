//! Protocol constants

/// Protocol version carried in every Call frame
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the big-endian body length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum frame body size (4 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Largest body the length prefix can describe
pub const MAX_ENCODABLE_FRAME_SIZE: usize = u32::MAX as usize;

// Frame types
pub const FRAME_CALL: u8 = 0x01;
pub const FRAME_SAMPLE: u8 = 0x02;
pub const FRAME_END_OF_STREAM: u8 = 0x03;
pub const FRAME_ACK: u8 = 0x04;
pub const FRAME_REJECT: u8 = 0x05;

// Endpoints
pub const ENDPOINT_SEND_METRICS: u8 = 0x01;
pub const ENDPOINT_SUBSCRIBE_METRICS: u8 = 0x02;
