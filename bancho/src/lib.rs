//! The Bancho wire protocol spoken between the osu! client and the server.
//!
//! Every frame is little-endian: a 7-byte header (packet id `u16`, one
//! reserved byte, payload length `u32`) followed by the payload. Strings
//! carry a one-byte presence marker (`0x00` empty, `0x0b` present), then a
//! ULEB128 length, then UTF-8 bytes.
//!
//! [`PacketStream`] walks the frames of a request body, [`Reader`] decodes
//! typed fields out of a payload, and the [`server`] module builds the
//! byte strings sent back to clients.

pub use ids::{ClientPacketId, ServerPacketId};
pub use reader::{DecodeError, Frame, PacketStream, Reader};
pub use structs::*;
pub use writer::Writer;

mod ids;
mod reader;
mod structs;
mod writer;

pub mod server;

/// The Bancho protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: i32 = 19;

/// Size of a frame header: packet id (2), reserved (1), payload length (4).
pub const HEADER_LEN: usize = 7;
