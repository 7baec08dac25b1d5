//! Wire codec for the LIFX LAN protocol.
//!
//! Every datagram starts with a fixed 36-byte header ([`Header`]) followed
//! by a message-type-specific payload. All integers are little-endian.
//! [`RawFrame`] handles framing (header + raw payload bytes); [`Message`]
//! gives each known payload a typed shape.
//!
//! The codec is pure: no sockets, no state, independently testable against
//! literal byte sequences captured from real hubs.

mod header;
mod message;

pub use header::{Frame, FrameAddress, Header, ProtocolHeader, HEADER_SIZE, PROTOCOL_NUMBER};
pub use message::{EchoPayload, Message, MessageKind, RawFrame, Service};
