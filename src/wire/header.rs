//! The fixed 36-byte frame header.
//!
//! Layout (all little-endian):
//!
//! | section         | bytes | fields                                        |
//! |-----------------|-------|-----------------------------------------------|
//! | Frame           | 0-7   | size u16, protocol/flags u16, source u32      |
//! | Frame Address   | 8-23  | target u64, reserved 6B, flags u8, sequence u8|
//! | Protocol Header | 24-35 | reserved u64, type u16, reserved u16          |
//!
//! The second Frame word packs the 12-bit protocol number (always 1024)
//! with the addressable (bit 12), tagged (bit 13) and origin (bits 14-15)
//! flags.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Total header size in bytes.
pub const HEADER_SIZE: usize = 36;

/// The protocol number carried by every valid frame.
pub const PROTOCOL_NUMBER: u16 = 1024;

/// Marker a real bulb places in the reserved frame-address bytes of its
/// replies (spells "LIFXV2"). Requests may carry anything there.
pub(crate) const SITE_MARKER: [u8; 6] = *b"LIFXV2";

/// First header section: size, protocol word, source identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Size of the entire message in bytes, including this header.
    pub size: u16,
    /// Origin indicator bits. Zero in requests; real bulbs set 1 in replies.
    pub origin: u8,
    /// True when the frame is addressed to all devices (broadcast
    /// discovery); the target field must then be zero.
    pub tagged: bool,
    /// Must be set in every valid frame.
    pub addressable: bool,
    /// Protocol number, always 1024.
    pub protocol: u16,
    /// Client-chosen correlation id, echoed verbatim in every reply.
    pub source: u32,
}

impl Frame {
    fn pack(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.size.to_le_bytes());
        let mut word = self.protocol & 0x0fff;
        if self.addressable {
            word |= 1 << 12;
        }
        if self.tagged {
            word |= 1 << 13;
        }
        word |= u16::from(self.origin & 0b11) << 14;
        out.extend_from_slice(&word.to_le_bytes());
        out.extend_from_slice(&self.source.to_le_bytes());
    }

    fn unpack(c: &mut Cursor<&[u8]>) -> Result<Frame> {
        let size = read_u16(c)?;
        let word = read_u16(c)?;
        let frame = Frame {
            size,
            origin: ((word >> 14) & 0b11) as u8,
            tagged: word & (1 << 13) != 0,
            addressable: word & (1 << 12) != 0,
            protocol: word & 0x0fff,
            source: read_u32(c)?,
        };
        if frame.protocol != PROTOCOL_NUMBER {
            return Err(Error::MalformedHeader(format!(
                "protocol number {} (expected {})",
                frame.protocol, PROTOCOL_NUMBER
            )));
        }
        Ok(frame)
    }
}

/// Second header section: routing and per-request reply flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAddress {
    /// Device serial (low six bytes are the MAC); zero addresses all devices.
    pub target: u64,
    /// Reserved; replies carry the `LIFXV2` site marker here.
    pub site: [u8; 6],
    /// Sender requests a generic Acknowledgement frame.
    pub ack_required: bool,
    /// Sender requests a typed State reply.
    pub res_required: bool,
    /// Wrap-around sequence number, echoed in every reply.
    pub sequence: u8,
}

impl FrameAddress {
    fn pack(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.target.to_le_bytes());
        out.extend_from_slice(&self.site);
        let mut flags = 0u8;
        if self.res_required {
            flags |= 1;
        }
        if self.ack_required {
            flags |= 2;
        }
        out.push(flags);
        out.push(self.sequence);
    }

    fn unpack(c: &mut Cursor<&[u8]>) -> Result<FrameAddress> {
        let target = read_u64(c)?;
        let mut site = [0u8; 6];
        for slot in &mut site {
            *slot = read_u8(c)?;
        }
        let flags = read_u8(c)?;
        Ok(FrameAddress {
            target,
            site,
            ack_required: flags & 2 != 0,
            res_required: flags & 1 != 0,
            sequence: read_u8(c)?,
        })
    }
}

/// Third header section: message type plus reserved space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Reserved. Real bulbs stamp a nanosecond wall-clock timestamp here in
    /// replies; requests carry zero.
    pub timestamp: u64,
    /// Message type, selects the payload shape.
    pub message_type: u16,
    pub reserved: u16,
}

impl ProtocolHeader {
    fn pack(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.message_type.to_le_bytes());
        out.extend_from_slice(&self.reserved.to_le_bytes());
    }

    fn unpack(c: &mut Cursor<&[u8]>) -> Result<ProtocolHeader> {
        Ok(ProtocolHeader {
            timestamp: read_u64(c)?,
            message_type: read_u16(c)?,
            reserved: read_u16(c)?,
        })
    }
}

/// The complete 36-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub frame: Frame,
    pub address: FrameAddress,
    pub protocol: ProtocolHeader,
}

impl Header {
    /// Serialize into the leading 36 bytes of a datagram.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        self.frame.pack(&mut out);
        self.address.pack(&mut out);
        self.protocol.pack(&mut out);
        out
    }

    /// Parse the leading 36 bytes of a datagram.
    ///
    /// Fails with [`Error::MalformedHeader`] on short input or a wrong
    /// protocol number. The declared-size check against the actual datagram
    /// happens at the framing layer, which sees the full buffer.
    pub fn unpack(bytes: &[u8]) -> Result<Header> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::MalformedHeader(format!(
                "{} bytes, header needs {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let mut c = Cursor::new(bytes);
        Ok(Header {
            frame: Frame::unpack(&mut c)?,
            address: FrameAddress::unpack(&mut c)?,
            protocol: ProtocolHeader::unpack(&mut c)?,
        })
    }
}

fn short(_: std::io::Error) -> Error {
    Error::MalformedHeader("truncated header".to_string())
}

fn read_u8(c: &mut Cursor<&[u8]>) -> Result<u8> {
    c.read_u8().map_err(short)
}

fn read_u16(c: &mut Cursor<&[u8]>) -> Result<u16> {
    c.read_u16::<LittleEndian>().map_err(short)
}

fn read_u32(c: &mut Cursor<&[u8]>) -> Result<u32> {
    c.read_u32::<LittleEndian>().map_err(short)
}

fn read_u64(c: &mut Cursor<&[u8]>) -> Result<u64> {
    c.read_u64::<LittleEndian>().map_err(short)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_word_bits() {
        // Request frame captured from a hub: 0x3400 = tagged broadcast.
        let header = Header::unpack(&[
            0x24, 0x00, 0x00, 0x34, 0xca, 0x41, 0x37, 0x05, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x98, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x02, 0x00, 0x00, 0x00,
        ])
        .unwrap();
        assert_eq!(header.frame.size, 0x24);
        assert_eq!(header.frame.origin, 0);
        assert!(header.frame.tagged);
        assert!(header.frame.addressable);
        assert_eq!(header.frame.protocol, 1024);
        assert_eq!(header.frame.source, 0x053741ca);
        assert!(!header.address.ack_required);
        assert!(header.address.res_required);
        assert_eq!(header.address.sequence, 0x98);
        assert_eq!(header.protocol.message_type, 2);
    }

    #[test]
    fn test_response_word_from_real_bulb() {
        // 0x5400: a real bulb's reply sets origin=1, tagged=0.
        let mut bytes = vec![0x28, 0x00, 0x00, 0x54, 0x42, 0x52, 0x4b, 0x52];
        bytes.resize(HEADER_SIZE, 0);
        let header = Header::unpack(&bytes).unwrap();
        assert_eq!(header.frame.origin, 1);
        assert!(!header.frame.tagged);
        assert!(header.frame.addressable);
        assert_eq!(header.frame.source, 0x524b5242);
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let header = Header {
            frame: Frame {
                size: 49,
                origin: 1,
                tagged: false,
                addressable: true,
                protocol: PROTOCOL_NUMBER,
                source: 0xdeadbeef,
            },
            address: FrameAddress {
                target: 0x0000_de97_02d5_73d0,
                site: SITE_MARKER,
                ack_required: true,
                res_required: false,
                sequence: 248,
            },
            protocol: ProtocolHeader {
                timestamp: 1553350342028441856,
                message_type: 107,
                reserved: 0,
            },
        };
        let bytes = header.pack();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(Header::unpack(&bytes).unwrap(), header);
    }

    #[test]
    fn test_wrong_protocol_number() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[3] = 0x10; // addressable set, protocol 0
        assert!(matches!(
            Header::unpack(&bytes),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_short_input() {
        assert!(matches!(
            Header::unpack(&[0u8; 20]),
            Err(Error::MalformedHeader(_))
        ));
    }
}
