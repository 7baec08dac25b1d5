//! Typed messages and their payload codecs.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use uuid::Uuid;

use crate::errors::Error;
use crate::types::{DeviceId, Hsbk, Label, PowerLevel};
use crate::wire::header::{Frame, FrameAddress, Header, ProtocolHeader, HEADER_SIZE, PROTOCOL_NUMBER, SITE_MARKER};

type Result<T> = std::result::Result<T, Error>;

/// Services a device can advertise in a StateService reply.
///
/// Real bulbs answer discovery twice: once for the documented UDP service
/// and once for service 5, an undocumented second UDP endpoint.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Udp = 1,
    Udp5 = 5,
}

impl Service {
    pub fn create(value: u8) -> Option<Self> {
        match value {
            1 => Some(Service::Udp),
            5 => Some(Service::Udp5),
            _ => None,
        }
    }
}

/// Message types with a registered payload shape.
///
/// The discriminant is the wire-level type number.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum MessageKind {
    GetService = 2,
    StateService = 3,
    GetHostFirmware = 14,
    StateHostFirmware = 15,
    GetWifiInfo = 16,
    StateWifiInfo = 17,
    GetWifiFirmware = 18,
    StateWifiFirmware = 19,
    GetPower = 20,
    SetPower = 21,
    StatePower = 22,
    GetLabel = 23,
    SetLabel = 24,
    StateLabel = 25,
    GetVersion = 32,
    StateVersion = 33,
    GetInfo = 34,
    StateInfo = 35,
    Acknowledgement = 45,
    GetLocation = 48,
    SetLocation = 49,
    StateLocation = 50,
    GetGroup = 51,
    SetGroup = 52,
    StateGroup = 53,
    EchoRequest = 58,
    EchoResponse = 59,
    LightGet = 101,
    LightSetColor = 102,
    LightState = 107,
    LightGetPower = 116,
    LightSetPower = 117,
    LightStatePower = 118,
}

impl MessageKind {
    /// Look up a kind by wire-level type number.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifx_bulb_rs::MessageKind;
    ///
    /// assert_eq!(MessageKind::create(2), Some(MessageKind::GetService));
    /// assert_eq!(MessageKind::create(9999), None);
    /// ```
    pub fn create(num: u16) -> Option<Self> {
        MessageKind::iter().find(|kind| *kind as u16 == num)
    }

    /// Whether this kind is something a *device* emits.
    ///
    /// Other bulbs on the segment broadcast these too; a device never
    /// answers them (that way two emulated bulbs cannot ping-pong).
    pub fn is_device_reply(&self) -> bool {
        matches!(
            self,
            MessageKind::StateService
                | MessageKind::StateHostFirmware
                | MessageKind::StateWifiInfo
                | MessageKind::StateWifiFirmware
                | MessageKind::StatePower
                | MessageKind::StateLabel
                | MessageKind::StateVersion
                | MessageKind::StateInfo
                | MessageKind::Acknowledgement
                | MessageKind::StateLocation
                | MessageKind::StateGroup
                | MessageKind::EchoResponse
                | MessageKind::LightState
                | MessageKind::LightStatePower
        )
    }
}

/// Opaque 64-byte blob carried by EchoRequest/EchoResponse.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EchoPayload(pub [u8; 64]);

impl fmt::Debug for EchoPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<EchoPayload>")
    }
}

/// A decoded LIFX message.
///
/// One variant per supported type; each carries its typed payload. Types
/// outside this set decode to [`Error::UnknownMessageType`] while leaving
/// the header usable.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// GetService - 2. Discovery entry point, usually broadcast.
    GetService,
    /// StateService - 3. Advertises a transport and its port.
    StateService { service: Service, port: u32 },
    /// GetHostFirmware - 14
    GetHostFirmware,
    /// StateHostFirmware - 15
    StateHostFirmware {
        build: u64,
        reserved: u64,
        version_minor: u16,
        version_major: u16,
    },
    /// GetWifiInfo - 16
    GetWifiInfo,
    /// StateWifiInfo - 17. Signal strength in milliwatts plus byte counters.
    StateWifiInfo {
        signal: f32,
        tx: u32,
        rx: u32,
        reserved: i16,
    },
    /// GetWifiFirmware - 18
    GetWifiFirmware,
    /// StateWifiFirmware - 19
    StateWifiFirmware {
        build: u64,
        reserved: u64,
        version_minor: u16,
        version_major: u16,
    },
    /// GetPower - 20
    GetPower,
    /// SetPower - 21. Level must be 0 or 65535.
    SetPower { level: PowerLevel },
    /// StatePower - 22
    StatePower { level: PowerLevel },
    /// GetLabel - 23
    GetLabel,
    /// SetLabel - 24
    SetLabel { label: Label },
    /// StateLabel - 25
    StateLabel { label: Label },
    /// GetVersion - 32
    GetVersion,
    /// StateVersion - 33. Vendor/product let hubs look up capabilities.
    StateVersion {
        vendor: u32,
        product: u32,
        version: u32,
    },
    /// GetInfo - 34
    GetInfo,
    /// StateInfo - 35. Times in nanoseconds.
    StateInfo {
        time: u64,
        uptime: u64,
        downtime: u64,
    },
    /// Acknowledgement - 45. No payload; correlation is by header sequence.
    Acknowledgement,
    /// GetLocation - 48
    GetLocation,
    /// SetLocation - 49
    SetLocation {
        location: Uuid,
        label: Label,
        updated_at: u64,
    },
    /// StateLocation - 50
    StateLocation {
        location: Uuid,
        label: Label,
        updated_at: u64,
    },
    /// GetGroup - 51
    GetGroup,
    /// SetGroup - 52
    SetGroup {
        group: Uuid,
        label: Label,
        updated_at: u64,
    },
    /// StateGroup - 53
    StateGroup {
        group: Uuid,
        label: Label,
        updated_at: u64,
    },
    /// EchoRequest - 58. Liveness probe.
    EchoRequest { payload: EchoPayload },
    /// EchoResponse - 59
    EchoResponse { payload: EchoPayload },
    /// LightGet - 101
    LightGet,
    /// LightSetColor - 102. Duration is the transition time in ms.
    LightSetColor {
        reserved: u8,
        color: Hsbk,
        duration: u32,
    },
    /// LightState - 107. The full color/power/label snapshot.
    LightState {
        color: Hsbk,
        reserved: i16,
        power: PowerLevel,
        label: Label,
        reserved2: u64,
    },
    /// LightGetPower - 116
    LightGetPower,
    /// LightSetPower - 117. Duration is the fade time in ms.
    LightSetPower { level: PowerLevel, duration: u32 },
    /// LightStatePower - 118
    LightStatePower { level: PowerLevel },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::GetService => MessageKind::GetService,
            Message::StateService { .. } => MessageKind::StateService,
            Message::GetHostFirmware => MessageKind::GetHostFirmware,
            Message::StateHostFirmware { .. } => MessageKind::StateHostFirmware,
            Message::GetWifiInfo => MessageKind::GetWifiInfo,
            Message::StateWifiInfo { .. } => MessageKind::StateWifiInfo,
            Message::GetWifiFirmware => MessageKind::GetWifiFirmware,
            Message::StateWifiFirmware { .. } => MessageKind::StateWifiFirmware,
            Message::GetPower => MessageKind::GetPower,
            Message::SetPower { .. } => MessageKind::SetPower,
            Message::StatePower { .. } => MessageKind::StatePower,
            Message::GetLabel => MessageKind::GetLabel,
            Message::SetLabel { .. } => MessageKind::SetLabel,
            Message::StateLabel { .. } => MessageKind::StateLabel,
            Message::GetVersion => MessageKind::GetVersion,
            Message::StateVersion { .. } => MessageKind::StateVersion,
            Message::GetInfo => MessageKind::GetInfo,
            Message::StateInfo { .. } => MessageKind::StateInfo,
            Message::Acknowledgement => MessageKind::Acknowledgement,
            Message::GetLocation => MessageKind::GetLocation,
            Message::SetLocation { .. } => MessageKind::SetLocation,
            Message::StateLocation { .. } => MessageKind::StateLocation,
            Message::GetGroup => MessageKind::GetGroup,
            Message::SetGroup { .. } => MessageKind::SetGroup,
            Message::StateGroup { .. } => MessageKind::StateGroup,
            Message::EchoRequest { .. } => MessageKind::EchoRequest,
            Message::EchoResponse { .. } => MessageKind::EchoResponse,
            Message::LightGet => MessageKind::LightGet,
            Message::LightSetColor { .. } => MessageKind::LightSetColor,
            Message::LightState { .. } => MessageKind::LightState,
            Message::LightGetPower => MessageKind::LightGetPower,
            Message::LightSetPower { .. } => MessageKind::LightSetPower,
            Message::LightStatePower { .. } => MessageKind::LightStatePower,
        }
    }

    /// Wire-level type number of this message.
    pub fn type_num(&self) -> u16 {
        self.kind() as u16
    }

    /// Parse the payload of a raw frame based on its message type.
    pub fn from_raw(raw: &RawFrame) -> Result<Message> {
        let num = raw.header.protocol.message_type;
        let mut r = Reader::new(num, &raw.payload);
        let msg = match MessageKind::create(num).ok_or(Error::UnknownMessageType(num))? {
            MessageKind::GetService => Message::GetService,
            MessageKind::StateService => Message::StateService {
                service: r.service()?,
                port: r.u32()?,
            },
            MessageKind::GetHostFirmware => Message::GetHostFirmware,
            MessageKind::StateHostFirmware => Message::StateHostFirmware {
                build: r.u64()?,
                reserved: r.u64()?,
                version_minor: r.u16()?,
                version_major: r.u16()?,
            },
            MessageKind::GetWifiInfo => Message::GetWifiInfo,
            MessageKind::StateWifiInfo => Message::StateWifiInfo {
                signal: r.f32()?,
                tx: r.u32()?,
                rx: r.u32()?,
                reserved: r.i16()?,
            },
            MessageKind::GetWifiFirmware => Message::GetWifiFirmware,
            MessageKind::StateWifiFirmware => Message::StateWifiFirmware {
                build: r.u64()?,
                reserved: r.u64()?,
                version_minor: r.u16()?,
                version_major: r.u16()?,
            },
            MessageKind::GetPower => Message::GetPower,
            MessageKind::SetPower => Message::SetPower { level: r.power()? },
            MessageKind::StatePower => Message::StatePower { level: r.power()? },
            MessageKind::GetLabel => Message::GetLabel,
            MessageKind::SetLabel => Message::SetLabel { label: r.label()? },
            MessageKind::StateLabel => Message::StateLabel { label: r.label()? },
            MessageKind::GetVersion => Message::GetVersion,
            MessageKind::StateVersion => Message::StateVersion {
                vendor: r.u32()?,
                product: r.u32()?,
                version: r.u32()?,
            },
            MessageKind::GetInfo => Message::GetInfo,
            MessageKind::StateInfo => Message::StateInfo {
                time: r.u64()?,
                uptime: r.u64()?,
                downtime: r.u64()?,
            },
            MessageKind::Acknowledgement => Message::Acknowledgement,
            MessageKind::GetLocation => Message::GetLocation,
            MessageKind::SetLocation => Message::SetLocation {
                location: r.uuid()?,
                label: r.label()?,
                updated_at: r.u64()?,
            },
            MessageKind::StateLocation => Message::StateLocation {
                location: r.uuid()?,
                label: r.label()?,
                updated_at: r.u64()?,
            },
            MessageKind::GetGroup => Message::GetGroup,
            MessageKind::SetGroup => Message::SetGroup {
                group: r.uuid()?,
                label: r.label()?,
                updated_at: r.u64()?,
            },
            MessageKind::StateGroup => Message::StateGroup {
                group: r.uuid()?,
                label: r.label()?,
                updated_at: r.u64()?,
            },
            MessageKind::EchoRequest => Message::EchoRequest { payload: r.echo()? },
            MessageKind::EchoResponse => Message::EchoResponse { payload: r.echo()? },
            MessageKind::LightGet => Message::LightGet,
            MessageKind::LightSetColor => Message::LightSetColor {
                reserved: r.u8()?,
                color: r.hsbk()?,
                duration: r.u32()?,
            },
            MessageKind::LightState => Message::LightState {
                color: r.hsbk()?,
                reserved: r.i16()?,
                power: r.power()?,
                label: r.label()?,
                reserved2: r.u64()?,
            },
            MessageKind::LightGetPower => Message::LightGetPower,
            MessageKind::LightSetPower => Message::LightSetPower {
                level: r.power()?,
                duration: r.u32()?,
            },
            MessageKind::LightStatePower => Message::LightStatePower { level: r.power()? },
        };
        Ok(msg)
    }

    /// Serialize this message's payload section.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Message::GetService
            | Message::GetHostFirmware
            | Message::GetWifiInfo
            | Message::GetWifiFirmware
            | Message::GetPower
            | Message::GetLabel
            | Message::GetVersion
            | Message::GetInfo
            | Message::Acknowledgement
            | Message::GetLocation
            | Message::GetGroup
            | Message::LightGet
            | Message::LightGetPower => {}
            Message::StateService { service, port } => {
                out.push(*service as u8);
                put_u32(&mut out, *port);
            }
            Message::StateHostFirmware {
                build,
                reserved,
                version_minor,
                version_major,
            }
            | Message::StateWifiFirmware {
                build,
                reserved,
                version_minor,
                version_major,
            } => {
                put_u64(&mut out, *build);
                put_u64(&mut out, *reserved);
                put_u16(&mut out, *version_minor);
                put_u16(&mut out, *version_major);
            }
            Message::StateWifiInfo {
                signal,
                tx,
                rx,
                reserved,
            } => {
                out.extend_from_slice(&signal.to_le_bytes());
                put_u32(&mut out, *tx);
                put_u32(&mut out, *rx);
                out.extend_from_slice(&reserved.to_le_bytes());
            }
            Message::SetPower { level }
            | Message::StatePower { level }
            | Message::LightStatePower { level } => {
                put_u16(&mut out, level.level());
            }
            Message::SetLabel { label } | Message::StateLabel { label } => {
                out.extend_from_slice(&label.to_wire());
            }
            Message::StateVersion {
                vendor,
                product,
                version,
            } => {
                put_u32(&mut out, *vendor);
                put_u32(&mut out, *product);
                put_u32(&mut out, *version);
            }
            Message::StateInfo {
                time,
                uptime,
                downtime,
            } => {
                put_u64(&mut out, *time);
                put_u64(&mut out, *uptime);
                put_u64(&mut out, *downtime);
            }
            Message::SetLocation {
                location,
                label,
                updated_at,
            }
            | Message::StateLocation {
                location,
                label,
                updated_at,
            } => {
                out.extend_from_slice(&location.to_bytes_le());
                out.extend_from_slice(&label.to_wire());
                put_u64(&mut out, *updated_at);
            }
            Message::SetGroup {
                group,
                label,
                updated_at,
            }
            | Message::StateGroup {
                group,
                label,
                updated_at,
            } => {
                out.extend_from_slice(&group.to_bytes_le());
                out.extend_from_slice(&label.to_wire());
                put_u64(&mut out, *updated_at);
            }
            Message::EchoRequest { payload } | Message::EchoResponse { payload } => {
                out.extend_from_slice(&payload.0);
            }
            Message::LightSetColor {
                reserved,
                color,
                duration,
            } => {
                out.push(*reserved);
                put_hsbk(&mut out, color);
                put_u32(&mut out, *duration);
            }
            Message::LightState {
                color,
                reserved,
                power,
                label,
                reserved2,
            } => {
                put_hsbk(&mut out, color);
                out.extend_from_slice(&reserved.to_le_bytes());
                put_u16(&mut out, power.level());
                out.extend_from_slice(&label.to_wire());
                put_u64(&mut out, *reserved2);
            }
            Message::LightSetPower { level, duration } => {
                put_u16(&mut out, level.level());
                put_u32(&mut out, *duration);
            }
        }
        out
    }
}

/// A framed datagram: header plus raw payload bytes.
///
/// Framing and payload interpretation are separate steps so an unknown
/// message type still yields a usable header (the dispatcher needs its
/// flags to decide whether to acknowledge).
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl RawFrame {
    /// Decode one datagram.
    ///
    /// The declared total length must match the actual datagram size and
    /// the addressable bit must be set; anything else is a
    /// [`Error::MalformedHeader`].
    pub fn decode(bytes: &[u8]) -> Result<RawFrame> {
        let header = Header::unpack(bytes)?;
        if header.frame.size as usize != bytes.len() {
            return Err(Error::MalformedHeader(format!(
                "declared size {} but datagram is {} bytes",
                header.frame.size,
                bytes.len()
            )));
        }
        if !header.frame.addressable {
            return Err(Error::MalformedHeader("addressable bit clear".to_string()));
        }
        Ok(RawFrame {
            header,
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }

    /// Serialize into datagram bytes, recomputing the size field.
    pub fn encode(&self) -> Vec<u8> {
        let mut header = self.header;
        header.frame.size = (HEADER_SIZE + self.payload.len()) as u16;
        let mut out = header.pack();
        out.extend_from_slice(&self.payload);
        out
    }

    /// Build a device reply frame.
    ///
    /// Copies the request's source and sequence, stamps the device serial
    /// and site marker, and mirrors real-bulb replies (origin 1, untagged).
    pub fn response(
        msg: &Message,
        device: DeviceId,
        source: u32,
        sequence: u8,
        timestamp: u64,
    ) -> RawFrame {
        let payload = msg.to_payload();
        RawFrame {
            header: Header {
                frame: Frame {
                    size: (HEADER_SIZE + payload.len()) as u16,
                    origin: 1,
                    tagged: false,
                    addressable: true,
                    protocol: PROTOCOL_NUMBER,
                    source,
                },
                address: FrameAddress {
                    target: device.serial(),
                    site: SITE_MARKER,
                    ack_required: false,
                    res_required: false,
                    sequence,
                },
                protocol: ProtocolHeader {
                    timestamp,
                    message_type: msg.type_num(),
                    reserved: 0,
                },
            },
            payload,
        }
    }

    /// Build a client-side request frame. `target: None` produces a tagged
    /// broadcast frame addressed to all devices.
    pub fn request(
        msg: &Message,
        target: Option<u64>,
        source: u32,
        sequence: u8,
        ack_required: bool,
        res_required: bool,
    ) -> RawFrame {
        let payload = msg.to_payload();
        RawFrame {
            header: Header {
                frame: Frame {
                    size: (HEADER_SIZE + payload.len()) as u16,
                    origin: 0,
                    tagged: target.is_none(),
                    addressable: true,
                    protocol: PROTOCOL_NUMBER,
                    source,
                },
                address: FrameAddress {
                    target: target.unwrap_or(0),
                    site: [0; 6],
                    ack_required,
                    res_required,
                    sequence,
                },
                protocol: ProtocolHeader {
                    timestamp: 0,
                    message_type: msg.type_num(),
                    reserved: 0,
                },
            },
            payload,
        }
    }
}

/// Bounds-checked little-endian payload reader.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    message_type: u16,
}

impl<'a> Reader<'a> {
    fn new(message_type: u16, buf: &'a [u8]) -> Self {
        Reader {
            buf,
            pos: 0,
            message_type,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(Error::truncated(
                self.message_type,
                self.pos + n,
                self.buf.len(),
            ));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    fn power(&mut self) -> Result<PowerLevel> {
        let level = self.u16()?;
        PowerLevel::create(level).ok_or_else(|| Error::invalid_field("level", level as u64))
    }

    fn service(&mut self) -> Result<Service> {
        let value = self.u8()?;
        Service::create(value).ok_or_else(|| Error::invalid_field("service", value as u64))
    }

    fn hsbk(&mut self) -> Result<Hsbk> {
        Ok(Hsbk {
            hue: self.u16()?,
            saturation: self.u16()?,
            brightness: self.u16()?,
            kelvin: self.u16()?,
        })
    }

    fn label(&mut self) -> Result<Label> {
        let mut bytes = [0u8; Label::WIDTH];
        bytes.copy_from_slice(self.take(Label::WIDTH)?);
        Ok(Label::from_wire(&bytes))
    }

    /// GUIDs travel in the mixed-endian GUID byte order.
    fn uuid(&mut self) -> Result<Uuid> {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(self.take(16)?);
        Ok(Uuid::from_bytes_le(bytes))
    }

    fn echo(&mut self) -> Result<EchoPayload> {
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(self.take(64)?);
        Ok(EchoPayload(bytes))
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_hsbk(out: &mut Vec<u8>, color: &Hsbk) {
    put_u16(out, color.hue);
    put_u16(out, color.saturation);
    put_u16(out, color.brightness);
    put_u16(out, color.kelvin);
}
