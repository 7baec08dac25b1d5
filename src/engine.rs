//! The protocol engine: one UDP socket, one sequential dispatch loop.
//!
//! Each datagram is handled independently: decode, dispatch against the
//! device state and light bridge, emit zero or more reply datagrams.
//! Decode and dispatch errors are local to the datagram (drop and
//! continue); the only fatal error is failing to bind the socket at
//! startup.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;

use crate::actuator::Clock;
use crate::bridge::{ChannelSetup, LightBridge};
use crate::config::EmulatorConfig;
use crate::device::DeviceState;
use crate::errors::Error;
use crate::wire::{Header, Message, RawFrame, Service};

type Result<T> = std::result::Result<T, Error>;

/// Largest datagram the engine accepts. Matches the firmware's receive
/// buffer; every supported message fits well within it.
const MAX_DATAGRAM: usize = 512;

/// Ephemeral per-datagram context: who asked, and which replies they want.
///
/// Created on receipt, consumed during the single dispatch call, gone
/// afterwards; nothing survives across datagrams.
struct RequestContext {
    from: SocketAddr,
    source: u32,
    sequence: u8,
    ack_required: bool,
    res_required: bool,
}

impl RequestContext {
    fn new(header: &Header, from: SocketAddr) -> Self {
        RequestContext {
            from,
            source: header.frame.source,
            sequence: header.address.sequence,
            ack_required: header.address.ack_required,
            res_required: header.address.res_required,
        }
    }
}

/// A datagram queued for transmission.
struct Outbound {
    bytes: Vec<u8>,
    to: SocketAddr,
}

/// An emulated LIFX bulb.
///
/// Owns the device state and the light bridge; [`run`](Self::run) binds
/// the UDP socket and serves the protocol until the task is dropped.
pub struct BulbEmulator {
    config: EmulatorConfig,
    device: DeviceState,
    bridge: LightBridge,
    started: Instant,
    rx_bytes: u32,
    tx_bytes: u32,
}

impl BulbEmulator {
    pub fn new(config: EmulatorConfig, channels: ChannelSetup, clock: Arc<dyn Clock>) -> Self {
        let device = DeviceState::new(&config, clock);
        let bridge = LightBridge::new(channels, Duration::from_millis(config.debounce_ms));
        BulbEmulator {
            config,
            device,
            bridge,
            started: Instant::now(),
            rx_bytes: 0,
            tx_bytes: 0,
        }
    }

    /// Bind the socket and serve the protocol forever.
    ///
    /// Returns only on startup failure (socket acquisition); everything
    /// after that is drop-and-continue.
    pub async fn run(mut self) -> Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.config.port))
            .await
            .map_err(|e| Error::socket("bind", e))?;
        socket
            .set_broadcast(true)
            .map_err(|e| Error::socket("set_broadcast", e))?;
        info!(
            "emulating bulb {} ({}) on port {}",
            self.device.label(),
            self.device.id(),
            self.config.port
        );

        let _flusher = self.bridge.spawn_flusher();
        // Sync the actuator with the configured boot state.
        self.bridge.apply(self.device.color(), self.device.power(), 0);

        let mut startup = Vec::new();
        self.announce(&mut startup);
        for out in startup {
            if let Err(err) = socket.send_to(&out.bytes, out.to).await {
                warn!("startup announce failed: {}", err);
            }
        }

        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(err) => {
                    error!("socket receive error: {}", err);
                    continue;
                }
            };
            for out in self.handle_datagram(&buf[..len], from) {
                if let Err(err) = socket.send_to(&out.bytes, out.to).await {
                    warn!("send to {} failed: {}", out.to, err);
                }
            }
        }
    }

    /// Process one datagram and collect the datagrams to send back.
    fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr) -> Vec<Outbound> {
        let mut out = Vec::new();
        let raw = match RawFrame::decode(bytes) {
            Ok(raw) => raw,
            Err(err) => {
                // Malformed frames are never echoed or answered.
                debug!("dropping datagram from {}: {}", from, err);
                return out;
            }
        };
        self.rx_bytes = self.rx_bytes.wrapping_add(bytes.len() as u32);

        let header = raw.header;
        if !header.frame.tagged && !self.device.id().matches_target(header.address.target) {
            debug!(
                "ignoring frame for target {:#x} (not us)",
                header.address.target
            );
            return out;
        }

        let ctx = RequestContext::new(&header, from);
        match Message::from_raw(&raw) {
            Ok(msg) => {
                if msg.kind().is_device_reply() {
                    // Replies from other bulbs on the segment; answering
                    // them would let two emulators ping-pong forever.
                    debug!("ignoring {:?} from another device", msg.kind());
                    return out;
                }
                debug!("{:?} from {}", msg.kind(), from);
                let changed = self.dispatch(msg, &ctx, &mut out);
                if ctx.ack_required {
                    self.reply(&Message::Acknowledgement, &ctx, &mut out);
                }
                if changed && self.config.announce {
                    self.announce(&mut out);
                }
            }
            Err(Error::UnknownMessageType(num)) => {
                // Forward compatibility: unknown types are dropped, but the
                // header is intact so an explicit ack request is honored.
                debug!("unknown message type {} from {}", num, from);
                if ctx.ack_required {
                    self.reply(&Message::Acknowledgement, &ctx, &mut out);
                }
            }
            Err(err) => {
                // Truncated or out-of-domain payload: the frame could not
                // be interpreted as a whole, so no ack either.
                debug!("dropping payload from {}: {}", from, err);
            }
        }
        out
    }

    /// Execute one decoded message. Returns whether the light state
    /// (power, color, label) materially changed.
    fn dispatch(&mut self, msg: Message, ctx: &RequestContext, out: &mut Vec<Outbound>) -> bool {
        match msg {
            Message::GetService => {
                // A real bulb answers discovery twice, for UDP and the
                // undocumented service 5.
                for service in [Service::Udp, Service::Udp5] {
                    self.reply(
                        &Message::StateService {
                            service,
                            port: self.config.port as u32,
                        },
                        ctx,
                        out,
                    );
                }
                false
            }
            Message::GetPower => {
                let (_, power) = self.bridge.read();
                self.reply(&Message::StatePower { level: power }, ctx, out);
                false
            }
            Message::LightGetPower => {
                let (_, power) = self.bridge.read();
                self.reply(&Message::LightStatePower { level: power }, ctx, out);
                false
            }
            Message::SetPower { level } => {
                self.device.set_power(level);
                self.bridge.apply(self.device.color(), level, 0);
                if ctx.res_required {
                    let (_, power) = self.bridge.read();
                    self.reply(&Message::StatePower { level: power }, ctx, out);
                }
                true
            }
            Message::LightSetPower { level, duration } => {
                self.device.set_power(level);
                self.bridge.apply(self.device.color(), level, duration);
                if ctx.res_required {
                    let (_, power) = self.bridge.read();
                    self.reply(&Message::LightStatePower { level: power }, ctx, out);
                }
                true
            }
            Message::LightGet => {
                let state = self.light_state();
                self.reply(&state, ctx, out);
                false
            }
            Message::LightSetColor {
                color, duration, ..
            } => {
                self.device.set_hsbk(color);
                self.bridge
                    .apply(self.device.color(), self.device.power(), duration);
                if ctx.res_required {
                    // Read-back, not echo: the caller sees what actually
                    // stuck, including any actuator-side clamping.
                    let state = self.light_state();
                    self.reply(&state, ctx, out);
                }
                true
            }
            Message::GetLabel => {
                self.reply(
                    &Message::StateLabel {
                        label: self.device.label().clone(),
                    },
                    ctx,
                    out,
                );
                false
            }
            Message::SetLabel { label } => {
                self.device.set_label(label);
                if ctx.res_required {
                    self.reply(
                        &Message::StateLabel {
                            label: self.device.label().clone(),
                        },
                        ctx,
                        out,
                    );
                }
                true
            }
            Message::GetGroup => {
                let group = self.device.group().clone();
                self.reply(
                    &Message::StateGroup {
                        group: group.guid,
                        label: group.label,
                        updated_at: group.updated_at,
                    },
                    ctx,
                    out,
                );
                false
            }
            Message::SetGroup {
                group,
                label,
                updated_at,
            } => {
                self.device.set_group(group, label, updated_at);
                if ctx.res_required {
                    let group = self.device.group().clone();
                    self.reply(
                        &Message::StateGroup {
                            group: group.guid,
                            label: group.label,
                            updated_at: group.updated_at,
                        },
                        ctx,
                        out,
                    );
                }
                false
            }
            Message::GetLocation => {
                let location = self.device.location().clone();
                self.reply(
                    &Message::StateLocation {
                        location: location.guid,
                        label: location.label,
                        updated_at: location.updated_at,
                    },
                    ctx,
                    out,
                );
                false
            }
            Message::SetLocation {
                location,
                label,
                updated_at,
            } => {
                self.device.set_location(location, label, updated_at);
                if ctx.res_required {
                    let location = self.device.location().clone();
                    self.reply(
                        &Message::StateLocation {
                            location: location.guid,
                            label: location.label,
                            updated_at: location.updated_at,
                        },
                        ctx,
                        out,
                    );
                }
                false
            }
            Message::GetVersion => {
                self.reply(
                    &Message::StateVersion {
                        vendor: self.device.vendor(),
                        product: self.device.product(),
                        version: self.device.hardware_version(),
                    },
                    ctx,
                    out,
                );
                false
            }
            Message::GetHostFirmware => {
                self.reply(
                    &Message::StateHostFirmware {
                        build: self.config.firmware_build,
                        reserved: 0,
                        version_minor: self.config.firmware_version_minor,
                        version_major: self.config.firmware_version_major,
                    },
                    ctx,
                    out,
                );
                false
            }
            Message::GetWifiFirmware => {
                self.reply(
                    &Message::StateWifiFirmware {
                        build: self.config.wifi_firmware_build,
                        reserved: 0,
                        version_minor: self.config.wifi_firmware_version_minor,
                        version_major: self.config.wifi_firmware_version_major,
                    },
                    ctx,
                    out,
                );
                false
            }
            Message::GetWifiInfo => {
                self.reply(
                    &Message::StateWifiInfo {
                        signal: self.config.wifi_signal,
                        tx: self.tx_bytes,
                        rx: self.rx_bytes,
                        reserved: 0,
                    },
                    ctx,
                    out,
                );
                false
            }
            Message::GetInfo => {
                self.reply(
                    &Message::StateInfo {
                        time: self.device.reply_timestamp(),
                        uptime: self.started.elapsed().as_nanos() as u64,
                        downtime: 0,
                    },
                    ctx,
                    out,
                );
                false
            }
            Message::EchoRequest { payload } => {
                self.reply(&Message::EchoResponse { payload }, ctx, out);
                false
            }
            // Device-reply kinds were filtered out before dispatch.
            _ => false,
        }
    }

    /// Snapshot the current light state for LightState replies.
    fn light_state(&mut self) -> Message {
        let (color, power) = self.bridge.read();
        Message::LightState {
            color: color.hsbk,
            reserved: 0,
            power,
            label: self.device.label().clone(),
            reserved2: 0,
        }
    }

    fn reply(&mut self, msg: &Message, ctx: &RequestContext, out: &mut Vec<Outbound>) {
        let frame = RawFrame::response(
            msg,
            self.device.id(),
            ctx.source,
            ctx.sequence,
            self.device.reply_timestamp(),
        );
        let bytes = frame.encode();
        self.tx_bytes = self.tx_bytes.wrapping_add(bytes.len() as u32);
        out.push(Outbound {
            bytes,
            to: ctx.from,
        });
    }

    /// Best-effort unsolicited state broadcast so caching hubs refresh
    /// without polling. Never required for correctness.
    fn announce(&mut self, out: &mut Vec<Outbound>) {
        if !self.config.announce {
            return;
        }
        let state = self.light_state();
        let frame = RawFrame::response(
            &state,
            self.device.id(),
            0,
            0,
            self.device.reply_timestamp(),
        );
        let bytes = frame.encode();
        self.tx_bytes = self.tx_bytes.wrapping_add(bytes.len() as u32);
        out.push(Outbound {
            bytes,
            to: SocketAddr::from((Ipv4Addr::BROADCAST, self.config.port)),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ChannelColor, ChannelState, ChannelWrite, LightActuator};
    use crate::types::{Hsbk, Label, PowerLevel};
    use crate::wire::EchoPayload;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeActuator {
        writes: Mutex<Vec<ChannelWrite>>,
        unavailable: AtomicBool,
    }

    impl LightActuator for FakeActuator {
        fn set(&self, write: &ChannelWrite) -> Result<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(Error::ActuatorUnavailable);
            }
            self.writes.lock().unwrap().push(*write);
            Ok(())
        }

        fn get(&self) -> Result<ChannelState> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(Error::ActuatorUnavailable);
            }
            let on = self.writes.lock().unwrap().last().map(|w| w.on).unwrap_or(true);
            Ok(ChannelState {
                on,
                brightness: 1.0,
                color: ChannelColor::Mireds(370),
            })
        }
    }

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_nanos(&self) -> u64 {
            self.0
        }
    }

    fn emulator_with(config: EmulatorConfig) -> (BulbEmulator, Arc<FakeActuator>) {
        let led = Arc::new(FakeActuator::default());
        let emulator = BulbEmulator::new(
            config,
            ChannelSetup::Combined(led.clone()),
            Arc::new(FixedClock(1_700_000_000_000_000_000)),
        );
        (emulator, led)
    }

    fn emulator() -> (BulbEmulator, Arc<FakeActuator>) {
        emulator_with(EmulatorConfig::default())
    }

    fn hub() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 50], 41000))
    }

    fn send(emulator: &mut BulbEmulator, frame: &RawFrame) -> Vec<(Message, Header)> {
        emulator
            .handle_datagram(&frame.encode(), hub())
            .into_iter()
            .map(|out| {
                let raw = RawFrame::decode(&out.bytes).unwrap();
                (Message::from_raw(&raw).unwrap(), raw.header)
            })
            .collect()
    }

    #[test]
    fn test_broadcast_get_service_advertises_port_and_serial() {
        let (mut emulator, _) = emulator();
        let request = RawFrame::request(&Message::GetService, None, 0xabcd, 5, false, true);
        let replies = send(&mut emulator, &request);
        assert_eq!(replies.len(), 2);
        assert_eq!(
            replies[0].0,
            Message::StateService {
                service: Service::Udp,
                port: 56700,
            }
        );
        assert_eq!(
            replies[1].0,
            Message::StateService {
                service: Service::Udp5,
                port: 56700,
            }
        );
        for (_, header) in &replies {
            assert_eq!(header.address.target, emulator.device.id().serial());
            assert_eq!(header.frame.source, 0xabcd);
            assert_eq!(header.address.sequence, 5);
        }
    }

    #[test]
    fn test_set_power_applies_and_replies_with_sequence() {
        let (mut emulator, led) = emulator();
        let request = RawFrame::request(
            &Message::SetPower {
                level: PowerLevel::Enabled,
            },
            Some(emulator.device.id().serial()),
            1,
            7,
            false,
            true,
        );
        let replies = send(&mut emulator, &request);
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].0,
            Message::StatePower {
                level: PowerLevel::Enabled,
            }
        );
        assert_eq!(replies[0].1.address.sequence, 7);

        emulator.bridge.flush_now().unwrap();
        assert!(led.writes.lock().unwrap().last().unwrap().on);
    }

    #[test]
    fn test_unknown_type_with_ack_yields_single_ack() {
        let (mut emulator, _) = emulator();
        let mut request = RawFrame::request(&Message::GetService, None, 3, 9, true, true);
        request.header.protocol.message_type = 0x0bb8;
        let replies = send(&mut emulator, &request);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, Message::Acknowledgement);
        assert_eq!(replies[0].1.address.sequence, 9);
    }

    #[test]
    fn test_malformed_datagrams_get_no_reply() {
        let (mut emulator, _) = emulator();
        // Truncated header.
        assert!(emulator.handle_datagram(&[0u8; 10], hub()).is_empty());
        // Declared size disagrees with actual size.
        let mut bytes = RawFrame::request(&Message::GetService, None, 0, 0, true, true).encode();
        bytes.push(0);
        assert!(emulator.handle_datagram(&bytes, hub()).is_empty());
    }

    #[test]
    fn test_truncated_payload_gets_no_reply_and_no_ack() {
        let (mut emulator, _) = emulator();
        let mut request = RawFrame::request(
            &Message::SetLabel {
                label: Label::new("Porch"),
            },
            None,
            0,
            0,
            true,
            true,
        );
        request.payload.truncate(4);
        assert!(emulator
            .handle_datagram(&request.encode(), hub())
            .is_empty());
    }

    #[test]
    fn test_set_color_then_get_returns_just_set_values() {
        let (mut emulator, _) = emulator();
        let color = Hsbk {
            hue: 10000,
            saturation: 20000,
            brightness: 30000,
            kelvin: 4000,
        };
        let set = RawFrame::request(
            &Message::LightSetColor {
                reserved: 0,
                color,
                duration: 500,
            },
            None,
            2,
            1,
            false,
            true,
        );
        let replies = send(&mut emulator, &set);
        assert_eq!(replies.len(), 1);
        match &replies[0].0 {
            Message::LightState { color: got, power, .. } => {
                assert_eq!(*got, color);
                assert_eq!(*power, PowerLevel::Enabled);
            }
            other => panic!("expected LightState, got {:?}", other),
        }

        let get = RawFrame::request(&Message::LightGet, None, 2, 2, false, true);
        let replies = send(&mut emulator, &get);
        match &replies[0].0 {
            Message::LightState { color: got, .. } => assert_eq!(*got, color),
            other => panic!("expected LightState, got {:?}", other),
        }
    }

    #[test]
    fn test_group_write_is_pure_overwrite() {
        let (mut emulator, _) = emulator();
        let newer = RawFrame::request(
            &Message::SetGroup {
                group: Uuid::from_u128(1),
                label: Label::new("newer"),
                updated_at: 2_000,
            },
            None,
            0,
            0,
            false,
            false,
        );
        send(&mut emulator, &newer);
        let older = RawFrame::request(
            &Message::SetGroup {
                group: Uuid::from_u128(2),
                label: Label::new("older"),
                updated_at: 1_000,
            },
            None,
            0,
            0,
            false,
            false,
        );
        send(&mut emulator, &older);

        let get = RawFrame::request(&Message::GetGroup, None, 0, 0, false, true);
        let replies = send(&mut emulator, &get);
        assert_eq!(
            replies[0].0,
            Message::StateGroup {
                group: Uuid::from_u128(2),
                label: Label::new("older"),
                updated_at: 1_000,
            }
        );
    }

    #[test]
    fn test_query_survives_unavailable_actuator() {
        let (mut emulator, led) = emulator();
        led.unavailable.store(true, Ordering::SeqCst);
        let get = RawFrame::request(&Message::LightGet, None, 0, 0, false, true);
        let replies = send(&mut emulator, &get);
        assert_eq!(replies.len(), 1);
        match &replies[0].0 {
            Message::LightState { power, .. } => assert_eq!(*power, PowerLevel::Enabled),
            other => panic!("expected LightState, got {:?}", other),
        }
    }

    #[test]
    fn test_echo_round_trip() {
        let (mut emulator, _) = emulator();
        let payload = EchoPayload([0x5a; 64]);
        let request = RawFrame::request(&Message::EchoRequest { payload }, None, 0, 0, false, true);
        let replies = send(&mut emulator, &request);
        assert_eq!(replies[0].0, Message::EchoResponse { payload });
    }

    #[test]
    fn test_frames_for_other_devices_are_ignored() {
        let (mut emulator, _) = emulator();
        let request = RawFrame::request(
            &Message::LightGet,
            Some(0x1122_3344_5566),
            0,
            0,
            false,
            true,
        );
        assert!(emulator
            .handle_datagram(&request.encode(), hub())
            .is_empty());
    }

    #[test]
    fn test_own_announce_loopback_is_ignored() {
        // Broadcast announces come back to us with our own serial as the
        // target; answering them would echo forever.
        let (mut emulator, _) = emulator();
        let loopback = RawFrame::response(
            &Message::StateService {
                service: Service::Udp,
                port: 56700,
            },
            emulator.device.id(),
            0,
            0,
            0,
        );
        assert!(emulator
            .handle_datagram(&loopback.encode(), hub())
            .is_empty());
    }

    #[test]
    fn test_announce_broadcasts_on_state_change() {
        let config = EmulatorConfig {
            announce: true,
            ..EmulatorConfig::default()
        };
        let (mut emulator, _) = emulator_with(config);
        let set = RawFrame::request(
            &Message::SetPower {
                level: PowerLevel::Standby,
            },
            None,
            0,
            0,
            false,
            false,
        );
        let out = emulator.handle_datagram(&set.encode(), hub());
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].to,
            SocketAddr::from((Ipv4Addr::BROADCAST, 56700))
        );
        let raw = RawFrame::decode(&out[0].bytes).unwrap();
        assert!(matches!(
            Message::from_raw(&raw).unwrap(),
            Message::LightState { .. }
        ));
    }

    #[test]
    fn test_version_reports_configured_identity() {
        let (mut emulator, _) = emulator();
        let get = RawFrame::request(&Message::GetVersion, None, 0, 0, false, true);
        let replies = send(&mut emulator, &get);
        assert_eq!(
            replies[0].0,
            Message::StateVersion {
                vendor: 1,
                product: 22,
                version: 0,
            }
        );
    }

    #[test]
    fn test_set_label_readback() {
        let (mut emulator, _) = emulator();
        let set = RawFrame::request(
            &Message::SetLabel {
                label: Label::new("Hallway"),
            },
            None,
            0,
            0,
            true,
            true,
        );
        let replies = send(&mut emulator, &set);
        // Typed read-back first, then the requested ack.
        assert_eq!(replies.len(), 2);
        assert_eq!(
            replies[0].0,
            Message::StateLabel {
                label: Label::new("Hallway"),
            }
        );
        assert_eq!(replies[1].0, Message::Acknowledgement);
    }
}
