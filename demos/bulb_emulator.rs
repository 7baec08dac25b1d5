//! Run an emulated LIFX bulb whose "light" just prints channel writes.
//!
//! Point a LIFX-capable hub or app at this machine's network and the bulb
//! shows up like real hardware.
//!
//! Run with: cargo run --example bulb_emulator -- --label "Desk Lamp"

use std::process::exit;
use std::sync::{Arc, Mutex};

use clap::Parser;
use lifx_bulb_rs::{
    BulbEmulator, ChannelColor, ChannelSetup, ChannelState, ChannelWrite, EmulatorConfig, Error,
    LightActuator, SystemClock,
};

#[derive(Parser)]
#[command(name = "bulb-emulator")]
#[command(about = "Emulate a LIFX smart bulb on the local network", long_about = None)]
struct Cli {
    /// Device label shown to hubs
    #[arg(short, long, default_value = "Demo Bulb")]
    label: String,

    /// UDP port to bind and advertise
    #[arg(short, long, default_value = "56700")]
    port: u16,

    /// Hardware address, e.g. d0:73:d5:01:02:03
    #[arg(long)]
    mac: Option<String>,

    /// Emulate a split color+white LED pair instead of one RGBWW set
    #[arg(long)]
    split: bool,

    /// Broadcast unsolicited state updates after changes
    #[arg(long)]
    announce: bool,

    /// Debounce window for actuator writes, in milliseconds
    #[arg(long, default_value = "50")]
    debounce_ms: u64,
}

/// An actuator that prints every write and remembers the last one.
struct PrintActuator {
    name: &'static str,
    state: Mutex<ChannelState>,
}

impl PrintActuator {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(PrintActuator {
            name,
            state: Mutex::new(ChannelState {
                on: true,
                brightness: 1.0,
                color: ChannelColor::Mireds(370),
            }),
        })
    }
}

impl LightActuator for PrintActuator {
    fn set(&self, write: &ChannelWrite) -> Result<(), Error> {
        println!(
            "[{}] on={} brightness={:.2} color={:?} transition={}ms",
            self.name, write.on, write.brightness, write.color, write.transition_ms
        );
        *self.state.lock().unwrap() = ChannelState {
            on: write.on,
            brightness: write.brightness,
            color: write.color,
        };
        Ok(())
    }

    fn get(&self) -> Result<ChannelState, Error> {
        Ok(*self.state.lock().unwrap())
    }
}

fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let parts: Vec<u8> = s
        .split(':')
        .map(|p| u8::from_str_radix(p, 16))
        .collect::<Result<_, _>>()
        .ok()?;
    parts.try_into().ok()
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let mut config = EmulatorConfig {
        label: cli.label,
        port: cli.port,
        announce: cli.announce,
        debounce_ms: cli.debounce_ms,
        ..EmulatorConfig::default()
    };
    if let Some(mac) = &cli.mac {
        match parse_mac(mac) {
            Some(parsed) => config.mac = parsed,
            None => {
                eprintln!("invalid MAC address: {mac}");
                exit(2);
            }
        }
    }

    let channels = if cli.split {
        ChannelSetup::Split {
            color: PrintActuator::new("color"),
            white: PrintActuator::new("white"),
        }
    } else {
        ChannelSetup::Combined(PrintActuator::new("rgbww"))
    };

    println!("Starting bulb \"{}\" on port {}", config.label, config.port);
    BulbEmulator::new(config, channels, Arc::new(SystemClock))
        .run()
        .await
}
