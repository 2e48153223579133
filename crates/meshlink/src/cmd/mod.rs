use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use meshlink_frame::Address;
use meshlink_peer::{Connection, ConnectionConfig};
use meshlink_transport::{SerialChannel, SerialConfig, SocketChannel};

use crate::exit::{peer_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod discover;
pub mod info;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a radio session and print the local node.
    Info(InfoArgs),
    /// Find a node by node identifier or address.
    Discover(DiscoverArgs),
    /// Send data to a node.
    Send(SendArgs),
    /// Print data packets received by the radio.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Info(args) => info::run(args, format),
        Command::Discover(args) => discover::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the radio is attached.
#[derive(Args, Debug)]
pub struct RadioArgs {
    /// Serial device, or socket path with --socket.
    pub device: PathBuf,
    /// DEVICE is a Unix socket bridged to the radio.
    #[arg(long)]
    pub socket: bool,
    /// Serial baud rate.
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// Handshake timeout (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub radio: RadioArgs,
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub radio: RadioArgs,
    /// Node identifier to look for.
    #[arg(required_unless_present = "address", conflicts_with = "address")]
    pub node_id: Option<String>,
    /// Ask this address for its node identifier instead.
    #[arg(long)]
    pub address: Option<Address>,
    /// Discovery attempts.
    #[arg(long, default_value_t = 3)]
    pub attempts: usize,
    /// Discovery window in radio units of 100ms (0x20-0xFF).
    #[arg(long, default_value = "0x20", value_parser = parse_window)]
    pub window: u8,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub radio: RadioArgs,
    /// Destination address (16 hex digits, `*` for broadcast).
    pub address: Address,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Bytes per radio packet.
    #[arg(long, default_value_t = 64)]
    pub packet_size: usize,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub radio: RadioArgs,
    /// Only print packets from this address.
    #[arg(long)]
    pub from: Option<Address>,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open the channel and run the session handshake.
pub fn open_radio(args: &RadioArgs) -> CliResult<Arc<Connection>> {
    let config = ConnectionConfig {
        handshake_timeout: parse_duration(&args.timeout)?,
        ..ConnectionConfig::default()
    };

    let opened = if args.socket {
        let channel = SocketChannel::connect(&args.device)
            .map_err(|err| transport_error("connect failed", err))?;
        Connection::open_with_config(channel, config)
    } else {
        let serial = SerialConfig {
            baud_rate: args.baud,
        };
        let channel = SerialChannel::open_with_config(&args.device, &serial)
            .map_err(|err| transport_error("open failed", err))?;
        Connection::open_with_config(channel, config)
    };
    opened.map_err(|err| peer_error("radio session failed", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

fn parse_window(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid discovery window: {input}"))
}
