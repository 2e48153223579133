use std::fs;
use std::io::Write;

use meshlink_peer::TunnelConfig;
use serde::Serialize;

use crate::cmd::{open_radio, SendArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct SendOutput {
    destination: String,
    bytes: usize,
    packets: usize,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    if payload.is_empty() {
        return Err(CliError::new(USAGE, "nothing to send: use --data or --file"));
    }

    let config = TunnelConfig {
        max_packet: args.packet_size,
        ..TunnelConfig::default()
    };
    let conn = open_radio(&args.radio)?;
    let mut tunnel = conn
        .open_tunnel_with_config(args.address, config)
        .map_err(|err| peer_error("tunnel setup failed", err))?;

    tunnel
        .write_all(&payload)
        .and_then(|()| tunnel.flush())
        .map_err(|err| io_error("send failed", err))?;
    tunnel.close();
    conn.close();

    let out = SendOutput {
        destination: args.address.to_string(),
        bytes: payload.len(),
        packets: payload.len().div_ceil(args.packet_size),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "sent {} bytes to {} in {} packets",
            out.bytes, out.destination, out.packets
        ),
    }
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
