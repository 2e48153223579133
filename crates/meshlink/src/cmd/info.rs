use meshlink_frame::DecodeStats;
use meshlink_peer::{Node, NodeDirectory};
use serde::Serialize;

use crate::cmd::{open_radio, InfoArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct DecodeOutput {
    frames: u64,
    skipped_bytes: u64,
    rejected_frames: u64,
}

impl From<DecodeStats> for DecodeOutput {
    fn from(stats: DecodeStats) -> Self {
        Self {
            frames: stats.frames,
            skipped_bytes: stats.skipped_bytes,
            rejected_frames: stats.rejected_frames,
        }
    }
}

#[derive(Serialize)]
struct InfoOutput {
    local_node: Node,
    session: String,
    flow_control: String,
    decoder: DecodeOutput,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let conn = open_radio(&args.radio)?;
    let directory = NodeDirectory::new(conn.clone())
        .map_err(|err| peer_error("identity query failed", err))?;
    let local_node = directory
        .local_node()
        .map_err(|err| peer_error("identity query failed", err))?;

    let out = InfoOutput {
        local_node,
        session: conn.session_state().to_string(),
        flow_control: conn.flow_control().to_string(),
        decoder: conn.decode_stats().into(),
    };
    print_info(&out, format);

    drop(directory);
    conn.close();
    Ok(SUCCESS)
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Radio Info:");
            println!("  Node ID:       {}", out.local_node.id);
            println!("  Serial:        {:016X}", out.local_node.address.serial());
            println!("  Network:       {:04X}", out.local_node.address.network());
            println!("  Session:       {}", out.session);
            println!("  Flow control:  {}", out.flow_control);
            println!(
                "  Decoder:       {} frames, {} bytes skipped, {} rejected",
                out.decoder.frames, out.decoder.skipped_bytes, out.decoder.rejected_frames
            );
        }
    }
}
