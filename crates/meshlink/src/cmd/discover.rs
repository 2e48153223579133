use meshlink_peer::{DiscoveryConfig, NodeDirectory};

use crate::cmd::{open_radio, DiscoverArgs};
use crate::exit::{peer_error, CliError, CliResult, NOT_FOUND, SUCCESS, USAGE};
use crate::output::{print_nodes, OutputFormat};

pub fn run(args: DiscoverArgs, format: OutputFormat) -> CliResult<i32> {
    if args.attempts == 0 {
        return Err(CliError::new(USAGE, "--attempts must be at least 1"));
    }
    let config = DiscoveryConfig {
        window: args.window,
        attempts: args.attempts,
        ..DiscoveryConfig::default()
    };

    let conn = open_radio(&args.radio)?;
    let directory = NodeDirectory::with_config(conn.clone(), config)
        .map_err(|err| peer_error("discovery setup failed", err))?;

    let (target, found) = match (&args.node_id, args.address) {
        (_, Some(address)) => (
            address.to_string(),
            directory.resolve_by_address(address),
        ),
        (Some(id), None) => (id.clone(), directory.resolve_by_id(id, args.attempts)),
        (None, None) => {
            return Err(CliError::new(USAGE, "a node id or --address is required"));
        }
    };
    let found = found.map_err(|err| peer_error("discovery failed", err))?;

    drop(directory);
    conn.close();

    match found {
        Some(node) => {
            print_nodes(&[node], format);
            Ok(SUCCESS)
        }
        None => Err(CliError::new(
            NOT_FOUND,
            format!("node {target} did not answer after {} attempts", args.attempts),
        )),
    }
}
