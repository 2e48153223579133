use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use meshlink_frame::RxFrame;
use meshlink_peer::Node;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_nodes(nodes: &[Node], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for node in nodes {
                print_json(node);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NODE ID", "SERIAL", "NETWORK", "LOCAL"]);
            for node in nodes {
                table.add_row(vec![
                    node.id.clone(),
                    format!("{:016X}", node.address.serial()),
                    format!("{:04X}", node.address.network()),
                    if node.local { "yes" } else { "no" }.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for node in nodes {
                println!("{node}");
            }
        }
    }
}

#[derive(Serialize)]
struct RxOutput<'a> {
    source: String,
    options: u8,
    size: usize,
    data: String,
    timestamp: &'a str,
}

pub fn print_rx(rx: &RxFrame, format: OutputFormat) {
    let timestamp = now_unix_seconds();
    match format {
        OutputFormat::Json => print_json(&RxOutput {
            source: rx.source.to_string(),
            options: rx.options,
            size: rx.data.len(),
            data: payload_preview(&rx.data),
            timestamp: &timestamp,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOURCE", "SIZE", "DATA"])
                .add_row(vec![
                    rx.source.to_string(),
                    rx.data.len().to_string(),
                    payload_preview(&rx.data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "from={} size={} data={}",
                rx.source,
                rx.data.len(),
                payload_preview(&rx.data)
            );
        }
    }
}

/// UTF-8 text as is, anything else as hex.
pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => payload.iter().map(|b| format!("{b:02X}")).collect(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
