mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "meshlink", version, about = "Mesh radio API-mode diagnostics")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "meshlink",
            "send",
            "/dev/ttyUSB0",
            "0013A20040A1B2C3",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.address.serial(), 0x0013_A200_40A1_B2C3);
                assert_eq!(args.packet_size, 64);
                assert!(!args.radio.socket);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "meshlink",
            "send",
            "/dev/ttyUSB0",
            "*",
            "--file",
            "payload.bin",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_malformed_address() {
        let err = Cli::try_parse_from(["meshlink", "send", "/dev/ttyUSB0", "12345", "--data", "x"])
            .expect_err("short address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn discover_needs_id_or_address() {
        let err = Cli::try_parse_from(["meshlink", "discover", "/dev/ttyUSB0"])
            .expect_err("missing target should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "meshlink",
            "discover",
            "/tmp/radio.sock",
            "--socket",
            "--address",
            "0013A20040000002",
        ])
        .expect("address lookup should parse");
        assert!(matches!(cli.command, Command::Discover(_)));
    }

    #[test]
    fn parses_info_subcommand() {
        let cli = Cli::try_parse_from(["meshlink", "info", "/dev/ttyUSB0", "--timeout", "500ms"])
            .expect("info args should parse");
        assert!(matches!(cli.command, Command::Info(_)));
    }
}
