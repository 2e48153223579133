use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use meshlink_frame::{Frame, FrameKind};

use crate::cmd::{open_radio, ListenArgs};
use crate::exit::{CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_rx, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let conn = open_radio(&args.radio)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel::<Frame>();
    let listener = conn.add_listener(FrameKind::Rx, move |frame: &Frame| {
        let _ = tx.send(frame.clone());
    });

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let frame = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) if conn.is_closed() => {
                return Err(CliError::new(FAILURE, "radio disconnected"));
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let Some(packet) = frame.rx() else {
            continue;
        };
        if args.from.is_some_and(|from| from != packet.source) {
            continue;
        }

        print_rx(packet, format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    conn.remove_listener(listener);
    conn.close();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
