//! Stdin/stdout adapter for the command bus.
//!
//! The real hub client (websocket or otherwise) lives outside this
//! repo; in `run` mode the bridge speaks the same shapes as JSON lines
//! on standard streams, which is enough for a parent process or a
//! human with a pipe to drive it.

use std::io::BufRead;
use std::io::Write;

use tracing::debug;

use cli_bridge_daemon::BusCommand;
use cli_bridge_daemon::BusEvent;
use cli_bridge_daemon::BusHandler;
use cli_bridge_daemon::BusPublisher;

/// Publishes events as one JSON object per stdout line.
#[derive(Default)]
pub struct StdioPublisher;

impl BusPublisher for StdioPublisher {
    fn publish(&self, event: &BusEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{json}")?;
        stdout.flush()
    }
}

/// Read commands from `input` until EOF, handing each to the handler.
/// Unparseable lines are reported through `on_error` and skipped, in
/// line with the frame codec's noise tolerance.
pub fn serve(handler: &dyn BusHandler, input: impl BufRead) -> std::io::Result<()> {
    handler.on_open();
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<BusCommand>(line) {
            Ok(command) => {
                debug!(?command, "bus command received");
                handler.on_message(command);
            }
            Err(err) => handler.on_error(&err.to_string()),
        }
    }
    handler.on_close();
    Ok(())
}
