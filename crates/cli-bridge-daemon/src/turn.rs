//! Turn driver: pumps one request through a channel until the
//! accumulator reaches a terminal state.
//!
//! Reads are non-blocking, so the driver sleeps a short tick between
//! polls instead of parking on the socket. The caller runs this on a
//! worker thread; a stalled target costs that thread, nothing else.

use std::time::Duration;
use std::time::Instant;

use tracing::debug;

use cli_bridge_common::Sleeper;
use cli_bridge_core::FrameDecoder;
use cli_bridge_core::TurnAccumulator;
use cli_bridge_core::TurnConfig;
use cli_bridge_core::TurnResult;
use cli_bridge_ipc::RequestEnvelope;
use cli_bridge_ipc::TurnChannel;

use crate::error::BridgeError;

/// Send `request` and accumulate the response into one turn.
pub fn run_turn(
    channel: &mut dyn TurnChannel,
    request: &RequestEnvelope,
    config: &TurnConfig,
    tick: Duration,
    sleeper: &dyn Sleeper,
) -> Result<TurnResult, BridgeError> {
    run_turn_with_handled(channel, request, config, tick, sleeper).map(|(result, _)| result)
}

/// Like `run_turn` but also reports whether the target acknowledged
/// the prompt as a handled command with no visible output.
pub fn run_turn_with_handled(
    channel: &mut dyn TurnChannel,
    request: &RequestEnvelope,
    config: &TurnConfig,
    tick: Duration,
    sleeper: &dyn Sleeper,
) -> Result<(TurnResult, bool), BridgeError> {
    channel.send(request)?;

    let mut decoder = FrameDecoder::new();
    let mut accumulator = TurnAccumulator::new(config.clone());
    accumulator.start(Instant::now());

    loop {
        if let Some(bytes) = channel.read_available()? {
            let now = Instant::now();
            for message in decoder.push(&bytes) {
                accumulator.on_message(message, now);
            }
        }

        accumulator.poll(Instant::now());
        if accumulator.is_terminal() {
            break;
        }
        sleeper.sleep(tick);
    }

    let handled = accumulator.command_handled();
    let result = accumulator.finish();
    debug!(
        completed = result.completed,
        timed_out = result.timed_out,
        handled,
        bytes = result.full_text.len(),
        "turn finished"
    );
    Ok((result, handled))
}
