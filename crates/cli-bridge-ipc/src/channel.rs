//! Duplex control channel to one target process.
//!
//! The target may not have finished opening its control endpoint at
//! discovery time, so `open` retries a fixed number of times at fixed
//! spacing before giving up. Reads are non-blocking: a stalled target
//! must never freeze the thread that services other sessions.

use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::debug;
use tracing::trace;

use cli_bridge_common::Sleeper;

use crate::envelope::RequestEnvelope;
use crate::error::ChannelError;

const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_CONNECT_SPACING_MS: u64 = 1000;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;
const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Bounded connect attempts; retrying forever would hang the
    /// bridge if the target never opens an endpoint.
    pub connect_attempts: u32,
    pub connect_spacing: Duration,
    pub write_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_spacing: Duration::from_millis(DEFAULT_CONNECT_SPACING_MS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
        }
    }
}

impl ChannelConfig {
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    pub fn with_connect_spacing(mut self, spacing: Duration) -> Self {
        self.connect_spacing = spacing;
        self
    }
}

/// Seam between the turn driver and the transport, so tests can script
/// a channel without a live socket.
pub trait TurnChannel {
    fn send(&mut self, request: &RequestEnvelope) -> Result<(), ChannelError>;

    /// Non-blocking read: `Ok(None)` when no bytes are pending.
    fn read_available(&mut self) -> Result<Option<Vec<u8>>, ChannelError>;
}

#[derive(Debug)]
pub struct ControlChannel {
    stream: UnixStream,
}

impl ControlChannel {
    /// Connect to a target's control endpoint, retrying on failure.
    pub fn open(
        path: &Path,
        config: &ChannelConfig,
        sleeper: &dyn Sleeper,
    ) -> Result<Self, ChannelError> {
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=config.connect_attempts {
            match UnixStream::connect(path) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(config.write_timeout))?;
                    debug!(path = %path.display(), attempt, "control channel opened");
                    return Ok(Self { stream });
                }
                Err(err) => {
                    trace!(path = %path.display(), attempt, error = %err, "connect failed");
                    last_error = err.to_string();
                    if attempt < config.connect_attempts {
                        sleeper.sleep(config.connect_spacing);
                    }
                }
            }
        }

        Err(ChannelError::Unavailable {
            attempts: config.connect_attempts,
            last_error,
        })
    }
}

impl TurnChannel for ControlChannel {
    fn send(&mut self, request: &RequestEnvelope) -> Result<(), ChannelError> {
        let json = serde_json::to_string(request)?;
        self.stream.write_all(json.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_available(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        self.stream.set_nonblocking(true)?;
        let result = drain_available(&mut self.stream);
        // Restore blocking mode before surfacing any error so a later
        // send is not silently turned non-blocking.
        self.stream.set_nonblocking(false)?;
        result
    }
}

fn drain_available(stream: &mut UnixStream) -> Result<Option<Vec<u8>>, ChannelError> {
    let mut collected = Vec::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                if collected.is_empty() {
                    return Err(ChannelError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "channel closed by target",
                    )));
                }
                break;
            }
            Ok(n) => collected.extend_from_slice(&buf[..n]),
            Err(err) if err.kind() == ErrorKind::WouldBlock => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ChannelError::Io(err)),
        }
    }

    if collected.is_empty() {
        Ok(None)
    } else {
        Ok(Some(collected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cli_bridge_common::MockSleeper;
    use std::io::BufRead;
    use std::io::BufReader;
    use std::os::unix::net::UnixListener;
    use std::thread;

    fn temp_socket_path(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        (dir, path)
    }

    #[test]
    fn test_open_fails_after_exactly_ten_attempts() {
        // Scenario: no endpoint ever appears; ten attempts at one
        // second spacing, sleeping between attempts but not after the
        // last one.
        let (_dir, path) = temp_socket_path("missing.sock");
        let sleeper = MockSleeper::new();
        let config = ChannelConfig::default();

        let err = ControlChannel::open(&path, &config, &sleeper).unwrap_err();
        match err {
            ChannelError::Unavailable { attempts, .. } => assert_eq!(attempts, 10),
            other => panic!("expected Unavailable, got {:?}", other),
        }
        assert_eq!(sleeper.call_count(), 9);
        assert_eq!(sleeper.total_duration(), Duration::from_secs(9));
    }

    #[test]
    fn test_open_succeeds_on_first_attempt_without_sleeping() {
        let (_dir, path) = temp_socket_path("ready.sock");
        let _listener = UnixListener::bind(&path).unwrap();
        let sleeper = MockSleeper::new();

        let channel = ControlChannel::open(&path, &ChannelConfig::default(), &sleeper);
        assert!(channel.is_ok());
        assert_eq!(sleeper.call_count(), 0);
    }

    #[test]
    fn test_send_writes_one_json_line() {
        let (_dir, path) = temp_socket_path("send.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let reader = thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(conn).read_line(&mut line).unwrap();
            line
        });

        let sleeper = MockSleeper::new();
        let mut channel =
            ControlChannel::open(&path, &ChannelConfig::default(), &sleeper).unwrap();
        channel.send(&RequestEnvelope::prompt("hi")).unwrap();

        let line = reader.join().unwrap();
        assert_eq!(line, "{\"command\":\"prompt\",\"text\":\"hi\"}\n");
    }

    #[test]
    fn test_read_available_returns_none_when_quiet() {
        let (_dir, path) = temp_socket_path("quiet.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let sleeper = MockSleeper::new();
        let mut channel =
            ControlChannel::open(&path, &ChannelConfig::default(), &sleeper).unwrap();
        let (_conn, _) = listener.accept().unwrap();

        assert!(channel.read_available().unwrap().is_none());
    }

    #[test]
    fn test_read_available_returns_pending_bytes() {
        let (_dir, path) = temp_socket_path("data.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let sleeper = MockSleeper::new();
        let mut channel =
            ControlChannel::open(&path, &ChannelConfig::default(), &sleeper).unwrap();

        let (mut conn, _) = listener.accept().unwrap();
        conn.write_all(b"{\"type\":\"response\",\"text\":\"hello\"}\n")
            .unwrap();
        conn.flush().unwrap();

        // Give the kernel a beat to move the bytes across.
        thread::sleep(Duration::from_millis(50));

        let bytes = channel.read_available().unwrap().unwrap();
        assert!(bytes.ends_with(b"\n"));
    }

    #[test]
    fn test_read_available_reports_closed_channel() {
        let (_dir, path) = temp_socket_path("closed.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let sleeper = MockSleeper::new();
        let mut channel =
            ControlChannel::open(&path, &ChannelConfig::default(), &sleeper).unwrap();

        let (conn, _) = listener.accept().unwrap();
        drop(conn);
        thread::sleep(Duration::from_millis(50));

        assert!(channel.read_available().is_err());
    }
}
