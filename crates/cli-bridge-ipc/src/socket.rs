use std::path::PathBuf;

/// Directory holding target control sockets.
///
/// The patched target opens its control endpoint next to the runtime
/// dir; `CLI_BRIDGE_SOCKET_DIR` overrides for tests.
pub fn socket_dir() -> PathBuf {
    if let Ok(custom) = std::env::var("CLI_BRIDGE_SOCKET_DIR") {
        return PathBuf::from(custom);
    }

    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Control endpoint for one target process, addressed by pid.
///
/// A channel address is only meaningful while the OS process is alive;
/// stale socket files for dead pids are expected and harmless.
pub fn control_socket_path(program: &str, pid: u32) -> PathBuf {
    socket_dir().join(format!("{}-{}.sock", program, pid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_is_keyed_by_program_and_pid() {
        let path = control_socket_path("gemini-cli", 4242);
        let name = path.file_name().unwrap().to_string_lossy();
        assert_eq!(name, "gemini-cli-4242.sock");
    }

    #[test]
    fn test_distinct_pids_get_distinct_paths() {
        assert_ne!(
            control_socket_path("gemini-cli", 1),
            control_socket_path("gemini-cli", 2)
        );
    }
}
