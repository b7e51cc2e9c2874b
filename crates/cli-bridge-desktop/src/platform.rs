//! Platform backends for the `Desktop` trait.
//!
//! Windows drives windows through short PowerShell invocations
//! (`AppActivate`, `SendKeys`, `Get-Clipboard`); everything it needs
//! ships with the OS, so there is no native FFI surface to maintain.
//! Other platforms get a stub that reports `Unsupported`, which the
//! orchestrator treats as "fallback unavailable" rather than a crash.

use crate::desktop::Desktop;
use crate::desktop::WindowInfo;

/// Backend for the current platform.
pub fn platform_desktop() -> Box<dyn Desktop> {
    #[cfg(windows)]
    {
        Box::new(windows::WindowsDesktop::new())
    }
    #[cfg(not(windows))]
    {
        Box::new(unsupported::UnsupportedDesktop)
    }
}

/// Parse enumeration output, one `handle|class|title` line per window.
/// Titles may themselves contain the separator; malformed lines are
/// skipped.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_window_lines(stdout: &str) -> Vec<WindowInfo> {
    let mut windows = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.splitn(3, '|');
        let (Some(handle), Some(class), Some(title)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let Ok(id) = handle.trim().parse::<u64>() else {
            continue;
        };
        windows.push(WindowInfo {
            id,
            title: title.trim().to_string(),
            class: class.trim().to_string(),
        });
    }
    windows
}

#[cfg(windows)]
mod windows {
    use std::process::Command;

    use tracing::debug;

    use crate::desktop::Desktop;
    use crate::desktop::WindowInfo;
    use crate::error::DesktopError;

    const FOCUS_SETTLE_SENDKEYS_DELAY_MS: u64 = 150;

    pub struct WindowsDesktop {
        _private: (),
    }

    impl WindowsDesktop {
        pub fn new() -> Self {
            Self { _private: () }
        }

        fn powershell(script: &str) -> Result<String, DesktopError> {
            let output = Command::new("powershell")
                .args(["-NoProfile", "-NonInteractive", "-Command", script])
                .output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DesktopError::Input(stderr.trim().to_string()));
            }
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }

        /// SendKeys treats `+^%~(){}[]` as control characters; wrap
        /// each in braces so prompts arrive verbatim.
        fn escape_sendkeys(text: &str) -> String {
            let mut escaped = String::with_capacity(text.len());
            for c in text.chars() {
                match c {
                    '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => {
                        escaped.push('{');
                        escaped.push(c);
                        escaped.push('}');
                    }
                    _ => escaped.push(c),
                }
            }
            escaped
        }

        fn send_keys(&self, keys: &str) -> Result<(), DesktopError> {
            let script = format!(
                "Add-Type -AssemblyName System.Windows.Forms; \
                 Start-Sleep -Milliseconds {FOCUS_SETTLE_SENDKEYS_DELAY_MS}; \
                 [System.Windows.Forms.SendKeys]::SendWait('{}')",
                keys.replace('\'', "''"),
            );
            Self::powershell(&script)?;
            Ok(())
        }
    }

    impl Desktop for WindowsDesktop {
        fn list_windows(&self) -> Result<Vec<WindowInfo>, DesktopError> {
            // Get-Process exposes the main window handle and title but
            // not the class, so resolve it per window through
            // GetClassName. One `handle|class|title` line per window.
            let script = "Add-Type @'\n\
                 using System;\n\
                 using System.Text;\n\
                 using System.Runtime.InteropServices;\n\
                 public class Wnd {\n\
                   [DllImport(\"user32.dll\", CharSet=CharSet.Auto)]\n\
                   public static extern int GetClassName(IntPtr h, StringBuilder s, int n);\n\
                 }\n\
                 '@; Get-Process | Where-Object { $_.MainWindowTitle } | ForEach-Object { \
                 $sb = New-Object System.Text.StringBuilder 256; \
                 [void][Wnd]::GetClassName($_.MainWindowHandle, $sb, 256); \
                 \"$($_.MainWindowHandle)|$($sb.ToString())|$($_.MainWindowTitle)\" }";
            let stdout = Self::powershell(script)?;
            let windows = super::parse_window_lines(&stdout);
            debug!(count = windows.len(), "enumerated candidate windows");
            Ok(windows)
        }

        fn focus_window(&self, id: u64) -> Result<bool, DesktopError> {
            let script = format!(
                "Add-Type @'\n\
                 using System;\n\
                 using System.Runtime.InteropServices;\n\
                 public class Fg {{\n\
                   [DllImport(\"user32.dll\")]\n\
                   public static extern bool SetForegroundWindow(IntPtr h);\n\
                 }}\n\
                 '@; [Fg]::SetForegroundWindow([IntPtr]{id})"
            );
            let stdout = Self::powershell(&script)?;
            Ok(stdout.trim().eq_ignore_ascii_case("true"))
        }

        fn tap_release_key(&self) -> Result<(), DesktopError> {
            // A lone ALT tap registers as user input and unlocks
            // foreground changes without altering the target's state.
            self.send_keys("%")
        }

        fn type_text(&self, text: &str) -> Result<(), DesktopError> {
            self.send_keys(&Self::escape_sendkeys(text))
        }

        fn press_enter(&self) -> Result<(), DesktopError> {
            self.send_keys("{ENTER}")
        }

        fn capture_text(&self, _id: u64) -> Result<String, DesktopError> {
            // Select-all + copy against the focused console, then read
            // the clipboard back.
            self.send_keys("^a^c")?;
            Self::powershell("Get-Clipboard -Raw")
                .map_err(|e| DesktopError::Clipboard(e.to_string()))
        }
    }

}

#[cfg(not(windows))]
mod unsupported {
    use crate::desktop::Desktop;
    use crate::desktop::WindowInfo;
    use crate::error::DesktopError;

    pub struct UnsupportedDesktop;

    impl Desktop for UnsupportedDesktop {
        fn list_windows(&self) -> Result<Vec<WindowInfo>, DesktopError> {
            Err(DesktopError::Unsupported)
        }

        fn focus_window(&self, _id: u64) -> Result<bool, DesktopError> {
            Err(DesktopError::Unsupported)
        }

        fn tap_release_key(&self) -> Result<(), DesktopError> {
            Err(DesktopError::Unsupported)
        }

        fn type_text(&self, _text: &str) -> Result<(), DesktopError> {
            Err(DesktopError::Unsupported)
        }

        fn press_enter(&self) -> Result<(), DesktopError> {
            Err(DesktopError::Unsupported)
        }

        fn capture_text(&self, _id: u64) -> Result<String, DesktopError> {
            Err(DesktopError::Unsupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_lines_parse_handle_class_and_title() {
        let stdout = "197382|CASCADIA_HOSTING_WINDOW_CLASS|gemini-cli\n\
                      66100|ConsoleWindowClass|Command Prompt\n";
        let windows = parse_window_lines(stdout);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].id, 197382);
        assert_eq!(windows[0].class, "CASCADIA_HOSTING_WINDOW_CLASS");
        assert_eq!(windows[0].title, "gemini-cli");
        assert_eq!(windows[1].class, "ConsoleWindowClass");
    }

    #[test]
    fn test_window_title_may_contain_separator() {
        let windows = parse_window_lines("12|ConsoleWindowClass|build | logs\n");
        assert_eq!(windows[0].title, "build | logs");
    }

    #[test]
    fn test_malformed_window_lines_are_skipped() {
        let stdout = "no separators here\nnot-a-handle|Cls|title\n7|Cls|ok\n";
        let windows = parse_window_lines(stdout);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].id, 7);
    }
}
