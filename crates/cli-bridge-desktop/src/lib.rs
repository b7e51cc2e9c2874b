#![deny(clippy::all)]

mod desktop;
mod error;
mod fallback;
mod platform;

pub use desktop::Desktop;
pub use desktop::MockDesktop;
pub use desktop::WindowInfo;
pub use error::DesktopError;
pub use fallback::FallbackConfig;
pub use fallback::FallbackController;
pub use fallback::strip_animation_glyphs;
pub use platform::platform_desktop;
