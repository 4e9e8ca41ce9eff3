pub mod stub;
pub mod hotkey;

#[cfg(target_os = "macos")]
pub mod darwin;

#[cfg(target_os = "windows")]
pub mod windows;

use std::sync::Arc;

use tracing::info;

use crate::types::*;

/// Grabs screen pixels.
pub trait ScreenCapture: Send + Sync {
    /// Capture `rect` (or the whole primary display for `None`). Returns
    /// `None` when the backend fails; the caller skips that cycle.
    fn capture(&self, rect: Option<Rect>) -> Option<Capture>;
}

/// Injects synthetic input. Both calls are fire-and-forget: backends log
/// their own failures.
pub trait InputInjector: Send + Sync {
    fn press_key(&self, key: &str);
    fn click(&self, x: i32, y: i32);
}

/// The pair of capabilities an engine needs, chosen once at startup.
#[derive(Clone)]
pub struct Ports {
    pub screen: Arc<dyn ScreenCapture>,
    pub input: Arc<dyn InputInjector>,
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Ports {
    if force_stub {
        info!(target: "platform", "using stub backend");
        return stub::ports();
    }
    #[cfg(target_os = "macos")]
    {
        info!(target: "platform", "using darwin backend");
        return darwin::ports();
    }
    #[cfg(target_os = "windows")]
    {
        info!(target: "platform", "using windows backend");
        return windows::ports();
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        info!(target: "platform", "no native backend on this OS, using stub");
        stub::ports()
    }
}
