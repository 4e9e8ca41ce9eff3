use std::sync::Arc;

use tracing::info;

use crate::color::HEALTH_BAR_COLOR;
use crate::types::*;
use super::{InputInjector, Ports, ScreenCapture};

/// Full-screen size reported when capturing without a rectangle.
const SCREEN_W: u32 = 1920;
const SCREEN_H: u32 = 1080;

/// Logs every call; captures are solid health-bar red so nothing heals.
pub struct StubPlatform;

pub fn ports() -> Ports {
    let stub = Arc::new(StubPlatform);
    Ports { screen: stub.clone(), input: stub }
}

impl ScreenCapture for StubPlatform {
    fn capture(&self, rect: Option<Rect>) -> Option<Capture> {
        let (w, h) = match rect {
            Some(r) => (r.width(), r.height()),
            None => (SCREEN_W, SCREEN_H),
        };
        tracing::debug!(target: "platform::stub", "capture({:?}) -> {}x{}", rect.map(|r| r.coords()), w, h);
        Some(Capture::solid(w, h, HEALTH_BAR_COLOR))
    }
}

impl InputInjector for StubPlatform {
    fn press_key(&self, key: &str) {
        info!(target: "platform::stub", "press_key(\"{}\")", key);
    }

    fn click(&self, x: i32, y: i32) {
        info!(target: "platform::stub", "click({}, {})", x, y);
    }
}
