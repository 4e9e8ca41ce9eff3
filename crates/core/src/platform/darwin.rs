use std::sync::Arc;
use std::thread;
use std::time::Duration;

use core_graphics::display::CGDisplay;
use core_graphics::event::*;
use core_graphics::event_source::*;
use core_graphics::geometry::*;
use core_graphics::window::*;
use tracing::warn;

use crate::keys::Key;
use crate::types::*;
use super::{InputInjector, Ports, ScreenCapture};

/// Virtual key code on an ANSI layout.
fn virtual_key_code(key: Key) -> CGKeyCode {
    match key {
        Key::F(n) => match n {
            1 => 0x7A, 2 => 0x78, 3 => 0x63, 4 => 0x76, 5 => 0x60,
            6 => 0x61, 7 => 0x62, 8 => 0x64, 9 => 0x65, 10 => 0x6D,
            11 => 0x67, 12 => 0x6F, 13 => 0x69, 14 => 0x6B, _ => 0x71,
        },
        Key::Digit(d) => match d {
            0 => 0x1D, 1 => 0x12, 2 => 0x13, 3 => 0x14, 4 => 0x15,
            5 => 0x17, 6 => 0x16, 7 => 0x1A, 8 => 0x1C, _ => 0x19,
        },
        Key::Letter(c) => match c {
            'A' => 0x00, 'S' => 0x01, 'D' => 0x02, 'F' => 0x03, 'H' => 0x04,
            'G' => 0x05, 'Z' => 0x06, 'X' => 0x07, 'C' => 0x08, 'V' => 0x09,
            'B' => 0x0B, 'Q' => 0x0C, 'W' => 0x0D, 'E' => 0x0E, 'R' => 0x0F,
            'Y' => 0x10, 'T' => 0x11, 'O' => 0x1F, 'U' => 0x20, 'I' => 0x22,
            'P' => 0x23, 'L' => 0x25, 'J' => 0x26, 'K' => 0x28, 'N' => 0x2D,
            _ => 0x2E, // M
        },
        Key::Space => 0x31,
        Key::Tab => 0x30,
        Key::Enter => 0x24,
        Key::Escape => 0x35,
    }
}

pub struct DarwinPlatform;

pub fn ports() -> Ports {
    let platform = Arc::new(DarwinPlatform);
    Ports { screen: platform.clone(), input: platform }
}

fn event_source() -> Option<CGEventSource> {
    match CGEventSource::new(CGEventSourceStateID::HIDSystemState) {
        Ok(s) => Some(s),
        Err(_) => {
            warn!(target: "platform::darwin", "failed to create event source");
            None
        }
    }
}

impl ScreenCapture for DarwinPlatform {
    fn capture(&self, rect: Option<Rect>) -> Option<Capture> {
        let bounds = match rect {
            Some(r) => CGRect::new(
                &CGPoint::new(r.x1() as f64, r.y1() as f64),
                &CGSize::new(r.width() as f64, r.height() as f64),
            ),
            None => CGDisplay::main().bounds(),
        };

        let image_option = kCGWindowImageBoundsIgnoreFraming | kCGWindowImageNominalResolution;
        let image = match create_image(
            bounds,
            kCGWindowListOptionOnScreenOnly,
            kCGNullWindowID,
            image_option,
        ) {
            Some(img) => img,
            None => {
                warn!(target: "platform::darwin", "screen capture failed (screen recording permission?)");
                return None;
            }
        };

        let cf_data = image.data();
        Some(Capture {
            data: cf_data.bytes().to_vec(),
            width: image.width() as u32,
            height: image.height() as u32,
            bytes_per_row: image.bytes_per_row() as u32,
        })
    }
}

impl InputInjector for DarwinPlatform {
    fn press_key(&self, key: &str) {
        let key = match key.parse::<Key>() {
            Ok(k) => k,
            Err(e) => {
                warn!(target: "platform::darwin", "{}", e);
                return;
            }
        };
        let Some(source) = event_source() else { return };
        let code = virtual_key_code(key);

        match CGEvent::new_keyboard_event(source.clone(), code, true) {
            Ok(down) => down.post(CGEventTapLocation::HID),
            Err(_) => {
                warn!(target: "platform::darwin", "failed to create key-down for {}", key);
                return;
            }
        }
        thread::sleep(Duration::from_millis(10));
        if let Ok(up) = CGEvent::new_keyboard_event(source, code, false) {
            up.post(CGEventTapLocation::HID);
        }
    }

    fn click(&self, x: i32, y: i32) {
        let Some(source) = event_source() else { return };
        let point = CGPoint::new(x as f64, y as f64);

        if let Ok(moved) = CGEvent::new_mouse_event(
            source.clone(),
            CGEventType::MouseMoved,
            point,
            CGMouseButton::Left,
        ) {
            moved.post(CGEventTapLocation::HID);
        }

        thread::sleep(Duration::from_millis(50));

        if let Ok(mouse_down) = CGEvent::new_mouse_event(
            source.clone(),
            CGEventType::LeftMouseDown,
            point,
            CGMouseButton::Left,
        ) {
            mouse_down.post(CGEventTapLocation::HID);
        }

        thread::sleep(Duration::from_millis(100));

        if let Ok(mouse_up) = CGEvent::new_mouse_event(
            source,
            CGEventType::LeftMouseUp,
            point,
            CGMouseButton::Left,
        ) {
            mouse_up.post(CGEventTapLocation::HID);
        } else {
            warn!(target: "platform::darwin", "failed to release mouse at ({}, {})", x, y);
        }
    }
}
