use std::ffi::c_void;
use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HGDIOBJ,
    SRCCOPY,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    MapVirtualKeyW, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT,
    KEYEVENTF_KEYUP, KEYEVENTF_SCANCODE, MAPVK_VK_TO_VSC, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SetCursorPos, SM_CXSCREEN, SM_CYSCREEN,
};

use crate::keys::Key;
use crate::types::*;
use super::{InputInjector, Ports, ScreenCapture};

fn virtual_key(key: Key) -> u16 {
    match key {
        Key::F(n) => 0x6F + n as u16,
        Key::Digit(d) => 0x30 + d as u16,
        Key::Letter(c) => c as u16,
        Key::Space => 0x20,
        Key::Tab => 0x09,
        Key::Enter => 0x0D,
        Key::Escape => 0x1B,
    }
}

/// GDI screen capture and `SendInput` keyboard/mouse.
pub struct WindowsPlatform;

pub fn ports() -> Ports {
    let platform = Arc::new(WindowsPlatform);
    Ports { screen: platform.clone(), input: platform }
}

impl ScreenCapture for WindowsPlatform {
    fn capture(&self, rect: Option<Rect>) -> Option<Capture> {
        let (x, y, w, h) = match rect {
            Some(r) => (r.x1(), r.y1(), r.width() as i32, r.height() as i32),
            None => unsafe { (0, 0, GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) },
        };
        if w <= 0 || h <= 0 {
            return None;
        }
        let stride = (w as u32).checked_mul(4)?;
        let len = (stride as usize).checked_mul(h as usize)?;

        unsafe {
            let screen_dc = GetDC(HWND::default());
            if screen_dc.is_invalid() {
                warn!(target: "platform::windows", "GetDC failed");
                return None;
            }
            let mem_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, w, h);
            let old = SelectObject(mem_dc, HGDIOBJ(bitmap.0));

            let mut result = None;
            match BitBlt(mem_dc, 0, 0, w, h, screen_dc, x, y, SRCCOPY) {
                Ok(()) => {
                    let mut bmi = BITMAPINFO::default();
                    bmi.bmiHeader = BITMAPINFOHEADER {
                        biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: w,
                        biHeight: -h, // top-down rows
                        biPlanes: 1,
                        biBitCount: 32,
                        biCompression: BI_RGB.0,
                        ..Default::default()
                    };
                    let mut data = vec![0u8; len];
                    SelectObject(mem_dc, old);
                    let lines = GetDIBits(
                        mem_dc,
                        bitmap,
                        0,
                        h as u32,
                        Some(data.as_mut_ptr() as *mut c_void),
                        &mut bmi,
                        DIB_RGB_COLORS,
                    );
                    if lines == h {
                        result = Some(Capture {
                            data,
                            width: w as u32,
                            height: h as u32,
                            bytes_per_row: stride,
                        });
                    } else {
                        warn!(target: "platform::windows", "GetDIBits copied {} of {} rows", lines, h);
                    }
                }
                Err(e) => {
                    SelectObject(mem_dc, old);
                    warn!(target: "platform::windows", "BitBlt failed: {}", e);
                }
            }

            let _ = DeleteObject(HGDIOBJ(bitmap.0));
            let _ = DeleteDC(mem_dc);
            ReleaseDC(HWND::default(), screen_dc);
            result
        }
    }
}

fn key_input(vk: u16, up: bool) -> INPUT {
    let scan = unsafe { MapVirtualKeyW(vk as u32, MAPVK_VK_TO_VSC) } as u16;
    let mut flags = KEYEVENTF_SCANCODE;
    if up {
        flags |= KEYEVENTF_KEYUP;
    }
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(0),
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn mouse_input(flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send(inputs: &[INPUT], what: &str) {
    let sent = unsafe { SendInput(inputs, mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        warn!(target: "platform::windows", "SendInput dropped {} ({} of {} events)", what, sent, inputs.len());
    }
}

impl InputInjector for WindowsPlatform {
    fn press_key(&self, key: &str) {
        let key = match key.parse::<Key>() {
            Ok(k) => k,
            Err(e) => {
                warn!(target: "platform::windows", "{}", e);
                return;
            }
        };
        let vk = virtual_key(key);
        send(&[key_input(vk, false)], "key down");
        thread::sleep(Duration::from_millis(10));
        send(&[key_input(vk, true)], "key up");
    }

    fn click(&self, x: i32, y: i32) {
        if let Err(e) = unsafe { SetCursorPos(x, y) } {
            warn!(target: "platform::windows", "SetCursorPos({}, {}) failed: {}", x, y, e);
            return;
        }
        thread::sleep(Duration::from_millis(50));
        send(&[mouse_input(MOUSEEVENTF_LEFTDOWN)], "mouse down");
        thread::sleep(Duration::from_millis(100));
        send(&[mouse_input(MOUSEEVENTF_LEFTUP)], "mouse up");
    }
}
