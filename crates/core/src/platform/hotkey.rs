//! Global start/stop key: plain F10, with no modifiers held.

use std::io;
use std::thread;

/// Watch for the start/stop key on a background thread and call `on_press`
/// once per press. Auto-repeat is ignored.
pub fn listen<F>(on_press: F) -> io::Result<()>
where
    F: Fn() + Send + 'static,
{
    thread::Builder::new()
        .name("medic-hotkey".into())
        .spawn(move || run(on_press))
        .map(drop)
}

#[cfg(target_os = "macos")]
fn run<F: Fn()>(on_press: F) {
    use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
    use core_graphics::event::{
        CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventType, EventField, KeyCode,
    };
    use tracing::{error, info};

    let modifiers = CGEventFlags::CGEventFlagShift
        | CGEventFlags::CGEventFlagControl
        | CGEventFlags::CGEventFlagAlternate
        | CGEventFlags::CGEventFlagCommand;

    let tap = CGEventTap::new(
        CGEventTapLocation::HID,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        |_proxy, _kind, event| {
            let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            let repeat = event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0;
            if keycode == i64::from(KeyCode::F10) && !repeat && !event.get_flags().intersects(modifiers) {
                on_press();
            }
            None
        },
    );
    let Ok(tap) = tap else {
        error!(target: "platform::hotkey", "cannot watch F10: grant Accessibility permission to this terminal");
        return;
    };
    let Ok(source) = tap.mach_port.create_runloop_source(0) else {
        error!(target: "platform::hotkey", "cannot attach the F10 event tap to a run loop");
        return;
    };

    let run_loop = CFRunLoop::get_current();
    unsafe { run_loop.add_source(&source, kCFRunLoopCommonModes) };
    tap.enable();
    info!(target: "platform::hotkey", "F10 toggles start/stop");
    CFRunLoop::run_current();
}

#[cfg(target_os = "windows")]
fn run<F: Fn()>(on_press: F) {
    use tracing::{error, info};
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse::{RegisterHotKey, MOD_NOREPEAT, VK_F10};
    use windows::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, WM_HOTKEY};

    const HOTKEY_ID: i32 = 1;

    if let Err(e) = unsafe { RegisterHotKey(HWND::default(), HOTKEY_ID, MOD_NOREPEAT, u32::from(VK_F10.0)) } {
        error!(target: "platform::hotkey", "cannot register F10, another program may own it: {}", e);
        return;
    }
    info!(target: "platform::hotkey", "F10 toggles start/stop");

    // Thread-level hotkeys arrive with a null hwnd; -1 is an error.
    let mut msg = MSG::default();
    while unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) }.0 > 0 {
        if msg.message == WM_HOTKEY && msg.wParam.0 == HOTKEY_ID as usize {
            on_press();
        }
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn run<F: Fn()>(_on_press: F) {
    tracing::debug!(target: "platform::hotkey", "no global hotkey on this platform, use S in the terminal");
}
